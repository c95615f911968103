use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::errors::{ErrorResponse, FieldError, ValidationErrorResponse};
use crate::handlers::products::{self, ProductRequest, ProductResponse};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Catalog API",
        version = "0.1.0",
        description = r#"
Product catalog backend for an admin panel: CRUD over products with
multipart image upload. Uploaded images are served at `/images/<filename>`.

Failures carry a `{"error": "..."}` body; validation failures carry
`{"errors": [{"field": "...", "message": "..."}]}`.
        "#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    paths(
        products::list_products,
        products::create_product,
        products::update_product,
        products::delete_product,
    ),
    components(schemas(
        ProductRequest,
        ProductResponse,
        ErrorResponse,
        FieldError,
        ValidationErrorResponse,
    )),
    tags(
        (name = "Products", description = "Product catalog endpoints")
    )
)]
pub struct ApiDoc;

/// Swagger UI mounted at /docs, serving the generated document.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
