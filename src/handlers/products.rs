use crate::handlers::{created_response, success_response, validate_input};
use crate::services::catalog::{slugify, CreateProductInput, UpdateProductInput};
use crate::uploads::{self, ProductForm, StagedImage};
use crate::{errors::ApiError, AppState};
use axum::{
    extract::{Host, Path, State},
    http::HeaderMap,
    response::Response,
    routing::{get, put},
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Creates the router for product endpoints
pub fn products_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/:id", put(update_product).delete(delete_product))
}

/// Form fields of a create/update request.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ProductRequest {
    /// Product name; the slug is derived from it
    #[validate(length(
        min = 1,
        max = 255,
        message = "Product name must be between 1 and 255 characters"
    ))]
    pub name: String,
}

/// Product as exposed on the wire.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductResponse {
    pub id: i32,
    pub product_id: String,
    pub name: String,
    pub slug: String,
    /// Fully-qualified URL of the product image
    pub image: String,
}

impl From<crate::entities::ProductModel> for ProductResponse {
    fn from(model: crate::entities::ProductModel) -> Self {
        Self {
            id: model.id,
            product_id: model.product_id,
            name: model.name,
            slug: model.slug,
            image: model.image,
        }
    }
}

/// List all products
#[utoipa::path(
    get,
    path = "/api/products",
    responses(
        (status = 200, description = "All products", body = Vec<ProductResponse>),
        (status = 500, description = "Storage failure", body = crate::errors::ErrorResponse)
    ),
    tag = "Products"
)]
pub async fn list_products(State(state): State<AppState>) -> Result<Response, ApiError> {
    let products = state.catalog.list_products().await?;
    let products: Vec<ProductResponse> = products.into_iter().map(ProductResponse::from).collect();
    Ok(success_response(products))
}

/// Create a product from a multipart form carrying `name` and an `image` file
#[utoipa::path(
    post,
    path = "/api/products",
    request_body(content = ProductRequest, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Product created", body = ProductResponse),
        (status = 400, description = "Invalid payload", body = crate::errors::ValidationErrorResponse),
        (status = 500, description = "Storage failure", body = crate::errors::ErrorResponse)
    ),
    tag = "Products"
)]
pub async fn create_product(
    State(state): State<AppState>,
    Host(host): Host,
    headers: HeaderMap,
    form: ProductForm,
) -> Result<Response, ApiError> {
    let staged = match form.image {
        Some(staged) => staged,
        None => {
            return Err(ApiError::field_validation(
                uploads::IMAGE_FIELD,
                "Image file is required",
            ))
        }
    };

    let scheme = uploads::request_scheme(&headers);
    match create_product_inner(&state, scheme, &host, form.name, &staged).await {
        Ok(response) => Ok(response),
        Err(err) => {
            // never leave an orphaned upload behind a failed insert
            state.images.discard(&staged).await;
            Err(err)
        }
    }
}

async fn create_product_inner(
    state: &AppState,
    scheme: &str,
    host: &str,
    name: Option<String>,
    staged: &StagedImage,
) -> Result<Response, ApiError> {
    let payload = ProductRequest {
        name: name.unwrap_or_default(),
    };
    validate_input(&payload)?;

    let slug = slugify(&payload.name);
    let image = uploads::generate_image_url(scheme, host, &staged.filename);

    let product = state
        .catalog
        .create_product(CreateProductInput {
            name: payload.name,
            slug,
            image,
        })
        .await?;

    // row committed; make the file visible under /images
    state.images.publish(staged).await?;

    Ok(created_response(ProductResponse::from(product)))
}

/// Update a product; the image is replaced only when a new file is uploaded
#[utoipa::path(
    put,
    path = "/api/products/{id}",
    params(("id" = i32, Path, description = "Product ID")),
    request_body(content = ProductRequest, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Product updated", body = ProductResponse),
        (status = 400, description = "Invalid payload", body = crate::errors::ValidationErrorResponse),
        (status = 404, description = "Unknown product", body = crate::errors::ErrorResponse),
        (status = 409, description = "Slug already taken", body = crate::errors::ErrorResponse),
        (status = 500, description = "Storage failure", body = crate::errors::ErrorResponse)
    ),
    tag = "Products"
)]
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Host(host): Host,
    headers: HeaderMap,
    form: ProductForm,
) -> Result<Response, ApiError> {
    let scheme = uploads::request_scheme(&headers);
    match update_product_inner(&state, id, scheme, &host, form.name, form.image.as_ref()).await {
        Ok(response) => Ok(response),
        Err(err) => {
            if let Some(staged) = form.image.as_ref() {
                state.images.discard(staged).await;
            }
            Err(err)
        }
    }
}

async fn update_product_inner(
    state: &AppState,
    id: i32,
    scheme: &str,
    host: &str,
    name: Option<String>,
    staged: Option<&StagedImage>,
) -> Result<Response, ApiError> {
    let payload = ProductRequest {
        name: name.unwrap_or_default(),
    };
    validate_input(&payload)?;

    let slug = slugify(&payload.name);
    state.catalog.ensure_unique_slug(&slug, Some(id)).await?;

    let product = state.catalog.get_product(id).await?;

    let image = staged.map(|s| uploads::generate_image_url(scheme, host, &s.filename));
    let updated = state
        .catalog
        .update_product(
            id,
            UpdateProductInput {
                name: payload.name,
                slug,
                image,
            },
        )
        .await?;

    if let Some(staged) = staged {
        state.images.publish(staged).await?;
        state
            .images
            .remove(uploads::image_basename(&product.image))
            .await?;
    }

    Ok(success_response(ProductResponse::from(updated)))
}

/// Delete a product together with its image file
#[utoipa::path(
    delete,
    path = "/api/products/{id}",
    params(("id" = i32, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Deleted product", body = ProductResponse),
        (status = 404, description = "Unknown product", body = crate::errors::ErrorResponse),
        (status = 500, description = "Storage failure", body = crate::errors::ErrorResponse)
    ),
    tag = "Products"
)]
pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response, ApiError> {
    let product = state.catalog.get_product(id).await?;
    let response = ProductResponse::from(product.clone());

    state
        .images
        .remove(uploads::image_basename(&product.image))
        .await?;
    state.catalog.delete_product(product).await?;

    Ok(success_response(response))
}
