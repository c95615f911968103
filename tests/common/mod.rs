use std::path::Path;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use catalog_api::{
    config::AppConfig, db, services::catalog::ProductCatalogService, uploads::ImageStore, AppState,
};

pub const HOST: &str = "test.local";
const BOUNDARY: &str = "catalog-test-boundary-7MA4YWxkTrZu0gW";

/// Helper harness for spinning up an application backed by a throwaway
/// SQLite database and a temporary image directory.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    _workdir: TempDir,
}

impl TestApp {
    /// Construct a new test application with fresh database and disk state.
    pub async fn new() -> Self {
        let workdir = TempDir::new().expect("temp workdir");
        let db_path = workdir.path().join("catalog_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "127.0.0.1",
            18_080,
            "test",
        );
        cfg.auto_migrate = true;
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let images = ImageStore::open(workdir.path().join("images"))
            .await
            .expect("failed to open image store");

        let db_arc = Arc::new(pool);
        let state = AppState {
            db: db_arc.clone(),
            config: cfg,
            catalog: ProductCatalogService::new(db_arc),
            images,
        };
        let router = catalog_api::app_router(state.clone());

        Self {
            router,
            state,
            _workdir: workdir,
        }
    }

    pub fn image_root(&self) -> &Path {
        self.state.images.root()
    }

    /// Number of published (non-staged) files in the image directory.
    pub fn published_image_count(&self) -> usize {
        std::fs::read_dir(self.image_root())
            .expect("image root readable")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .count()
    }

    pub fn staged_image_count(&self) -> usize {
        std::fs::read_dir(self.image_root().join(".staging"))
            .expect("staging dir readable")
            .filter_map(Result::ok)
            .count()
    }

    pub async fn request(&self, method: Method, uri: &str, body: Body) -> Response {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::HOST, HOST)
            .body(body)
            .unwrap();
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Sends a multipart request carrying an optional `name` field and an
    /// optional `image` file.
    pub async fn multipart_request(
        &self,
        method: Method,
        uri: &str,
        name: Option<&str>,
        file: Option<(&str, &[u8])>,
    ) -> Response {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::HOST, HOST)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(name, file)))
            .unwrap();
        self.router.clone().oneshot(request).await.unwrap()
    }
}

fn multipart_body(name: Option<&str>, file: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body: Vec<u8> = Vec::new();
    if let Some(name) = name {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"name\"\r\n\r\n{name}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((filename, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; \
                 filename=\"{filename}\"\r\nContent-Type: image/jpeg\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// Reads a response into its status and JSON body.
pub async fn read_json(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

/// Last path segment of an image URL.
pub fn stored_filename(image_url: &str) -> &str {
    image_url.rsplit('/').next().unwrap()
}
