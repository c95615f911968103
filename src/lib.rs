//! Catalog API Library
//!
//! Product-catalog HTTP service: CRUD over products with image upload,
//! staged file publication, and static serving of the image directory.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod uploads;

use axum::{extract::FromRef, routing::get, Router};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::{services::ServeDir, trace::TraceLayer};

use services::catalog::ProductCatalogService;
use uploads::ImageStore;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub catalog: ProductCatalogService,
    pub images: ImageStore,
}

impl FromRef<AppState> for ImageStore {
    fn from_ref(state: &AppState) -> Self {
        state.images.clone()
    }
}

/// Routes mounted under `/api`.
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/products", handlers::products::products_routes())
}

/// Assembles the full application router: API, health probe, Swagger UI,
/// and the static image directory.
pub fn app_router(state: AppState) -> Router {
    let images_root = state.images.root().to_path_buf();

    Router::new()
        .route("/", get(|| async { "catalog-api up" }))
        .route("/health", get(handlers::health))
        .nest("/api", api_routes())
        .nest_service("/images", ServeDir::new(images_root))
        .merge(openapi::swagger_ui())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
