mod cache;
mod content;
pub mod error;
mod images;
mod middleware;
mod webhooks;

pub use error::ApiError;
pub use middleware::{REQUEST_ID_HEADER, RequestContext};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
};

use crate::application::service::CacheService;

use middleware::{log_responses, set_request_context};

/// Product batches posted for mirroring can be large.
const BODY_LIMIT_BYTES: usize = 16 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct HttpState {
    pub service: CacheService,
}

impl HttpState {
    pub fn new(service: CacheService) -> Self {
        Self { service }
    }
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/cache/init", get(cache::init))
        .route(
            "/cache/refresh",
            get(cache::refresh).post(cache::command),
        )
        .route(
            "/cache/images",
            get(images::manage).post(images::cache_products),
        )
        .route("/images/{filename}", get(images::serve))
        .route("/webhooks/woocommerce", post(webhooks::woocommerce))
        .route("/webhooks/wordpress", post(webhooks::wordpress))
        .route("/api/products/{id}", get(content::product))
        .route("/api/{collection}", get(content::collection))
        .route("/health", get(content::health))
        .with_state(state)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
