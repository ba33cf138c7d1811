//! Image mirror management and serving.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{
        HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::Deserialize;

use vitrine_api_types::{
    CacheProductsRequest, CacheProductsResponse, ImageCleanupResponse, ImageStatsResponse,
};

use crate::infra::images::{ImageFile, ImageMirror};

use super::{ApiError, HttpState};

const IMMUTABLE: &str = "public, max-age=31536000, immutable";

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(super) struct ImagesQuery {
    action: Option<String>,
    /// Milliseconds.
    max_age: Option<u64>,
}

fn mirror(source: &'static str, state: &HttpState) -> Result<Arc<ImageMirror>, ApiError> {
    state
        .service
        .images()
        .cloned()
        .ok_or_else(|| ApiError::images_disabled(source))
}

pub(super) async fn manage(
    State(state): State<HttpState>,
    Query(query): Query<ImagesQuery>,
) -> Result<Response, ApiError> {
    const SOURCE: &str = "infra::http::images::manage";
    let images = mirror(SOURCE, &state)?;

    match query.action.as_deref().unwrap_or("stats") {
        "stats" => Ok(Json(ImageStatsResponse {
            success: true,
            stats: images.stats(),
        })
        .into_response()),
        "cleanup" => {
            let max_age = query
                .max_age
                .map(Duration::from_millis)
                .unwrap_or_else(|| state.service.image_max_age());
            let report = images.cleanup(max_age).await?;
            Ok(Json(ImageCleanupResponse {
                success: true,
                removed: report.removed,
                freed_bytes: report.freed_bytes,
                stats: images.stats(),
            })
            .into_response())
        }
        other => Err(ApiError::bad_request(
            SOURCE,
            "Unknown image action",
            Some(format!("`{other}` is not one of stats, cleanup")),
        )),
    }
}

pub(super) async fn cache_products(
    State(state): State<HttpState>,
    Query(query): Query<ImagesQuery>,
    body: Bytes,
) -> Result<Json<CacheProductsResponse>, ApiError> {
    const SOURCE: &str = "infra::http::images::cache_products";
    let images = mirror(SOURCE, &state)?;

    if query.action.as_deref() != Some("cache-products") {
        return Err(ApiError::bad_request(
            SOURCE,
            "Unknown image action",
            Some("POST expects action=cache-products".to_string()),
        ));
    }
    let request: CacheProductsRequest = serde_json::from_slice(&body).map_err(|err| {
        ApiError::bad_request(SOURCE, "Invalid products body", Some(err.to_string()))
    })?;

    let products = images.cache_product_images(&request.products).await;
    Ok(Json(CacheProductsResponse {
        success: true,
        products,
        stats: images.stats(),
    }))
}

pub(super) async fn serve(
    State(state): State<HttpState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    const SOURCE: &str = "infra::http::images::serve";
    let images = mirror(SOURCE, &state)?;

    match images.get_image_file(&filename).await {
        Some(file) => Ok(build_image_response(file)),
        None => Err(ApiError::not_found(SOURCE, "Image not found")),
    }
}

fn build_image_response(file: ImageFile) -> Response {
    let length = file.bytes.len();
    let mut response = Response::new(Body::from(file.bytes));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&file.mime_type) {
        headers.insert(CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&length.to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(IMMUTABLE));

    response
}
