//! Cache-first content reads for the storefront frontend.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use vitrine_api_types::{CollectionType, ContentResponse};

use super::{ApiError, HttpState};

pub(super) async fn collection(
    State(state): State<HttpState>,
    Path(collection): Path<String>,
) -> Result<Json<ContentResponse>, ApiError> {
    const SOURCE: &str = "infra::http::content::collection";
    let collection: CollectionType = collection
        .parse()
        .map_err(|_| ApiError::not_found(SOURCE, "Unknown collection"))?;

    let read = state
        .service
        .content()
        .collection_for_display(collection)
        .await?;
    Ok(Json(read.into_response()))
}

pub(super) async fn product(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> Result<Json<ContentResponse>, ApiError> {
    const SOURCE: &str = "infra::http::content::product";
    let id: u64 = id.parse().map_err(|_| {
        ApiError::bad_request(SOURCE, "Invalid product id", Some(format!("`{id}` is not a number")))
    })?;

    let read = state.service.content().product(id).await?;
    Ok(Json(read.into_response()))
}

pub(super) async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}
