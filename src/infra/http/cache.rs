//! Protected cache management routes.

use std::time::{Duration, Instant};

use axum::{
    Json,
    extract::{Query, State},
};
use bytes::Bytes;
use serde::Deserialize;
use subtle::ConstantTimeEq;
use tracing::info;

use vitrine_api_types::{
    CacheCommand, CacheCommandRequest, CacheCommandResponse, CollectionType, RefreshResponse,
    RefreshTarget,
};

use crate::application::refresh::InvalidateTarget;

use super::{ApiError, HttpState};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct CacheQuery {
    secret: Option<String>,
    #[serde(rename = "type")]
    target: Option<String>,
}

/// Constant-time comparison against the configured refresh secret.
pub(super) fn authorize(
    source: &'static str,
    state: &HttpState,
    provided: Option<&str>,
) -> Result<(), ApiError> {
    let Some(expected) = state.service.refresh_secret() else {
        return Err(ApiError::secret_not_configured(source));
    };
    match provided {
        Some(provided) if bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) => Ok(()),
        _ => Err(ApiError::unauthorized(source)),
    }
}

pub(super) async fn init(
    State(state): State<HttpState>,
    Query(query): Query<CacheQuery>,
) -> Result<Json<RefreshResponse>, ApiError> {
    const SOURCE: &str = "infra::http::cache::init";
    authorize(SOURCE, &state, query.secret.as_deref())?;
    Ok(Json(refresh_everything(&state).await))
}

pub(super) async fn refresh(
    State(state): State<HttpState>,
    Query(query): Query<CacheQuery>,
) -> Result<Json<RefreshResponse>, ApiError> {
    const SOURCE: &str = "infra::http::cache::refresh";
    authorize(SOURCE, &state, query.secret.as_deref())?;

    let target = match query.target.as_deref().map(str::trim) {
        None | Some("") => RefreshTarget::All,
        Some(raw) => raw.parse::<RefreshTarget>().map_err(|err| {
            ApiError::bad_request(SOURCE, "Unknown cache type", Some(err.to_string()))
        })?,
    };

    match target {
        RefreshTarget::All => Ok(Json(refresh_everything(&state).await)),
        RefreshTarget::Collection(collection) => {
            let started_at = Instant::now();
            state
                .service
                .orchestrator()
                .refresh_partial(collection)
                .await?;
            Ok(Json(RefreshResponse {
                success: true,
                message: format!("{collection} cache refresh completed"),
                duration: format_duration(started_at.elapsed()),
                summary: None,
                stats: state.service.cache().stats(),
            }))
        }
    }
}

pub(super) async fn command(
    State(state): State<HttpState>,
    Query(query): Query<CacheQuery>,
    body: Bytes,
) -> Result<Json<CacheCommandResponse>, ApiError> {
    const SOURCE: &str = "infra::http::cache::command";
    authorize(SOURCE, &state, query.secret.as_deref())?;

    let request: CacheCommandRequest = serde_json::from_slice(&body).map_err(|err| {
        ApiError::bad_request(SOURCE, "Invalid command body", Some(err.to_string()))
    })?;

    let message = match request.action {
        CacheCommand::Stats => "cache statistics".to_string(),
        CacheCommand::Invalidate => {
            let target = invalidate_target(request.target, request.id).ok_or_else(|| {
                ApiError::bad_request(
                    SOURCE,
                    "Product id requires type products",
                    Some(format!("got type `{}`", describe(request.target))),
                )
            })?;
            let removed = state.service.orchestrator().invalidate(target).await?;
            info!(
                target = "vitrine::infra::http::cache",
                op = "invalidate",
                collection = describe(request.target),
                id = request.id,
                removed,
                "Cache invalidated on request"
            );
            format!("invalidated {removed} cache entries")
        }
    };

    Ok(Json(CacheCommandResponse {
        success: true,
        message,
        stats: state.service.cache().stats(),
    }))
}

async fn refresh_everything(state: &HttpState) -> RefreshResponse {
    let summary = state.service.orchestrator().refresh_all().await;
    let message = if summary.is_success() {
        "all caches refreshed".to_string()
    } else {
        format!(
            "{} of {} caches refreshed",
            summary.succeeded.len(),
            CollectionType::ALL.len()
        )
    };
    RefreshResponse {
        success: summary.is_success(),
        message,
        duration: format_duration(summary.duration),
        summary: Some(summary.to_view()),
        stats: state.service.cache().stats(),
    }
}

fn invalidate_target(target: Option<RefreshTarget>, id: Option<u64>) -> Option<InvalidateTarget> {
    let collection = match target {
        None | Some(RefreshTarget::All) => None,
        Some(RefreshTarget::Collection(collection)) => Some(collection),
    };
    match (collection, id) {
        (None, None) => Some(InvalidateTarget::All),
        (Some(collection), None) => Some(InvalidateTarget::Collection(collection)),
        (None | Some(CollectionType::Products), Some(id)) => Some(InvalidateTarget::Product(id)),
        (Some(_), Some(_)) => None,
    }
}

fn describe(target: Option<RefreshTarget>) -> &'static str {
    target.map_or("all", RefreshTarget::as_str)
}

fn format_duration(elapsed: Duration) -> String {
    format!("{}ms", elapsed.as_millis())
}
