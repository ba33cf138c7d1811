use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::collection::{CollectionType, RefreshTarget};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatsView {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub hit_rate: f64,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub last_refresh: Option<OffsetDateTime>,
    pub memory_usage: u64,
    pub entries: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshFailureView {
    #[serde(rename = "type")]
    pub collection: CollectionType,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSummaryView {
    pub succeeded: Vec<CollectionType>,
    pub failed: Vec<RefreshFailureView>,
}

/// Response for `/cache/init` and `GET /cache/refresh`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub success: bool,
    pub message: String,
    pub duration: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub summary: Option<RefreshSummaryView>,
    pub stats: CacheStatsView,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheCommand {
    Invalidate,
    Stats,
}

/// Body for `POST /cache/refresh`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheCommandRequest {
    pub action: CacheCommand,
    /// Same vocabulary as the `type` query of `GET /cache/refresh`, `all` included.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none", default)]
    pub target: Option<RefreshTarget>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheCommandResponse {
    pub success: bool,
    pub message: String,
    pub stats: CacheStatsView,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageStatsView {
    pub total_images: usize,
    pub total_size: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub download_errors: u64,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub last_cleanup: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageStatsResponse {
    pub success: bool,
    pub stats: ImageStatsView,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageCleanupResponse {
    pub success: bool,
    pub removed: usize,
    pub freed_bytes: u64,
    pub stats: ImageStatsView,
}

/// Body for `POST /cache/images?action=cache-products`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheProductsRequest {
    #[serde(default)]
    pub products: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheProductsResponse {
    pub success: bool,
    pub products: Vec<Value>,
    pub stats: ImageStatsView,
}

/// Where a content read was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentSource {
    Cache,
    Origin,
    Stale,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentResponse {
    pub success: bool,
    pub data: Value,
    pub source: ContentSource,
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub job_id: Option<Uuid>,
}

/// Envelope used for every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub hint: Option<String>,
}
