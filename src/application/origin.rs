//! Origin traits describing the upstream content source.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::domain::CollectionType;

#[derive(Debug, Error)]
pub enum OriginError {
    #[error("origin is not configured")]
    NotConfigured,
    #[error("request to `{url}` failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("origin responded with {status} for `{url}`")]
    Status { status: u16, url: String },
    #[error("origin returned an undecodable body for `{url}`")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid origin URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl OriginError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, OriginError::Request { source, .. } if source.is_timeout())
    }
}

/// Upstream source of storefront collections.
#[async_trait]
pub trait OriginFetcher: Send + Sync + std::fmt::Debug {
    /// Fetch the complete collection, following pagination.
    async fn fetch_collection(&self, collection: CollectionType) -> Result<Value, OriginError>;

    /// Fetch one product; `Ok(None)` when the origin does not know the id.
    async fn fetch_product(&self, id: u64) -> Result<Option<Value>, OriginError>;
}
