//! Refresh orchestration: full and partial refresh, product splices, invalidation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use metrics::{counter, histogram};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use vitrine_api_types::{RefreshFailureView, RefreshSummaryView};

use crate::application::origin::OriginFetcher;
use crate::cache::{CacheEntry, CacheError, SingleFlight, TtlCache, UpdateOutcome};
use crate::domain::CollectionType;
use crate::domain::product::{position_in, product_id, product_key};

pub(crate) const METRIC_REFRESH_MS: &str = "vitrine_refresh_ms";
pub(crate) const METRIC_REFRESH_TOTAL: &str = "vitrine_refresh_total";

/// Shared by every caller that joined the same refresh, hence `Clone`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RefreshError {
    #[error("origin fetch failed: {0}")]
    Origin(String),
    #[error("cache write failed: {0}")]
    Cache(String),
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("refresh was abandoned before completing")]
    Abandoned,
}

impl From<CacheError> for RefreshError {
    fn from(err: CacheError) -> Self {
        Self::Cache(error_chain(&err))
    }
}

#[derive(Debug, Clone, Default)]
pub struct RefreshSummary {
    pub succeeded: Vec<CollectionType>,
    pub failed: Vec<(CollectionType, RefreshError)>,
    pub duration: Duration,
}

impl RefreshSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn to_view(&self) -> RefreshSummaryView {
        RefreshSummaryView {
            succeeded: self.succeeded.clone(),
            failed: self
                .failed
                .iter()
                .map(|(collection, error)| RefreshFailureView {
                    collection: *collection,
                    error: error.to_string(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Replaced { index: usize },
    Appended,
    /// No product list is cached; only the single-product entry was written.
    NotCached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidateTarget {
    All,
    Collection(CollectionType),
    Product(u64),
}

type CollectionFlight = SingleFlight<CollectionType, Result<Arc<CacheEntry>, RefreshError>>;
type ProductFlight = SingleFlight<u64, Result<Option<Arc<CacheEntry>>, RefreshError>>;

/// Writes fetched data through the [`TtlCache`]; never touches the store directly.
#[derive(Debug)]
pub struct RefreshOrchestrator {
    cache: Arc<TtlCache>,
    origin: Arc<dyn OriginFetcher>,
    collections: CollectionFlight,
    products: ProductFlight,
}

impl RefreshOrchestrator {
    pub fn new(cache: Arc<TtlCache>, origin: Arc<dyn OriginFetcher>) -> Self {
        Self {
            cache,
            origin,
            collections: SingleFlight::new(),
            products: SingleFlight::new(),
        }
    }

    pub fn cache(&self) -> &Arc<TtlCache> {
        &self.cache
    }

    pub fn is_refreshing(&self, collection: CollectionType) -> bool {
        self.collections.is_in_flight(&collection)
    }

    /// Refresh every collection concurrently. Failures are isolated per collection.
    pub async fn refresh_all(&self) -> RefreshSummary {
        let started_at = Instant::now();
        let results = join_all(CollectionType::ALL.into_iter().map(|collection| async move {
            (collection, self.refresh_partial(collection).await)
        }))
        .await;

        let mut summary = RefreshSummary::default();
        for (collection, result) in results {
            match result {
                Ok(_) => summary.succeeded.push(collection),
                Err(err) => summary.failed.push((collection, err)),
            }
        }
        summary.duration = started_at.elapsed();

        info!(
            target = "vitrine::application::refresh",
            op = "refresh_all",
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len(),
            elapsed_ms = summary.duration.as_millis() as u64,
            "Full refresh finished"
        );
        summary
    }

    /// Refresh one collection. Concurrent callers share a single origin fetch.
    ///
    /// On failure the cached entry is left untouched.
    pub async fn refresh_partial(
        &self,
        collection: CollectionType,
    ) -> Result<Arc<CacheEntry>, RefreshError> {
        let cache = Arc::clone(&self.cache);
        let origin = Arc::clone(&self.origin);
        self.collections
            .run(collection, || fetch_and_store(cache, origin, collection))
            .await
            .unwrap_or(Err(RefreshError::Abandoned))
    }

    /// Fetch one product from the origin into `product-<id>`. `Ok(None)` if unknown upstream.
    pub async fn refresh_product(&self, id: u64) -> Result<Option<Arc<CacheEntry>>, RefreshError> {
        let cache = Arc::clone(&self.cache);
        let origin = Arc::clone(&self.origin);
        self.products
            .run(id, || async move {
                let product = origin
                    .fetch_product(id)
                    .await
                    .map_err(|err| RefreshError::Origin(error_chain(&err)))?;
                match product {
                    Some(product) => {
                        let entry = cache.set(&product_key(id), product, None).await?;
                        Ok(Some(entry))
                    }
                    None => Ok(None),
                }
            })
            .await
            .unwrap_or(Err(RefreshError::Abandoned))
    }

    /// Replace the product with the same id in the cached list, or append it.
    pub async fn upsert_product(&self, product: Value) -> Result<UpsertOutcome, RefreshError> {
        let id = product_id(&product)
            .ok_or_else(|| RefreshError::InvalidPayload("product has no numeric id".into()))?;

        self.cache
            .set(&product_key(id), product.clone(), None)
            .await?;

        let mut outcome = UpsertOutcome::NotCached;
        let updated = self
            .cache
            .update(CollectionType::Products.as_str(), |data| {
                let Some(list) = data.as_array_mut() else {
                    return false;
                };
                match position_in(list, id) {
                    Some(index) => {
                        list[index] = product;
                        outcome = UpsertOutcome::Replaced { index };
                    }
                    None => {
                        list.push(product);
                        outcome = UpsertOutcome::Appended;
                    }
                }
                true
            })
            .await?;
        if !matches!(updated, UpdateOutcome::Updated(_)) {
            outcome = UpsertOutcome::NotCached;
        }

        info!(
            target = "vitrine::application::refresh",
            op = "upsert_product",
            product_id = id,
            outcome = ?outcome,
            "Product upserted"
        );
        Ok(outcome)
    }

    /// Remove the product with `id` from the cached list. Missing ids are a no-op.
    pub async fn remove_product(&self, id: u64) -> Result<bool, RefreshError> {
        self.cache.invalidate(&product_key(id)).await?;

        let outcome = self
            .cache
            .update(CollectionType::Products.as_str(), |data| {
                let Some(list) = data.as_array_mut() else {
                    return false;
                };
                match position_in(list, id) {
                    Some(index) => {
                        list.remove(index);
                        true
                    }
                    None => false,
                }
            })
            .await?;

        let removed = matches!(outcome, UpdateOutcome::Updated(_));
        info!(
            target = "vitrine::application::refresh",
            op = "remove_product",
            product_id = id,
            removed,
            "Product removal applied"
        );
        Ok(removed)
    }

    /// Drop cached data. Returns the number of entries removed.
    pub async fn invalidate(&self, target: InvalidateTarget) -> Result<usize, RefreshError> {
        let removed = match target {
            InvalidateTarget::All => self.cache.clear().await?,
            InvalidateTarget::Collection(collection) => {
                usize::from(self.cache.invalidate(collection.as_str()).await?)
            }
            InvalidateTarget::Product(id) => {
                usize::from(self.cache.invalidate(&product_key(id)).await?)
            }
        };
        info!(
            target = "vitrine::application::refresh",
            op = "invalidate",
            target_kind = ?target,
            removed,
            "Cache invalidated"
        );
        Ok(removed)
    }
}

/// Owns its handles so the collection flight can run it on a spawned task.
async fn fetch_and_store(
    cache: Arc<TtlCache>,
    origin: Arc<dyn OriginFetcher>,
    collection: CollectionType,
) -> Result<Arc<CacheEntry>, RefreshError> {
    let started_at = Instant::now();
    let result = match origin.fetch_collection(collection).await {
        Ok(data) => cache
            .set(collection.as_str(), data, None)
            .await
            .map_err(RefreshError::from),
        Err(err) => Err(RefreshError::Origin(error_chain(&err))),
    };

    let outcome = if result.is_ok() { "ok" } else { "error" };
    histogram!(METRIC_REFRESH_MS, "collection" => collection.as_str())
        .record(started_at.elapsed().as_secs_f64() * 1000.0);
    counter!(
        METRIC_REFRESH_TOTAL,
        "collection" => collection.as_str(),
        "result" => outcome
    )
    .increment(1);

    match &result {
        Ok(_) => {
            cache.record_refresh();
            info!(
                target = "vitrine::application::refresh",
                op = "refresh_partial",
                collection = collection.as_str(),
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                "Collection refreshed"
            );
        }
        Err(err) => warn!(
            target = "vitrine::application::refresh",
            op = "refresh_partial",
            collection = collection.as_str(),
            error = %err,
            "Collection refresh failed; cached entry left untouched"
        ),
    }
    result
}

fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut current = error.source();
    while let Some(inner) = current {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        current = inner.source();
    }
    message
}
