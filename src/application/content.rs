//! Cache-first content reads with last-known-good fallback.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, warn};

use vitrine_api_types::{ContentResponse, ContentSource};

use crate::application::refresh::{RefreshError, RefreshOrchestrator};
use crate::cache::CacheEntry;
use crate::domain::CollectionType;
use crate::domain::product::{position_in, product_key};
use crate::infra::images::ImageMirror;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("`{resource}` is unavailable and nothing was cached")]
    Unavailable {
        resource: String,
        #[source]
        source: RefreshError,
    },
    #[error("product {id} does not exist upstream")]
    ProductNotFound { id: u64 },
}

/// Data returned to a reader together with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentRead {
    pub data: Value,
    pub source: ContentSource,
    pub last_updated: OffsetDateTime,
}

impl ContentRead {
    fn from_entry(entry: &CacheEntry, source: ContentSource) -> Self {
        Self {
            data: entry.data.clone(),
            source,
            last_updated: entry.last_updated,
        }
    }

    pub fn into_response(self) -> ContentResponse {
        ContentResponse {
            success: true,
            data: self.data,
            source: self.source,
            last_updated: self.last_updated,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContentService {
    orchestrator: Arc<RefreshOrchestrator>,
    images: Option<Arc<ImageMirror>>,
}

impl ContentService {
    pub fn new(orchestrator: Arc<RefreshOrchestrator>, images: Option<Arc<ImageMirror>>) -> Self {
        Self {
            orchestrator,
            images,
        }
    }

    /// Fresh cache, else a refresh, else the stale entry, else an error.
    pub async fn collection(&self, collection: CollectionType) -> Result<ContentRead, ContentError> {
        let cache = self.orchestrator.cache();
        if let Some(entry) = cache.get(collection.as_str()).await {
            return Ok(ContentRead::from_entry(&entry, ContentSource::Cache));
        }

        match self.orchestrator.refresh_partial(collection).await {
            Ok(entry) => Ok(ContentRead::from_entry(&entry, ContentSource::Origin)),
            Err(err) => match cache.peek(collection.as_str()).await {
                Some(entry) => {
                    warn!(
                        target = "vitrine::application::content",
                        op = "collection",
                        collection = collection.as_str(),
                        error = %err,
                        "Serving stale entry after failed refresh"
                    );
                    Ok(ContentRead::from_entry(&entry, ContentSource::Stale))
                }
                None => Err(ContentError::Unavailable {
                    resource: collection.as_str().to_string(),
                    source: err,
                }),
            },
        }
    }

    /// Like [`Self::collection`], with already mirrored product images pointing at
    /// the local copy. Unknown images are mirrored in the background.
    pub async fn collection_for_display(
        &self,
        collection: CollectionType,
    ) -> Result<ContentRead, ContentError> {
        let mut read = self.collection(collection).await?;
        if collection == CollectionType::Products
            && let Some(images) = &self.images
            && let Some(products) = read.data.as_array()
        {
            read.data = Value::Array(images.localize_products(products));
        }
        Ok(read)
    }

    /// Single product: its own entry, then the cached list, then the origin.
    pub async fn product(&self, id: u64) -> Result<ContentRead, ContentError> {
        let read = self.product_raw(id).await?;
        Ok(self.localize_single(read))
    }

    async fn product_raw(&self, id: u64) -> Result<ContentRead, ContentError> {
        let cache = self.orchestrator.cache();
        let key = product_key(id);
        if let Some(entry) = cache.get(&key).await {
            return Ok(ContentRead::from_entry(&entry, ContentSource::Cache));
        }
        if let Some(list) = cache.get(CollectionType::Products.as_str()).await
            && let Some(product) = find_in_list(&list, id)
        {
            debug!(
                target = "vitrine::application::content",
                op = "product",
                product_id = id,
                "Product served from cached list"
            );
            return Ok(ContentRead {
                data: product,
                source: ContentSource::Cache,
                last_updated: list.last_updated,
            });
        }

        match self.orchestrator.refresh_product(id).await {
            Ok(Some(entry)) => Ok(ContentRead::from_entry(&entry, ContentSource::Origin)),
            Ok(None) => Err(ContentError::ProductNotFound { id }),
            Err(err) => {
                if let Some(entry) = cache.peek(&key).await {
                    return Ok(ContentRead::from_entry(&entry, ContentSource::Stale));
                }
                if let Some(list) = cache.peek(CollectionType::Products.as_str()).await
                    && let Some(product) = find_in_list(&list, id)
                {
                    return Ok(ContentRead {
                        data: product,
                        source: ContentSource::Stale,
                        last_updated: list.last_updated,
                    });
                }
                Err(ContentError::Unavailable {
                    resource: key,
                    source: err,
                })
            }
        }
    }

    fn localize_single(&self, mut read: ContentRead) -> ContentRead {
        if let Some(images) = &self.images {
            let localized = images.localize_products(std::slice::from_ref(&read.data));
            if let Some(product) = localized.into_iter().next() {
                read.data = product;
            }
        }
        read
    }
}

fn find_in_list(entry: &CacheEntry, id: u64) -> Option<Value> {
    let list = entry.data.as_array()?;
    position_in(list, id).map(|index| list[index].clone())
}
