//! Construction and lifecycle of the cache service.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::application::content::ContentService;
use crate::application::origin::{OriginError, OriginFetcher};
use crate::application::refresh::{RefreshOrchestrator, RefreshSummary};
use crate::application::webhooks::{DispatcherConfig, WebhookDispatcher, WebhookIngress};
use crate::cache::{CacheConfig, CacheError, Clock, SystemClock, TtlCache, mutex_lock};
use crate::config::Settings;
use crate::infra::images::{ImageError, ImageMirror, ImageMirrorConfig};
use crate::infra::wordpress::WordPressOrigin;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("cache initialization failed")]
    Cache(#[from] CacheError),
    #[error("origin initialization failed")]
    Origin(#[from] OriginError),
    #[error("image mirror initialization failed")]
    Images(#[from] ImageError),
}

/// Every component of the running service, wired once and shared by handle.
#[derive(Debug, Clone)]
pub struct CacheService {
    cache: Arc<TtlCache>,
    orchestrator: Arc<RefreshOrchestrator>,
    content: ContentService,
    images: Option<Arc<ImageMirror>>,
    webhooks: Arc<WebhookIngress>,
    refresh_secret: Option<Arc<str>>,
    image_max_age: Duration,
    startup_warm: Arc<Mutex<Option<JoinHandle<()>>>>,
}

const SOURCE: &str = "application::service";

impl CacheService {
    /// Build against the configured WordPress origin and load persisted entries.
    ///
    /// Fails when no origin URL is configured.
    pub async fn start(settings: &Settings) -> Result<Self, ServiceError> {
        let origin = WordPressOrigin::from_settings(&settings.origin)?;
        let service = Self::assemble(settings, Arc::new(SystemClock), Arc::new(origin)).await?;

        if settings.cache.warm_on_startup {
            service.spawn_startup_warm();
        }
        Ok(service)
    }

    /// Wire the components around an explicit clock and origin.
    pub async fn assemble(
        settings: &Settings,
        clock: Arc<dyn Clock>,
        origin: Arc<dyn OriginFetcher>,
    ) -> Result<Self, ServiceError> {
        let cache = Arc::new(TtlCache::new(
            CacheConfig::from(&settings.cache),
            Arc::clone(&clock),
        )?);
        let restored = cache.load_persisted().await?;

        let orchestrator = Arc::new(RefreshOrchestrator::new(Arc::clone(&cache), origin));

        let images = if settings.images.enabled {
            let mirror =
                ImageMirror::open(ImageMirrorConfig::from(&settings.images), Arc::clone(&clock))
                    .await?;
            Some(Arc::new(mirror))
        } else {
            None
        };

        let content = ContentService::new(Arc::clone(&orchestrator), images.clone());
        let dispatcher = Arc::new(WebhookDispatcher::spawn(
            Arc::clone(&orchestrator),
            DispatcherConfig::from(&settings.webhooks),
        ));
        let webhooks = Arc::new(WebhookIngress::new(
            settings.webhooks.woocommerce_secret.clone(),
            settings.webhooks.wordpress_secret.clone(),
            dispatcher,
        ));

        if settings.security.refresh_secret.is_none() {
            warn!(
                target = "vitrine::application::service",
                op = "assemble",
                "No refresh secret configured; cache management routes will refuse requests"
            );
        }

        info!(
            target = "vitrine::application::service",
            op = "assemble",
            restored,
            images_enabled = images.is_some(),
            "Cache service ready"
        );

        Ok(Self {
            cache,
            orchestrator,
            content,
            images,
            webhooks,
            refresh_secret: settings.security.refresh_secret.as_deref().map(Arc::from),
            image_max_age: settings.images.max_age,
            startup_warm: Arc::new(Mutex::new(None)),
        })
    }

    /// Refresh everything in the background; `shutdown` waits for it.
    fn spawn_startup_warm(&self) {
        let orchestrator = Arc::clone(&self.orchestrator);
        let handle = tokio::spawn(async move {
            let summary = orchestrator.refresh_all().await;
            info!(
                target = "vitrine::application::service",
                op = "startup_warm",
                succeeded = summary.succeeded.len(),
                failed = summary.failed.len(),
                "Startup warm finished"
            );
        });
        *mutex_lock(&self.startup_warm, SOURCE, "spawn_startup_warm") = Some(handle);
    }

    pub fn cache(&self) -> &Arc<TtlCache> {
        &self.cache
    }

    pub fn orchestrator(&self) -> &Arc<RefreshOrchestrator> {
        &self.orchestrator
    }

    pub fn content(&self) -> &ContentService {
        &self.content
    }

    pub fn images(&self) -> Option<&Arc<ImageMirror>> {
        self.images.as_ref()
    }

    pub fn webhooks(&self) -> &Arc<WebhookIngress> {
        &self.webhooks
    }

    pub fn refresh_secret(&self) -> Option<&str> {
        self.refresh_secret.as_deref()
    }

    /// Default age threshold for image cleanup.
    pub fn image_max_age(&self) -> Duration {
        self.image_max_age
    }

    pub async fn warm(&self) -> RefreshSummary {
        self.orchestrator.refresh_all().await
    }

    /// Wait for the startup warm, drain queued webhook work and persist the image index.
    pub async fn shutdown(&self) {
        let warm = mutex_lock(&self.startup_warm, SOURCE, "shutdown").take();
        if let Some(handle) = warm
            && let Err(err) = handle.await
        {
            error!(
                target = "vitrine::application::service",
                op = "shutdown",
                error = %err,
                "Startup warm task failed"
            );
        }
        self.webhooks.dispatcher().shutdown().await;
        if let Some(images) = &self.images
            && let Err(err) = images.persist_index().await
        {
            warn!(
                target = "vitrine::application::service",
                op = "shutdown",
                error = %err,
                "Failed to persist image index"
            );
        }
        info!(
            target = "vitrine::application::service",
            op = "shutdown",
            "Cache service stopped"
        );
    }
}
