use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use dashmap::{DashMap, DashSet};
use futures::{StreamExt, stream};
use metrics::counter;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::fs;
use tracing::{debug, info, warn};

use vitrine_api_types::ImageStatsView;

use crate::cache::{Clock, SingleFlight, rw_read, rw_write, write_atomic};
use crate::config::ImageSettings;

use super::naming::{filename_for, is_valid_filename};

const SOURCE: &str = "infra::images::mirror";
const INDEX_FILE: &str = "index.json";
pub(crate) const METRIC_IMAGE_DOWNLOAD: &str = "vitrine_image_download_total";
pub(crate) const METRIC_IMAGE_HIT: &str = "vitrine_image_hit_total";
/// Background mirroring skips a URL for this long after it failed.
const FAILED_RETRY_AFTER: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ImageError {
    #[error("unsupported image URL `{0}`")]
    InvalidUrl(String),
    #[error("image request failed: {0}")]
    Request(String),
    #[error("image origin responded with {status}")]
    Status { status: u16 },
    #[error("unexpected content type `{0}`")]
    NotAnImage(String),
    #[error("image exceeds {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("image storage failed: {0}")]
    Io(String),
    #[error("download was abandoned before completing")]
    Abandoned,
}

impl From<std::io::Error> for ImageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// One mirrored image, as recorded in `index.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    pub filename: String,
    pub source_url: String,
    pub mime_type: String,
    pub size: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub downloaded_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct ImageFile {
    pub bytes: Bytes,
    pub mime_type: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: usize,
    pub freed_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct ImageMirrorConfig {
    pub directory: PathBuf,
    pub public_path: String,
    pub allow_insecure_origin: bool,
    pub download_timeout: Duration,
    pub max_image_bytes: u64,
    pub concurrency: usize,
}

impl ImageMirrorConfig {
    pub fn with_directory(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            public_path: "/images".to_string(),
            allow_insecure_origin: false,
            download_timeout: Duration::from_secs(15),
            max_image_bytes: 20 * 1024 * 1024,
            concurrency: 4,
        }
    }
}

impl From<&ImageSettings> for ImageMirrorConfig {
    fn from(settings: &ImageSettings) -> Self {
        Self {
            directory: settings.directory.clone(),
            public_path: settings.public_path.clone(),
            allow_insecure_origin: settings.allow_insecure_origin,
            download_timeout: settings.download_timeout,
            max_image_bytes: settings.max_image_bytes.get(),
            concurrency: settings.concurrency.get() as usize,
        }
    }
}

/// Content-addressed local copy of product images.
#[derive(Debug)]
pub struct ImageMirror {
    config: ImageMirrorConfig,
    client: Client,
    clock: Arc<dyn Clock>,
    index: RwLock<HashMap<String, ImageRecord>>,
    flights: SingleFlight<String, Result<ImageRecord, ImageError>>,
    queued: DashSet<String>,
    failed: DashMap<String, Instant>,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    download_errors: AtomicU64,
    last_cleanup: RwLock<Option<OffsetDateTime>>,
}

impl ImageMirror {
    /// Open the mirror directory and load its index. A corrupt index starts empty.
    pub async fn open(config: ImageMirrorConfig, clock: Arc<dyn Clock>) -> Result<Self, ImageError> {
        fs::create_dir_all(&config.directory).await?;

        if config.allow_insecure_origin {
            warn!(
                target = "vitrine::infra::images",
                op = "open",
                "TLS certificate verification is disabled for image downloads"
            );
        }

        let client = Client::builder()
            .user_agent(concat!("vitrine/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(config.allow_insecure_origin)
            .build()
            .map_err(|err| ImageError::Request(err.to_string()))?;

        let index = load_index(&config.directory.join(INDEX_FILE)).await;
        info!(
            target = "vitrine::infra::images",
            op = "open",
            directory = %config.directory.display(),
            images = index.len(),
            "Image mirror ready"
        );

        Ok(Self {
            config,
            client,
            clock,
            index: RwLock::new(index),
            flights: SingleFlight::new(),
            queued: DashSet::new(),
            failed: DashMap::new(),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            download_errors: AtomicU64::new(0),
            last_cleanup: RwLock::new(None),
        })
    }

    pub fn local_url(&self, filename: &str) -> String {
        format!("{}/{filename}", self.config.public_path)
    }

    /// Mirror every distinct `images[].src` and return the products with
    /// successful sources rewritten to local URLs. Failures keep the origin URL.
    pub async fn cache_product_images(self: &Arc<Self>, products: &[Value]) -> Vec<Value> {
        let urls = distinct_sources(products);
        if urls.is_empty() {
            return products.to_vec();
        }
        let local = self.mirror_all(urls, "cache_product_images").await;
        products
            .iter()
            .map(|product| rewrite_sources(product, &local))
            .collect()
    }

    /// Rewrite sources that are already mirrored and queue the others for a
    /// background download. Never waits on the network.
    pub fn localize_products(self: &Arc<Self>, products: &[Value]) -> Vec<Value> {
        let mut local = HashMap::new();
        let mut pending = Vec::new();
        {
            let index = rw_read(&self.index, SOURCE, "localize_products");
            for url in distinct_sources(products) {
                let Some(filename) = filename_for(&url) else {
                    continue;
                };
                if index.contains_key(&filename) {
                    self.cache_hits.fetch_add(1, Ordering::Relaxed);
                    counter!(METRIC_IMAGE_HIT).increment(1);
                    local.insert(url, self.local_url(&filename));
                } else if !self.recently_failed(&url) && self.queued.insert(url.clone()) {
                    pending.push(url);
                }
            }
        }

        if !pending.is_empty() {
            let mirror = Arc::clone(self);
            tokio::spawn(async move {
                let urls = pending.clone();
                mirror.mirror_all(pending, "localize_products").await;
                for url in &urls {
                    mirror.queued.remove(url);
                }
            });
        }

        products
            .iter()
            .map(|product| rewrite_sources(product, &local))
            .collect()
    }

    fn recently_failed(&self, url: &str) -> bool {
        match self.failed.get(url).map(|at| at.elapsed()) {
            Some(elapsed) if elapsed < FAILED_RETRY_AFTER => true,
            Some(_) => {
                self.failed.remove(url);
                false
            }
            None => false,
        }
    }

    /// Mirror `urls` with bounded concurrency; returns source URL to local URL.
    async fn mirror_all(
        self: &Arc<Self>,
        urls: Vec<String>,
        op: &'static str,
    ) -> HashMap<String, String> {
        let started_at = Instant::now();
        let total = urls.len();
        let results: Vec<(String, Result<ImageRecord, ImageError>)> = stream::iter(urls)
            .map(|url| async move {
                let result = self.mirror_url(&url).await;
                (url, result)
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut local = HashMap::new();
        let mut failed = 0_usize;
        for (url, result) in results {
            match result {
                Ok(record) => {
                    local.insert(url, self.local_url(&record.filename));
                }
                Err(err) => {
                    failed += 1;
                    warn!(
                        target = "vitrine::infra::images",
                        op,
                        url = %url,
                        error = %err,
                        "Image mirror failed; keeping origin URL"
                    );
                }
            }
        }

        if !local.is_empty()
            && let Err(err) = self.persist_index().await
        {
            warn!(
                target = "vitrine::infra::images",
                op = "persist_index",
                error = %err,
                "Failed to persist image index"
            );
        }

        debug!(
            target = "vitrine::infra::images",
            op,
            urls = total,
            mirrored = local.len(),
            failed,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Product images processed"
        );
        local
    }

    /// Mirror a single URL. Already indexed files are not downloaded again.
    pub async fn mirror_url(self: &Arc<Self>, source_url: &str) -> Result<ImageRecord, ImageError> {
        let Some(filename) = filename_for(source_url) else {
            self.download_errors.fetch_add(1, Ordering::Relaxed);
            self.failed.insert(source_url.to_string(), Instant::now());
            return Err(ImageError::InvalidUrl(source_url.to_string()));
        };

        if let Some(record) = self.indexed(&filename).await {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            counter!(METRIC_IMAGE_HIT).increment(1);
            return Ok(record);
        }

        let mirror = Arc::clone(self);
        let url = source_url.to_string();
        let result = self
            .flights
            .run(filename.clone(), || async move {
                mirror.download(&url, &filename).await
            })
            .await
            .unwrap_or(Err(ImageError::Abandoned));

        match &result {
            Ok(_) => {
                self.failed.remove(source_url);
                counter!(METRIC_IMAGE_DOWNLOAD, "result" => "ok").increment(1);
            }
            Err(_) => {
                self.failed.insert(source_url.to_string(), Instant::now());
                self.download_errors.fetch_add(1, Ordering::Relaxed);
                counter!(METRIC_IMAGE_DOWNLOAD, "result" => "error").increment(1);
            }
        }
        result
    }

    /// Bytes and MIME type of an indexed image; `None` for unknown or invalid names.
    pub async fn get_image_file(&self, filename: &str) -> Option<ImageFile> {
        if !is_valid_filename(filename) {
            return None;
        }
        let record = rw_read(&self.index, SOURCE, "get_image_file")
            .get(filename)
            .cloned()?;

        match fs::read(self.config.directory.join(&record.filename)).await {
            Ok(bytes) => Some(ImageFile {
                bytes: Bytes::from(bytes),
                mime_type: record.mime_type,
            }),
            Err(err) => {
                if err.kind() != ErrorKind::NotFound {
                    warn!(
                        target = "vitrine::infra::images",
                        op = "get_image_file",
                        filename,
                        error = %err,
                        "Failed to read mirrored image"
                    );
                }
                None
            }
        }
    }

    pub fn stats(&self) -> ImageStatsView {
        let index = rw_read(&self.index, SOURCE, "stats");
        ImageStatsView {
            total_images: index.len(),
            total_size: index.values().map(|record| record.size).sum(),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            download_errors: self.download_errors.load(Ordering::Relaxed),
            last_cleanup: *rw_read(&self.last_cleanup, SOURCE, "stats.last_cleanup"),
        }
    }

    /// Delete images downloaded more than `max_age` ago.
    pub async fn cleanup(&self, max_age: Duration) -> Result<CleanupReport, ImageError> {
        let now = self.clock.now();
        let expired: Vec<ImageRecord> = rw_read(&self.index, SOURCE, "cleanup.scan")
            .values()
            .filter(|record| now - record.downloaded_at > max_age)
            .cloned()
            .collect();

        let mut report = CleanupReport::default();
        for record in expired {
            match fs::remove_file(self.config.directory.join(&record.filename)).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(
                        target = "vitrine::infra::images",
                        op = "cleanup",
                        filename = %record.filename,
                        error = %err,
                        "Failed to delete expired image; keeping record"
                    );
                    continue;
                }
            }
            rw_write(&self.index, SOURCE, "cleanup.remove").remove(&record.filename);
            report.removed += 1;
            report.freed_bytes += record.size;
        }

        *rw_write(&self.last_cleanup, SOURCE, "cleanup.last_cleanup") = Some(now);
        self.persist_index().await?;

        info!(
            target = "vitrine::infra::images",
            op = "cleanup",
            removed = report.removed,
            freed_bytes = report.freed_bytes,
            max_age_secs = max_age.as_secs(),
            "Image cleanup finished"
        );
        Ok(report)
    }

    pub async fn persist_index(&self) -> Result<(), ImageError> {
        let bytes = {
            let index = rw_read(&self.index, SOURCE, "persist_index");
            let mut records: Vec<&ImageRecord> = index.values().collect();
            records.sort_by(|a, b| a.filename.cmp(&b.filename));
            serde_json::to_vec_pretty(&records).map_err(|err| ImageError::Io(err.to_string()))?
        };
        write_atomic(self.config.directory.join(INDEX_FILE), bytes).await?;
        Ok(())
    }

    async fn indexed(&self, filename: &str) -> Option<ImageRecord> {
        let record = rw_read(&self.index, SOURCE, "indexed")
            .get(filename)
            .cloned()?;
        match fs::metadata(self.config.directory.join(filename)).await {
            Ok(_) => Some(record),
            Err(_) => {
                rw_write(&self.index, SOURCE, "indexed.evict").remove(filename);
                None
            }
        }
    }

    async fn download(&self, source_url: &str, filename: &str) -> Result<ImageRecord, ImageError> {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
        let started_at = Instant::now();

        let mut response = self
            .client
            .get(source_url)
            .timeout(self.config.download_timeout)
            .send()
            .await
            .map_err(|err| ImageError::Request(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ImageError::Status {
                status: status.as_u16(),
            });
        }

        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or_default().trim().to_ascii_lowercase())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| {
                mime_guess::from_path(filename)
                    .first_or_octet_stream()
                    .essence_str()
                    .to_string()
            });
        if !mime_type.starts_with("image/") {
            return Err(ImageError::NotAnImage(mime_type));
        }

        let limit = self.config.max_image_bytes;
        if response.content_length().is_some_and(|length| length > limit) {
            return Err(ImageError::TooLarge { limit });
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|err| ImageError::Request(err.to_string()))?
        {
            if (body.len() + chunk.len()) as u64 > limit {
                return Err(ImageError::TooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }

        let size = body.len() as u64;
        write_atomic(self.config.directory.join(filename), body.to_vec()).await?;

        let record = ImageRecord {
            filename: filename.to_string(),
            source_url: source_url.to_string(),
            mime_type,
            size,
            downloaded_at: self.clock.now(),
        };
        rw_write(&self.index, SOURCE, "download.insert")
            .insert(record.filename.clone(), record.clone());

        debug!(
            target = "vitrine::infra::images",
            op = "download",
            filename,
            size,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Image mirrored"
        );
        Ok(record)
    }
}

async fn load_index(path: &Path) -> HashMap<String, ImageRecord> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return HashMap::new(),
        Err(err) => {
            warn!(
                target = "vitrine::infra::images",
                op = "load_index",
                path = %path.display(),
                error = %err,
                "Failed to read image index; starting empty"
            );
            return HashMap::new();
        }
    };

    match serde_json::from_slice::<Vec<ImageRecord>>(&bytes) {
        Ok(records) => records
            .into_iter()
            .filter(|record| is_valid_filename(&record.filename))
            .map(|record| (record.filename.clone(), record))
            .collect(),
        Err(err) => {
            warn!(
                target = "vitrine::infra::images",
                op = "load_index",
                path = %path.display(),
                error = %err,
                "Corrupt image index; starting empty"
            );
            HashMap::new()
        }
    }
}

fn distinct_sources(products: &[Value]) -> Vec<String> {
    let mut seen = HashSet::new();
    products
        .iter()
        .flat_map(crate::domain::product::image_sources)
        .filter(|src| seen.insert(*src))
        .map(str::to_string)
        .collect()
}

fn rewrite_sources(product: &Value, local: &HashMap<String, String>) -> Value {
    let mut product = product.clone();
    if let Some(images) = product.get_mut("images").and_then(Value::as_array_mut) {
        for image in images {
            let replacement = image
                .get("src")
                .and_then(Value::as_str)
                .and_then(|src| local.get(src))
                .cloned();
            if let (Some(url), Some(object)) = (replacement, image.as_object_mut()) {
                object.insert("src".to_string(), Value::String(url));
            }
        }
    }
    product
}
