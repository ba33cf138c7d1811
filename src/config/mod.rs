//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

pub use cli::{
    CleanupImagesArgs, CliArgs, Command, LegacyEnv, OriginArgs, ServeArgs, ServeOverrides,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "vitrine";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_CACHE_DIR: &str = ".cache/vitrine";
const DEFAULT_PRODUCTS_TTL_MINUTES: u32 = 60;
const DEFAULT_CATEGORIES_TTL_MINUTES: u32 = 120;
const DEFAULT_PAGES_TTL_MINUTES: u32 = 120;
const DEFAULT_POSTS_TTL_MINUTES: u32 = 60;
const DEFAULT_MENUS_TTL_MINUTES: u32 = 720;
const DEFAULT_SITE_INFO_TTL_MINUTES: u32 = 1440;
const DEFAULT_ORIGIN_TIMEOUT_SECS: u64 = 10;
const DEFAULT_ORIGIN_PER_PAGE: u32 = 100;
const DEFAULT_ORIGIN_MAX_PAGES: u32 = 50;
const DEFAULT_IMAGES_DIR: &str = ".cache/vitrine/images";
const DEFAULT_IMAGES_PUBLIC_PATH: &str = "/images";
pub(crate) const DEFAULT_IMAGE_MAX_AGE_SECS: u64 = 7 * 24 * 60 * 60;
const DEFAULT_IMAGE_DOWNLOAD_TIMEOUT_SECS: u64 = 15;
const DEFAULT_MAX_IMAGE_BYTES: u64 = 20 * 1024 * 1024;
const DEFAULT_IMAGE_CONCURRENCY: u32 = 4;
const DEFAULT_WEBHOOK_QUEUE_CAPACITY: u32 = 256;
const DEFAULT_WEBHOOK_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_WEBHOOK_RETRY_BACKOFF_MS: u64 = 500;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub origin: OriginSettings,
    pub images: ImageSettings,
    pub webhooks: WebhookSettings,
    pub security: SecuritySettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub directory: PathBuf,
    pub products_ttl_minutes: NonZeroU32,
    pub categories_ttl_minutes: NonZeroU32,
    pub pages_ttl_minutes: NonZeroU32,
    pub posts_ttl_minutes: NonZeroU32,
    pub menus_ttl_minutes: NonZeroU32,
    pub site_info_ttl_minutes: NonZeroU32,
    pub warm_on_startup: bool,
}

#[derive(Debug, Clone)]
pub struct OriginSettings {
    /// WordPress base URL; `serve` and `warm` refuse to start without it.
    pub wordpress_url: Option<Url>,
    pub consumer_key: Option<String>,
    pub consumer_secret: Option<String>,
    pub timeout: Duration,
    pub per_page: NonZeroU32,
    pub max_pages: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct ImageSettings {
    pub enabled: bool,
    pub directory: PathBuf,
    pub public_path: String,
    pub max_age: Duration,
    pub allow_insecure_origin: bool,
    pub download_timeout: Duration,
    pub max_image_bytes: NonZeroU64,
    pub concurrency: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct WebhookSettings {
    pub woocommerce_secret: Option<String>,
    pub wordpress_secret: Option<String>,
    pub queue_capacity: NonZeroU32,
    pub max_attempts: NonZeroU32,
    pub retry_backoff: Duration,
}

#[derive(Debug, Clone)]
pub struct SecuritySettings {
    pub refresh_secret: Option<String>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("VITRINE").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_legacy_env(&cli.legacy);

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Warm(args)) => raw.apply_origin_overrides(args),
        Some(Command::CleanupImages(args)) => {
            if let Some(directory) = args.images_directory.as_ref() {
                raw.images.directory = Some(directory.clone());
            }
        }
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    origin: RawOriginSettings,
    images: RawImageSettings,
    webhooks: RawWebhookSettings,
    security: RawSecuritySettings,
}

impl RawSettings {
    /// Legacy variables only fill values the layered sources left unset.
    fn apply_legacy_env(&mut self, legacy: &LegacyEnv) {
        fill(
            &mut self.security.refresh_secret,
            legacy.cache_refresh_secret.as_ref(),
        );
        fill(
            &mut self.webhooks.woocommerce_secret,
            legacy
                .wc_webhook_secret
                .as_ref()
                .or(legacy.webhook_secret.as_ref()),
        );
        fill(&mut self.origin.wordpress_url, legacy.wordpress_url.as_ref());
        fill(&mut self.origin.consumer_key, legacy.wc_consumer_key.as_ref());
        fill(
            &mut self.origin.consumer_secret,
            legacy.wc_consumer_secret.as_ref(),
        );
    }

    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(warm) = overrides.warm_on_startup {
            self.cache.warm_on_startup = Some(warm);
        }
        if let Some(directory) = overrides.images_directory.as_ref() {
            self.images.directory = Some(directory.clone());
        }
        if let Some(allow) = overrides.images_allow_insecure_origin {
            self.images.allow_insecure_origin = Some(allow);
        }

        self.apply_origin_overrides(&overrides.origin);
    }

    fn apply_origin_overrides(&mut self, overrides: &OriginArgs) {
        if let Some(url) = overrides.origin_url.as_ref() {
            self.origin.wordpress_url = Some(url.clone());
        }
        if let Some(directory) = overrides.cache_directory.as_ref() {
            self.cache.directory = Some(directory.clone());
        }
    }
}

fn fill(slot: &mut Option<String>, fallback: Option<&String>) {
    if slot.as_deref().is_none_or(|value| value.trim().is_empty())
        && let Some(value) = fallback
    {
        *slot = Some(value.clone());
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            cache,
            origin,
            images,
            webhooks,
            security,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            cache: build_cache_settings(cache)?,
            origin: build_origin_settings(origin)?,
            images: build_image_settings(images)?,
            webhooks: build_webhook_settings(webhooks)?,
            security: SecuritySettings {
                refresh_secret: non_empty(security.refresh_secret),
            },
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let directory = cache
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "cache.directory",
            "path must not be empty",
        ));
    }

    Ok(CacheSettings {
        directory,
        products_ttl_minutes: non_zero_u32(
            cache
                .products_ttl_minutes
                .unwrap_or(DEFAULT_PRODUCTS_TTL_MINUTES)
                .into(),
            "cache.products_ttl_minutes",
        )?,
        categories_ttl_minutes: non_zero_u32(
            cache
                .categories_ttl_minutes
                .unwrap_or(DEFAULT_CATEGORIES_TTL_MINUTES)
                .into(),
            "cache.categories_ttl_minutes",
        )?,
        pages_ttl_minutes: non_zero_u32(
            cache
                .pages_ttl_minutes
                .unwrap_or(DEFAULT_PAGES_TTL_MINUTES)
                .into(),
            "cache.pages_ttl_minutes",
        )?,
        posts_ttl_minutes: non_zero_u32(
            cache
                .posts_ttl_minutes
                .unwrap_or(DEFAULT_POSTS_TTL_MINUTES)
                .into(),
            "cache.posts_ttl_minutes",
        )?,
        menus_ttl_minutes: non_zero_u32(
            cache
                .menus_ttl_minutes
                .unwrap_or(DEFAULT_MENUS_TTL_MINUTES)
                .into(),
            "cache.menus_ttl_minutes",
        )?,
        site_info_ttl_minutes: non_zero_u32(
            cache
                .site_info_ttl_minutes
                .unwrap_or(DEFAULT_SITE_INFO_TTL_MINUTES)
                .into(),
            "cache.site_info_ttl_minutes",
        )?,
        warm_on_startup: cache.warm_on_startup.unwrap_or(false),
    })
}

fn build_origin_settings(origin: RawOriginSettings) -> Result<OriginSettings, LoadError> {
    let wordpress_url = match non_empty(origin.wordpress_url) {
        Some(raw) => {
            let url = Url::parse(&raw).map_err(|err| {
                LoadError::invalid("origin.wordpress_url", format!("failed to parse: {err}"))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(LoadError::invalid(
                    "origin.wordpress_url",
                    "scheme must be http or https",
                ));
            }
            Some(url)
        }
        None => None,
    };

    let timeout_secs = origin
        .timeout_seconds
        .unwrap_or(DEFAULT_ORIGIN_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "origin.timeout_seconds",
            "must be greater than zero",
        ));
    }

    let per_page = non_zero_u32(
        origin.per_page.unwrap_or(DEFAULT_ORIGIN_PER_PAGE).into(),
        "origin.per_page",
    )?;
    if per_page.get() > 100 {
        return Err(LoadError::invalid(
            "origin.per_page",
            "WordPress accepts at most 100 items per page",
        ));
    }

    Ok(OriginSettings {
        wordpress_url,
        consumer_key: non_empty(origin.consumer_key),
        consumer_secret: non_empty(origin.consumer_secret),
        timeout: Duration::from_secs(timeout_secs),
        per_page,
        max_pages: non_zero_u32(
            origin.max_pages.unwrap_or(DEFAULT_ORIGIN_MAX_PAGES).into(),
            "origin.max_pages",
        )?,
    })
}

fn build_image_settings(images: RawImageSettings) -> Result<ImageSettings, LoadError> {
    let directory = images
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_IMAGES_DIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "images.directory",
            "path must not be empty",
        ));
    }

    let public_path = images
        .public_path
        .unwrap_or_else(|| DEFAULT_IMAGES_PUBLIC_PATH.to_string());
    let public_path = public_path.trim_end_matches('/').to_string();
    if !public_path.starts_with('/') {
        return Err(LoadError::invalid(
            "images.public_path",
            "must start with `/`",
        ));
    }

    let max_age_secs = images.max_age_seconds.unwrap_or(DEFAULT_IMAGE_MAX_AGE_SECS);
    let timeout_secs = images
        .download_timeout_seconds
        .unwrap_or(DEFAULT_IMAGE_DOWNLOAD_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "images.download_timeout_seconds",
            "must be greater than zero",
        ));
    }

    let max_image_bytes = NonZeroU64::new(
        images.max_image_bytes.unwrap_or(DEFAULT_MAX_IMAGE_BYTES),
    )
    .ok_or_else(|| LoadError::invalid("images.max_image_bytes", "must be greater than zero"))?;

    Ok(ImageSettings {
        enabled: images.enabled.unwrap_or(true),
        directory,
        public_path,
        max_age: Duration::from_secs(max_age_secs),
        allow_insecure_origin: images.allow_insecure_origin.unwrap_or(false),
        download_timeout: Duration::from_secs(timeout_secs),
        max_image_bytes,
        concurrency: non_zero_u32(
            images
                .concurrency
                .unwrap_or(DEFAULT_IMAGE_CONCURRENCY)
                .into(),
            "images.concurrency",
        )?,
    })
}

fn build_webhook_settings(webhooks: RawWebhookSettings) -> Result<WebhookSettings, LoadError> {
    Ok(WebhookSettings {
        woocommerce_secret: non_empty(webhooks.woocommerce_secret),
        wordpress_secret: non_empty(webhooks.wordpress_secret),
        queue_capacity: non_zero_u32(
            webhooks
                .queue_capacity
                .unwrap_or(DEFAULT_WEBHOOK_QUEUE_CAPACITY)
                .into(),
            "webhooks.queue_capacity",
        )?,
        max_attempts: non_zero_u32(
            webhooks
                .max_attempts
                .unwrap_or(DEFAULT_WEBHOOK_MAX_ATTEMPTS)
                .into(),
            "webhooks.max_attempts",
        )?,
        retry_backoff: Duration::from_millis(
            webhooks
                .retry_backoff_ms
                .unwrap_or(DEFAULT_WEBHOOK_RETRY_BACKOFF_MS),
        ),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    directory: Option<PathBuf>,
    products_ttl_minutes: Option<u32>,
    categories_ttl_minutes: Option<u32>,
    pages_ttl_minutes: Option<u32>,
    posts_ttl_minutes: Option<u32>,
    menus_ttl_minutes: Option<u32>,
    site_info_ttl_minutes: Option<u32>,
    warm_on_startup: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawOriginSettings {
    wordpress_url: Option<String>,
    consumer_key: Option<String>,
    consumer_secret: Option<String>,
    timeout_seconds: Option<u64>,
    per_page: Option<u32>,
    max_pages: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawImageSettings {
    enabled: Option<bool>,
    directory: Option<PathBuf>,
    public_path: Option<String>,
    max_age_seconds: Option<u64>,
    allow_insecure_origin: Option<bool>,
    download_timeout_seconds: Option<u64>,
    max_image_bytes: Option<u64>,
    concurrency: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawWebhookSettings {
    woocommerce_secret: Option<String>,
    wordpress_secret: Option<String>,
    queue_capacity: Option<u32>,
    max_attempts: Option<u32>,
    retry_backoff_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSecuritySettings {
    refresh_secret: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

#[cfg(test)]
mod tests;
