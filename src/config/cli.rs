use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the Vitrine binary.
#[derive(Debug, Parser)]
#[command(name = "vitrine", version, about = "Vitrine storefront cache service")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "VITRINE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub legacy: LegacyEnv,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service.
    Serve(Box<ServeArgs>),
    /// Refresh every collection once and exit.
    Warm(OriginArgs),
    /// Delete mirrored images older than the configured maximum age.
    #[command(name = "cleanup-images")]
    CleanupImages(CleanupImagesArgs),
}

/// Deployment environment variables predating the layered `VITRINE__*` scheme.
#[derive(Debug, Args, Default, Clone)]
pub struct LegacyEnv {
    #[arg(long, hide = true, env = "CACHE_REFRESH_SECRET", hide_env_values = true)]
    pub cache_refresh_secret: Option<String>,

    #[arg(long, hide = true, env = "WC_WEBHOOK_SECRET", hide_env_values = true)]
    pub wc_webhook_secret: Option<String>,

    #[arg(long, hide = true, env = "WEBHOOK_SECRET", hide_env_values = true)]
    pub webhook_secret: Option<String>,

    #[arg(long, hide = true, env = "WORDPRESS_URL")]
    pub wordpress_url: Option<String>,

    #[arg(long, hide = true, env = "WC_CONSUMER_KEY", hide_env_values = true)]
    pub wc_consumer_key: Option<String>,

    #[arg(long, hide = true, env = "WC_CONSUMER_SECRET", hide_env_values = true)]
    pub wc_consumer_secret: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct OriginArgs {
    /// Override the WordPress origin base URL.
    #[arg(long = "origin-url", value_name = "URL")]
    pub origin_url: Option<String>,

    /// Override the cache directory.
    #[arg(long = "cache-directory", value_name = "PATH")]
    pub cache_directory: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct CleanupImagesArgs {
    /// Maximum age in seconds; older images are removed.
    #[arg(long = "max-age-seconds", value_name = "SECONDS")]
    pub max_age_seconds: Option<u64>,

    /// Override the image mirror directory.
    #[arg(long = "images-directory", value_name = "PATH")]
    pub images_directory: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub origin: OriginArgs,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Refresh every collection in the background after startup.
    #[arg(
        long = "cache-warm-on-startup",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub warm_on_startup: Option<bool>,

    /// Override the image mirror directory.
    #[arg(long = "images-directory", value_name = "PATH")]
    pub images_directory: Option<PathBuf>,

    /// Accept invalid TLS certificates when downloading images.
    #[arg(
        long = "images-allow-insecure-origin",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub images_allow_insecure_origin: Option<bool>,
}
