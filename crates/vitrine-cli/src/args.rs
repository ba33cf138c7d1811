use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "vitrine-cli",
    version,
    about = "Operate a running Vitrine cache: refresh, invalidate, inspect, mirror images."
)]
pub struct Cli {
    /// Base URL of the Vitrine server.
    #[arg(long, env = "VITRINE_SITE_URL", global = true)]
    pub site: Option<String>,

    /// Refresh secret. Prefer --secret-file so it stays out of shell history.
    #[arg(long, env = "VITRINE_REFRESH_SECRET", global = true, hide_env_values = true)]
    pub secret: Option<String>,

    /// File holding the refresh secret.
    #[arg(long, env = "VITRINE_REFRESH_SECRET_FILE", global = true)]
    pub secret_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Refresh every collection from the origin.
    Init,
    /// Refresh one collection, or everything when no type is given.
    Refresh(RefreshArgs),
    /// Drop cached entries.
    Invalidate(InvalidateArgs),
    /// Print cache statistics.
    Stats,
    /// Manage the product image mirror.
    #[command(subcommand)]
    Images(ImagesCommands),
}

#[derive(Args, Debug)]
pub struct RefreshArgs {
    /// products, categories, pages, posts, menus, site-info or all.
    #[arg(long = "type", value_name = "TYPE")]
    pub target: Option<String>,
}

#[derive(Args, Debug)]
pub struct InvalidateArgs {
    /// Collection to drop; omitted or `all` drops everything.
    #[arg(long = "type", value_name = "TYPE")]
    pub collection: Option<String>,
    /// Single product id (only with --type products).
    #[arg(long)]
    pub id: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum ImagesCommands {
    /// Print mirror statistics.
    Stats,
    /// Delete mirrored images older than the given age.
    Cleanup {
        /// Maximum age in milliseconds; the server default applies when omitted.
        #[arg(long)]
        max_age_ms: Option<u64>,
    },
    /// Mirror images for the products in a JSON file and print the rewritten products.
    CacheProducts {
        /// A JSON array of products, or an object with a `products` array.
        file: PathBuf,
    },
}
