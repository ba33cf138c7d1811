//! vitrine-cli: operator client for the Vitrine cache management routes.

mod args;
mod client;
mod handlers;
mod print;

use clap::Parser;

use args::{Cli, Commands};
use client::{CliError, build_ctx_from_cli};
use handlers::{cache, images};

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    let ctx = build_ctx_from_cli(&cli)?;

    match cli.command {
        Commands::Init => cache::init(&ctx).await?,
        Commands::Refresh(args) => cache::refresh(&ctx, args).await?,
        Commands::Invalidate(args) => cache::invalidate(&ctx, args).await?,
        Commands::Stats => cache::stats(&ctx).await?,
        Commands::Images(cmd) => images::handle(&ctx, cmd).await?,
    }

    Ok(())
}
