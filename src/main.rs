use std::{process, time::Duration};

use tokio::signal;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use vitrine::{
    application::{
        error::AppError,
        service::{CacheService, ServiceError},
    },
    cache::SystemClock,
    config::{self, CleanupImagesArgs},
    infra::{
        error::InfraError,
        http::{self, HttpState},
        images::{ImageMirror, ImageMirrorConfig},
        telemetry,
    },
};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, chain = ?error_chain(error), "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, chain = ?error_chain(error), "application error");
    });
}

fn error_chain(error: &dyn std::error::Error) -> Vec<String> {
    let mut chain = Vec::new();
    let mut current = error.source();
    while let Some(inner) = current {
        chain.push(inner.to_string());
        current = inner.source();
    }
    chain
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Warm(_) => run_warm(settings).await,
        config::Command::CleanupImages(args) => run_cleanup_images(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let service = CacheService::start(&settings).await?;
    let router = http::build_router(HttpState::new(service.clone()));

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(InfraError::from)?;
    info!(
        target = "vitrine::serve",
        addr = %settings.server.addr,
        "HTTP server listening"
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(InfraError::from)?;

    drain(&service, settings.server.graceful_shutdown).await;
    Ok(())
}

/// Let queued webhook work finish, bounded by the configured grace period.
async fn drain(service: &CacheService, grace: Duration) {
    if tokio::time::timeout(grace, service.shutdown()).await.is_err() {
        warn!(
            target = "vitrine::serve",
            grace_secs = grace.as_secs(),
            "Shutdown grace period elapsed with webhook work still queued"
        );
    }
}

async fn run_warm(settings: config::Settings) -> Result<(), AppError> {
    let service = CacheService::start(&settings).await?;
    let summary = service.warm().await;
    service.shutdown().await;

    for (collection, err) in &summary.failed {
        error!(
            target = "vitrine::warm",
            collection = collection.as_str(),
            error = %err,
            "Collection could not be warmed"
        );
    }
    info!(
        target = "vitrine::warm",
        succeeded = summary.succeeded.len(),
        failed = summary.failed.len(),
        elapsed_ms = summary.duration.as_millis() as u64,
        "Warm finished"
    );

    if summary.is_success() {
        Ok(())
    } else {
        Err(AppError::unexpected(format!(
            "{} collection(s) failed to refresh",
            summary.failed.len()
        )))
    }
}

async fn run_cleanup_images(
    settings: config::Settings,
    args: CleanupImagesArgs,
) -> Result<(), AppError> {
    let max_age = args
        .max_age_seconds
        .map(Duration::from_secs)
        .unwrap_or(settings.images.max_age);

    let mirror = ImageMirror::open(
        ImageMirrorConfig::from(&settings.images),
        std::sync::Arc::new(SystemClock),
    )
    .await
    .map_err(ServiceError::from)?;
    let report = mirror.cleanup(max_age).await.map_err(ServiceError::from)?;

    info!(
        target = "vitrine::cleanup_images",
        removed = report.removed,
        freed_bytes = report.freed_bytes,
        max_age_secs = max_age.as_secs(),
        "Image cleanup finished"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(target = "vitrine::serve", error = %err, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(target = "vitrine::serve", error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!(target = "vitrine::serve", "Shutdown signal received");
}
