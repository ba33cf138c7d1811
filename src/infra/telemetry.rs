use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::refresh::{METRIC_REFRESH_MS, METRIC_REFRESH_TOTAL};
use crate::application::webhooks::{
    METRIC_WEBHOOK_JOB, METRIC_WEBHOOK_QUEUE_LEN, METRIC_WEBHOOK_RECEIVED,
};
use crate::cache::{METRIC_CACHE_HIT, METRIC_CACHE_MISS};
use crate::config::{LogFormat, LoggingSettings};
use crate::infra::images::{METRIC_IMAGE_DOWNLOAD, METRIC_IMAGE_HIT};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_CACHE_HIT,
            Unit::Count,
            "Total number of fresh cache reads."
        );
        describe_counter!(
            METRIC_CACHE_MISS,
            Unit::Count,
            "Total number of cache reads that found nothing fresh."
        );
        describe_histogram!(
            METRIC_REFRESH_MS,
            Unit::Milliseconds,
            "Collection refresh latency in milliseconds."
        );
        describe_counter!(
            METRIC_REFRESH_TOTAL,
            Unit::Count,
            "Collection refreshes by result."
        );
        describe_counter!(
            METRIC_IMAGE_DOWNLOAD,
            Unit::Count,
            "Image downloads by result."
        );
        describe_counter!(
            METRIC_IMAGE_HIT,
            Unit::Count,
            "Image mirror requests served without a download."
        );
        describe_counter!(
            METRIC_WEBHOOK_RECEIVED,
            Unit::Count,
            "Webhook deliveries by source and result."
        );
        describe_counter!(
            METRIC_WEBHOOK_JOB,
            Unit::Count,
            "Completed webhook jobs by source and result."
        );
        describe_gauge!(
            METRIC_WEBHOOK_QUEUE_LEN,
            Unit::Count,
            "Webhook jobs queued or running."
        );
    });
}
