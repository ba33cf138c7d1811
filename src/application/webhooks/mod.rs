//! Webhook ingestion: signature checks, lenient parsing, queued dispatch.

mod dispatch;
mod parse;
mod plan;
pub mod signature;

use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

pub use dispatch::{DispatchError, DispatcherConfig, WebhookDispatcher, WebhookSource};
pub use parse::{ParseOutcome, WooCommerceHeaders, parse_woocommerce, parse_wordpress};
pub use plan::{CacheAction, plan};

pub(crate) use dispatch::{METRIC_WEBHOOK_JOB, METRIC_WEBHOOK_QUEUE_LEN};

pub(crate) const METRIC_WEBHOOK_RECEIVED: &str = "vitrine_webhook_received_total";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IngestError {
    #[error("signature header is missing")]
    MissingSignature,
    #[error("signature does not match the request body")]
    InvalidSignature,
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Queued { job_id: Uuid },
    /// Understood, but no cache action is required.
    NoAction,
    /// Nothing usable in the delivery.
    Ignored { reason: String },
}

impl IngestOutcome {
    fn label(&self) -> &'static str {
        match self {
            IngestOutcome::Queued { .. } => "queued",
            IngestOutcome::NoAction => "no_action",
            IngestOutcome::Ignored { .. } => "ignored",
        }
    }
}

/// Entry point for both webhook endpoints.
#[derive(Debug)]
pub struct WebhookIngress {
    woocommerce_secret: Option<String>,
    wordpress_secret: Option<String>,
    dispatcher: Arc<WebhookDispatcher>,
}

impl WebhookIngress {
    pub fn new(
        woocommerce_secret: Option<String>,
        wordpress_secret: Option<String>,
        dispatcher: Arc<WebhookDispatcher>,
    ) -> Self {
        if woocommerce_secret.is_none() {
            warn!(
                target = "vitrine::application::webhooks",
                op = "new",
                "No WooCommerce webhook secret configured; signatures will not be verified"
            );
        }
        Self {
            woocommerce_secret,
            wordpress_secret,
            dispatcher,
        }
    }

    pub fn dispatcher(&self) -> &Arc<WebhookDispatcher> {
        &self.dispatcher
    }

    pub fn receive_woocommerce(
        &self,
        headers: &WooCommerceHeaders,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<IngestOutcome, IngestError> {
        let source = WebhookSource::WooCommerce;
        self.check_signature(source, self.woocommerce_secret.as_deref(), signature, body)?;
        self.record(source, parse_woocommerce(headers, body))
    }

    pub fn receive_wordpress(
        &self,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<IngestOutcome, IngestError> {
        let source = WebhookSource::WordPress;
        self.check_signature(source, self.wordpress_secret.as_deref(), signature, body)?;
        self.record(source, parse_wordpress(body))
    }

    fn check_signature(
        &self,
        source: WebhookSource,
        secret: Option<&str>,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<(), IngestError> {
        let Some(secret) = secret else {
            if source == WebhookSource::WooCommerce {
                warn!(
                    target = "vitrine::application::webhooks",
                    op = "verify",
                    source = source.as_str(),
                    "Accepting unsigned webhook; no secret configured"
                );
            }
            return Ok(());
        };

        let result = match signature {
            None => Err(IngestError::MissingSignature),
            Some(signature) if signature::verify(secret, body, signature) => Ok(()),
            Some(_) => Err(IngestError::InvalidSignature),
        };
        if result.is_err() {
            counter!(
                METRIC_WEBHOOK_RECEIVED,
                "source" => source.as_str(),
                "result" => "rejected"
            )
            .increment(1);
        }
        result
    }

    fn record(
        &self,
        source: WebhookSource,
        parsed: ParseOutcome,
    ) -> Result<IngestOutcome, IngestError> {
        let outcome = match parsed {
            ParseOutcome::Ignored { reason } => {
                info!(
                    target = "vitrine::application::webhooks",
                    op = "receive",
                    source = source.as_str(),
                    reason = %reason,
                    "Webhook ignored"
                );
                IngestOutcome::Ignored { reason }
            }
            ParseOutcome::Event(event) => match self.dispatcher.enqueue(source, event)? {
                Some(job_id) => IngestOutcome::Queued { job_id },
                None => IngestOutcome::NoAction,
            },
        };
        counter!(
            METRIC_WEBHOOK_RECEIVED,
            "source" => source.as_str(),
            "result" => outcome.label()
        )
        .increment(1);
        Ok(outcome)
    }
}
