//! Background execution of webhook cache actions.
//!
//! Handlers enqueue a job and acknowledge immediately; a single worker drains
//! the queue in order and retries failed actions with linear backoff.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use metrics::{counter, gauge};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::refresh::{RefreshError, RefreshOrchestrator};
use crate::cache::mutex_lock;
use crate::config::WebhookSettings;
use crate::domain::webhook::WebhookEvent;

use super::plan::{CacheAction, plan};

pub(crate) const METRIC_WEBHOOK_JOB: &str = "vitrine_webhook_job_total";
pub(crate) const METRIC_WEBHOOK_QUEUE_LEN: &str = "vitrine_webhook_queue_len";

const SOURCE: &str = "application::webhooks::dispatch";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookSource {
    WooCommerce,
    WordPress,
}

impl WebhookSource {
    pub fn as_str(self) -> &'static str {
        match self {
            WebhookSource::WooCommerce => "woocommerce",
            WebhookSource::WordPress => "wordpress",
        }
    }
}

impl fmt::Display for WebhookSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub queue_capacity: usize,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            max_attempts: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

impl From<&WebhookSettings> for DispatcherConfig {
    fn from(settings: &WebhookSettings) -> Self {
        Self {
            queue_capacity: settings.queue_capacity.get() as usize,
            max_attempts: settings.max_attempts.get(),
            retry_backoff: settings.retry_backoff,
        }
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("webhook queue is full")]
    QueueFull,
    #[error("webhook dispatcher has shut down")]
    Closed,
}

#[derive(Debug)]
struct WebhookJob {
    id: Uuid,
    source: WebhookSource,
    event: WebhookEvent,
    actions: Vec<CacheAction>,
}

#[derive(Debug)]
pub struct WebhookDispatcher {
    sender: Mutex<Option<mpsc::Sender<WebhookJob>>>,
    pending: Arc<watch::Sender<usize>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl WebhookDispatcher {
    /// Start the worker. Must be called inside a Tokio runtime.
    pub fn spawn(orchestrator: Arc<RefreshOrchestrator>, config: DispatcherConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let (pending, _) = watch::channel(0usize);
        let pending = Arc::new(pending);

        let worker = tokio::spawn(run_worker(
            receiver,
            orchestrator,
            config,
            Arc::clone(&pending),
        ));

        Self {
            sender: Mutex::new(Some(sender)),
            pending,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queue the actions `event` requires. `Ok(None)` when there is nothing to do.
    pub fn enqueue(
        &self,
        source: WebhookSource,
        event: WebhookEvent,
    ) -> Result<Option<Uuid>, DispatchError> {
        let actions = plan(&event);
        if actions.is_empty() {
            info!(
                target = "vitrine::application::webhooks",
                op = "enqueue",
                source = source.as_str(),
                resource = event.resource.as_str(),
                action = event.action.as_str(),
                "Webhook requires no cache action"
            );
            return Ok(None);
        }

        let sender = mutex_lock(&self.sender, SOURCE, "enqueue")
            .clone()
            .ok_or(DispatchError::Closed)?;

        let job = WebhookJob {
            id: Uuid::new_v4(),
            source,
            event,
            actions,
        };
        let job_id = job.id;

        self.pending.send_modify(|count| *count += 1);
        if let Err(err) = sender.try_send(job) {
            self.pending
                .send_modify(|count| *count = count.saturating_sub(1));
            return Err(match err {
                mpsc::error::TrySendError::Full(_) => DispatchError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => DispatchError::Closed,
            });
        }
        gauge!(METRIC_WEBHOOK_QUEUE_LEN).set(*self.pending.borrow() as f64);
        Ok(Some(job_id))
    }

    /// Jobs queued or running.
    pub fn pending(&self) -> usize {
        *self.pending.borrow()
    }

    /// Resolves once every queued job has finished.
    pub async fn wait_idle(&self) {
        let mut receiver = self.pending.subscribe();
        let _ = receiver.wait_for(|count| *count == 0).await;
    }

    /// Stop accepting jobs and wait for the queue to drain.
    pub async fn shutdown(&self) {
        let sender = mutex_lock(&self.sender, SOURCE, "shutdown").take();
        drop(sender);

        let worker = mutex_lock(&self.worker, SOURCE, "shutdown").take();
        if let Some(worker) = worker
            && let Err(err) = worker.await
        {
            error!(
                target = "vitrine::application::webhooks",
                op = "shutdown",
                error = %err,
                "Webhook worker terminated abnormally"
            );
        }
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<WebhookJob>,
    orchestrator: Arc<RefreshOrchestrator>,
    config: DispatcherConfig,
    pending: Arc<watch::Sender<usize>>,
) {
    while let Some(job) = receiver.recv().await {
        execute(&orchestrator, &config, &job).await;
        pending.send_modify(|count| *count = count.saturating_sub(1));
        gauge!(METRIC_WEBHOOK_QUEUE_LEN).set(*pending.borrow() as f64);
    }
    info!(
        target = "vitrine::application::webhooks",
        op = "worker",
        "Webhook worker stopped"
    );
}

async fn execute(orchestrator: &RefreshOrchestrator, config: &DispatcherConfig, job: &WebhookJob) {
    let started_at = Instant::now();
    let mut failed = 0usize;

    for action in &job.actions {
        if let Err(err) = apply_with_retry(orchestrator, config, job, action).await {
            failed += 1;
            error!(
                target = "vitrine::application::webhooks",
                op = "execute",
                job_id = %job.id,
                source = job.source.as_str(),
                action = %action,
                attempts = config.max_attempts,
                error = %err,
                "Webhook action failed after retries"
            );
        }
    }

    let result = if failed == 0 { "ok" } else { "failed" };
    counter!(
        METRIC_WEBHOOK_JOB,
        "source" => job.source.as_str(),
        "result" => result
    )
    .increment(1);
    info!(
        target = "vitrine::application::webhooks",
        op = "execute",
        job_id = %job.id,
        source = job.source.as_str(),
        resource = job.event.resource.as_str(),
        event_action = job.event.action.as_str(),
        actions = job.actions.len(),
        failed,
        elapsed_ms = started_at.elapsed().as_millis() as u64,
        "Webhook job finished"
    );
}

async fn apply_with_retry(
    orchestrator: &RefreshOrchestrator,
    config: &DispatcherConfig,
    job: &WebhookJob,
    action: &CacheAction,
) -> Result<(), RefreshError> {
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match apply(orchestrator, action).await {
            Ok(()) => return Ok(()),
            Err(err) if attempt < max_attempts => {
                warn!(
                    target = "vitrine::application::webhooks",
                    op = "apply",
                    job_id = %job.id,
                    action = %action,
                    attempt,
                    error = %err,
                    "Webhook action failed; retrying"
                );
                tokio::time::sleep(config.retry_backoff * attempt).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

async fn apply(orchestrator: &RefreshOrchestrator, action: &CacheAction) -> Result<(), RefreshError> {
    match action {
        CacheAction::UpsertProduct(product) => {
            orchestrator.upsert_product(product.clone()).await?;
        }
        CacheAction::RemoveProduct(id) => {
            orchestrator.remove_product(*id).await?;
        }
        CacheAction::Refresh(collection) => {
            orchestrator.refresh_partial(*collection).await?;
        }
    }
    Ok(())
}
