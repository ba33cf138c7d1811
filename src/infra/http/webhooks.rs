//! Webhook endpoints. Both acknowledge as soon as the work is queued.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, HeaderName},
};
use bytes::Bytes;

use vitrine_api_types::WebhookAck;

use crate::application::webhooks::{IngestOutcome, WooCommerceHeaders};

use super::{ApiError, HttpState};

const WC_SIGNATURE: HeaderName = HeaderName::from_static("x-wc-webhook-signature");
const WC_TOPIC: HeaderName = HeaderName::from_static("x-wc-webhook-topic");
const WC_RESOURCE: HeaderName = HeaderName::from_static("x-wc-webhook-resource");
const WC_EVENT: HeaderName = HeaderName::from_static("x-wc-webhook-event");
const WC_RESOURCE_ID: HeaderName = HeaderName::from_static("x-wc-webhook-resource-id");
const WP_SIGNATURE: HeaderName = HeaderName::from_static("x-wp-webhook-signature");

pub(super) async fn woocommerce(
    State(state): State<HttpState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let metadata = WooCommerceHeaders {
        topic: header(&headers, &WC_TOPIC),
        resource: header(&headers, &WC_RESOURCE),
        event: header(&headers, &WC_EVENT),
        resource_id: header(&headers, &WC_RESOURCE_ID),
    };
    let signature = header(&headers, &WC_SIGNATURE);

    let outcome = state.service.webhooks().receive_woocommerce(
        &metadata,
        signature.as_deref(),
        &body,
    )?;
    Ok(Json(acknowledge(outcome)))
}

pub(super) async fn wordpress(
    State(state): State<HttpState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let signature = header(&headers, &WP_SIGNATURE);
    let outcome = state
        .service
        .webhooks()
        .receive_wordpress(signature.as_deref(), &body)?;
    Ok(Json(acknowledge(outcome)))
}

fn header(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn acknowledge(outcome: IngestOutcome) -> WebhookAck {
    match outcome {
        IngestOutcome::Queued { job_id } => WebhookAck {
            success: true,
            message: "webhook queued".to_string(),
            job_id: Some(job_id),
        },
        IngestOutcome::NoAction => WebhookAck {
            success: true,
            message: "no cache action required".to_string(),
            job_id: None,
        },
        IngestOutcome::Ignored { reason } => WebhookAck {
            success: true,
            message: format!("webhook ignored: {reason}"),
            job_id: None,
        },
    }
}
