//! Lenient parsing of webhook deliveries into [`WebhookEvent`]s.
//!
//! Deliveries are never rejected for being malformed: whatever the body lacks
//! is taken from the headers, and a delivery with nothing usable is ignored.

use serde_json::Value;

use crate::domain::product::product_id;
use crate::domain::webhook::{ResourceType, WebhookAction, WebhookEvent};

/// `x-wc-webhook-*` metadata that accompanies every WooCommerce delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WooCommerceHeaders {
    /// `<resource>.<event>`, e.g. `product.updated`.
    pub topic: Option<String>,
    pub resource: Option<String>,
    pub event: Option<String>,
    pub resource_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Event(WebhookEvent),
    /// Acknowledged without any cache action.
    Ignored { reason: String },
}

impl ParseOutcome {
    fn ignored(reason: impl Into<String>) -> Self {
        Self::Ignored {
            reason: reason.into(),
        }
    }
}

pub fn parse_woocommerce(headers: &WooCommerceHeaders, body: &[u8]) -> ParseOutcome {
    let document = json_object(body);

    let (topic_resource, topic_event) = headers
        .topic
        .as_deref()
        .and_then(|topic| topic.split_once('.'))
        .map_or((None, None), |(resource, event)| (Some(resource), Some(event)));

    // A body shaped like the generic `{action, type}` payload stands in for missing headers.
    let body_resource = document
        .as_ref()
        .and_then(|doc| doc.get("type"))
        .and_then(Value::as_str);
    let body_action = document
        .as_ref()
        .and_then(|doc| doc.get("action"))
        .and_then(Value::as_str);
    let generic = body_action.is_some() && body_resource.is_some();
    let body_id = document.as_ref().and_then(product_id);

    let resource = non_blank(headers.resource.as_deref())
        .or(topic_resource)
        .or(body_resource);
    let event = non_blank(headers.event.as_deref())
        .or(topic_event)
        .or(body_action);

    let Some(resource) = resource else {
        return ParseOutcome::ignored("no resource in headers or body");
    };
    let Ok(resource) = resource.parse::<ResourceType>() else {
        return ParseOutcome::ignored(format!("unsupported resource `{resource}`"));
    };
    let Some(event) = event else {
        return ParseOutcome::ignored("no event in headers or body");
    };
    let Ok(action) = event.parse::<WebhookAction>() else {
        return ParseOutcome::ignored(format!("unsupported event `{event}`"));
    };

    // Generic payloads nest the resource under `data`; WooCommerce sends it as the body.
    let data = match document {
        Some(doc) if generic => {
            doc.get("data").filter(|data| data.is_object()).cloned()
        }
        Some(doc) => Some(doc),
        None => None,
    };

    let id = data
        .as_ref()
        .and_then(product_id)
        .or(body_id)
        .or_else(|| {
            non_blank(headers.resource_id.as_deref()).and_then(|raw| raw.parse().ok())
        });

    ParseOutcome::Event(WebhookEvent {
        action,
        resource,
        id,
        data,
    })
}

/// `{action, type, id, data}` as posted by the WordPress plugin.
pub fn parse_wordpress(body: &[u8]) -> ParseOutcome {
    let Some(document) = json_object(body) else {
        return ParseOutcome::ignored("body is not a JSON object");
    };

    let Some(action) = document.get("action").and_then(Value::as_str) else {
        return ParseOutcome::ignored("missing `action`");
    };
    let Ok(action) = action.parse::<WebhookAction>() else {
        return ParseOutcome::ignored(format!("unsupported action `{action}`"));
    };
    let Some(resource) = document.get("type").and_then(Value::as_str) else {
        return ParseOutcome::ignored("missing `type`");
    };
    let Ok(resource) = resource.parse::<ResourceType>() else {
        return ParseOutcome::ignored(format!("unsupported type `{resource}`"));
    };

    let data = document
        .get("data")
        .filter(|data| data.is_object())
        .cloned();
    let id = product_id(&document).or_else(|| data.as_ref().and_then(product_id));

    ParseOutcome::Event(WebhookEvent {
        action,
        resource,
        id,
        data,
    })
}

fn json_object(body: &[u8]) -> Option<Value> {
    serde_json::from_slice::<Value>(body)
        .ok()
        .filter(Value::is_object)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
