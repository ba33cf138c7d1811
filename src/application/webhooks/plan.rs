//! Routing from a webhook event to the cache actions it requires.

use std::fmt;

use serde_json::Value;

use crate::domain::CollectionType;
use crate::domain::product::product_id;
use crate::domain::webhook::{ResourceType, WebhookAction, WebhookEvent};

const COMPLETED_ORDER: &str = "completed";

#[derive(Debug, Clone, PartialEq)]
pub enum CacheAction {
    UpsertProduct(Value),
    RemoveProduct(u64),
    Refresh(CollectionType),
}

impl fmt::Display for CacheAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheAction::UpsertProduct(product) => match product_id(product) {
                Some(id) => write!(f, "upsert product {id}"),
                None => f.write_str("upsert product"),
            },
            CacheAction::RemoveProduct(id) => write!(f, "remove product {id}"),
            CacheAction::Refresh(collection) => write!(f, "refresh {collection}"),
        }
    }
}

/// Cache actions for `event`, in execution order. Empty means nothing to do.
pub fn plan(event: &WebhookEvent) -> Vec<CacheAction> {
    match event.resource {
        ResourceType::Product => plan_product(event),
        ResourceType::Category => vec![CacheAction::Refresh(CollectionType::Categories)],
        ResourceType::Page => vec![CacheAction::Refresh(CollectionType::Pages)],
        ResourceType::Post => vec![CacheAction::Refresh(CollectionType::Posts)],
        ResourceType::Menu => vec![CacheAction::Refresh(CollectionType::Menus)],
        // Completed orders change stock levels.
        ResourceType::Order if event.status() == Some(COMPLETED_ORDER) => {
            vec![CacheAction::Refresh(CollectionType::Products)]
        }
        ResourceType::Order | ResourceType::Customer => Vec::new(),
    }
}

fn plan_product(event: &WebhookEvent) -> Vec<CacheAction> {
    match event.action {
        WebhookAction::Deleted => match event.id {
            Some(id) => vec![CacheAction::RemoveProduct(id)],
            None => vec![CacheAction::Refresh(CollectionType::Products)],
        },
        WebhookAction::Created | WebhookAction::Updated => match &event.data {
            Some(product) if product_id(product).is_some() => {
                vec![CacheAction::UpsertProduct(product.clone())]
            }
            _ => vec![CacheAction::Refresh(CollectionType::Products)],
        },
    }
}
