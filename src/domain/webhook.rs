//! Normalized webhook events from WooCommerce and WordPress.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookAction {
    Created,
    Updated,
    Deleted,
}

impl WebhookAction {
    pub fn as_str(self) -> &'static str {
        match self {
            WebhookAction::Created => "created",
            WebhookAction::Updated => "updated",
            WebhookAction::Deleted => "deleted",
        }
    }
}

impl FromStr for WebhookAction {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "created" | "create" => Ok(WebhookAction::Created),
            "updated" | "update" | "restored" => Ok(WebhookAction::Updated),
            "deleted" | "delete" | "trashed" => Ok(WebhookAction::Deleted),
            _ => Err(()),
        }
    }
}

impl fmt::Display for WebhookAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Product,
    Category,
    Page,
    Post,
    Menu,
    Customer,
    Order,
}

impl ResourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::Product => "product",
            ResourceType::Category => "category",
            ResourceType::Page => "page",
            ResourceType::Post => "post",
            ResourceType::Menu => "menu",
            ResourceType::Customer => "customer",
            ResourceType::Order => "order",
        }
    }
}

impl FromStr for ResourceType {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "product" | "products" => Ok(ResourceType::Product),
            "category" | "categories" | "product_cat" | "product_category" => {
                Ok(ResourceType::Category)
            }
            "page" | "pages" => Ok(ResourceType::Page),
            "post" | "posts" => Ok(ResourceType::Post),
            "menu" | "menus" | "nav_menu" | "nav_menu_item" => Ok(ResourceType::Menu),
            "customer" | "customers" => Ok(ResourceType::Customer),
            "order" | "orders" => Ok(ResourceType::Order),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A webhook after signature checks and parsing, independent of its source.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub action: WebhookAction,
    pub resource: ResourceType,
    pub id: Option<u64>,
    /// Resource document, when the body carried one.
    pub data: Option<Value>,
}

impl WebhookEvent {
    /// `status` field of the attached document, e.g. an order's `completed`.
    pub fn status(&self) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|data| data.get("status"))
            .and_then(Value::as_str)
    }
}
