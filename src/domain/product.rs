//! Accessors over WooCommerce product documents.
//!
//! Products stay as `serde_json::Value` so fields added upstream pass through
//! untouched; these helpers read the few fields the cache depends on.

use serde_json::Value;

/// Cache key for a single product.
pub fn product_key(id: u64) -> String {
    format!("product-{id}")
}

/// The product id, accepting both numbers and numeric strings.
pub fn product_id(product: &Value) -> Option<u64> {
    match product.get("id")? {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// `images[].src` values in document order.
pub fn image_sources(product: &Value) -> Vec<&str> {
    product
        .get("images")
        .and_then(Value::as_array)
        .map(|images| {
            images
                .iter()
                .filter_map(|image| image.get("src").and_then(Value::as_str))
                .filter(|src| !src.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Position of the product with `id` in a cached list.
pub fn position_in(list: &[Value], id: u64) -> Option<usize> {
    list.iter().position(|item| product_id(item) == Some(id))
}
