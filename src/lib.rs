//! Vitrine: a file-backed cache between a headless storefront and its
//! WordPress/WooCommerce origin.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
