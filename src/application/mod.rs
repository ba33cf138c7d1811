//! Application services: refresh, content reads, webhook ingestion, lifecycle.

pub mod content;
pub mod error;
pub mod origin;
pub mod refresh;
pub mod service;
pub mod webhooks;
