//! Domain layer types and invariants.

pub mod product;
pub mod webhook;

pub use vitrine_api_types::{CollectionType, ParseCollectionError, RefreshTarget};
