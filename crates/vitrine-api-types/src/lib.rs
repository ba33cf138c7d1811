//! Shared request and response types for the Vitrine cache API.
//!
//! The server serializes these and `vitrine-cli` deserializes them, so the
//! wire shape lives in exactly one place.

mod collection;
mod models;

pub use collection::{CollectionType, ParseCollectionError, RefreshTarget};
pub use models::*;
