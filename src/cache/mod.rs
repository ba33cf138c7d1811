//! Vitrine cache core.
//!
//! A file-backed TTL cache for storefront collections:
//!
//! - **Store**: one JSON document per key, replaced atomically on disk
//! - **TTL**: in-memory view with freshness checks, hit/miss accounting and
//!   per-key write serialization
//! - **Flight**: at-most-one in-flight operation per key
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! directory = ".cache/vitrine"
//! products_ttl_minutes = 60
//! menus_ttl_minutes = 720
//! # ... see config.rs for all options
//! ```

mod clock;
mod config;
mod entry;
mod error;
mod flight;
mod lock;
mod stats;
mod store;
mod ttl;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use entry::{CacheEntry, Freshness};
pub use error::CacheError;
pub use flight::{FlightAbandoned, FlightStats, SingleFlight};
pub use stats::CacheStats;
pub use store::PersistentStore;
pub use ttl::{TtlCache, UpdateOutcome};

pub(crate) use lock::{mutex_lock, rw_read, rw_write};
pub(crate) use stats::{METRIC_CACHE_HIT, METRIC_CACHE_MISS};
pub(crate) use store::write_atomic;
