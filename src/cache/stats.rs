use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::counter;
use time::OffsetDateTime;

use vitrine_api_types::CacheStatsView;

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::stats";
pub(crate) const METRIC_CACHE_HIT: &str = "vitrine_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "vitrine_cache_miss_total";

/// Process-lifetime request counters. Never persisted.
#[derive(Debug, Default)]
pub struct CacheStats {
    total_requests: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    last_refresh: RwLock<Option<OffsetDateTime>>,
}

impl CacheStats {
    pub(crate) fn record_hit(&self, key: &str) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_CACHE_HIT, "key" => metric_label(key)).increment(1);
    }

    pub(crate) fn record_miss(&self, key: &str) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_CACHE_MISS, "key" => metric_label(key)).increment(1);
    }

    pub(crate) fn record_refresh(&self, at: OffsetDateTime) {
        *rw_write(&self.last_refresh, SOURCE, "record_refresh") = Some(at);
    }

    pub fn last_refresh(&self) -> Option<OffsetDateTime> {
        *rw_read(&self.last_refresh, SOURCE, "last_refresh")
    }

    pub fn snapshot(&self, memory_usage: u64, entries: usize) -> CacheStatsView {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let hit_rate = if total_requests == 0 {
            0.0
        } else {
            cache_hits as f64 / total_requests as f64
        };

        CacheStatsView {
            total_requests,
            cache_hits,
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            hit_rate,
            last_refresh: self.last_refresh(),
            memory_usage,
            entries,
        }
    }
}

/// Collapse single-resource keys so metric cardinality stays bounded.
fn metric_label(key: &str) -> &'static str {
    match key {
        "products" => "products",
        "categories" => "categories",
        "pages" => "pages",
        "posts" => "posts",
        "menus" => "menus",
        "site-info" => "site-info",
        _ if key.starts_with("product-") => "product",
        _ => "other",
    }
}
