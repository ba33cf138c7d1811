//! In-process view over the persistent store with TTL-based freshness.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use vitrine_api_types::CacheStatsView;

use super::clock::Clock;
use super::config::CacheConfig;
use super::entry::{CacheEntry, Freshness};
use super::error::CacheError;
use super::lock::{rw_read, rw_write};
use super::stats::CacheStats;
use super::store::PersistentStore;

const SOURCE: &str = "cache::ttl";

#[derive(Debug, Clone)]
struct Slot {
    entry: Arc<CacheEntry>,
    size: u64,
}

/// Result of [`TtlCache::update`].
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// Nothing cached under the key; the closure was not called.
    Missing,
    /// The closure reported no change; nothing was written.
    Unchanged,
    Updated(Arc<CacheEntry>),
}

/// TTL cache over a [`PersistentStore`].
///
/// Entries are replaced whole: readers hold an `Arc` to the entry they saw and
/// never observe a partially written one. Writers for the same key are
/// serialized through a per-key async mutex.
#[derive(Debug)]
pub struct TtlCache {
    config: CacheConfig,
    store: PersistentStore,
    clock: Arc<dyn Clock>,
    memory: RwLock<HashMap<String, Slot>>,
    write_locks: DashMap<String, Arc<Mutex<()>>>,
    stats: CacheStats,
}

impl TtlCache {
    pub fn new(config: CacheConfig, clock: Arc<dyn Clock>) -> Result<Self, CacheError> {
        let store = PersistentStore::new(config.directory.clone())
            .map_err(|err| CacheError::io(config.directory.display().to_string(), err))?;
        Ok(Self {
            config,
            store,
            clock,
            memory: RwLock::new(HashMap::new()),
            write_locks: DashMap::new(),
            stats: CacheStats::default(),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    /// Fresh entry for `key`, counting a hit or a miss.
    pub async fn get(&self, key: &str) -> Option<Arc<CacheEntry>> {
        let now = self.clock.now();

        if let Some(entry) = self.memory_entry(key)
            && entry.is_fresh(now)
        {
            self.stats.record_hit(key);
            return Some(entry);
        }

        match self.load_from_store(key).await {
            Some(entry) if entry.is_fresh(now) => {
                self.stats.record_hit(key);
                Some(entry)
            }
            _ => {
                self.stats.record_miss(key);
                None
            }
        }
    }

    /// Entry for `key` regardless of freshness. Does not touch the counters.
    pub async fn peek(&self, key: &str) -> Option<Arc<CacheEntry>> {
        match self.memory_entry(key) {
            Some(entry) => Some(entry),
            None => self.load_from_store(key).await,
        }
    }

    pub async fn freshness(&self, key: &str) -> Freshness {
        match self.peek(key).await {
            Some(entry) => entry.freshness(self.clock.now()),
            None => Freshness::Missing,
        }
    }

    /// Replace the entry for `key` with `data`, stamped now.
    ///
    /// `expiry_minutes` overrides the TTL configured for the key.
    pub async fn set(
        &self,
        key: &str,
        data: Value,
        expiry_minutes: Option<u32>,
    ) -> Result<Arc<CacheEntry>, CacheError> {
        let _guard = self.lock_key(key).await;
        let expiry = expiry_minutes.unwrap_or_else(|| self.config.ttl_for_key(key));
        let entry = CacheEntry::new(key, data, self.clock.now(), expiry);
        self.persist_and_install(entry).await
    }

    /// Read-modify-write of an existing entry, keeping `lastUpdated` and `expiry`.
    ///
    /// `apply` returns whether it changed the payload; unchanged payloads are not rewritten.
    pub async fn update<F>(&self, key: &str, apply: F) -> Result<UpdateOutcome, CacheError>
    where
        F: FnOnce(&mut Value) -> bool,
    {
        let _guard = self.lock_key(key).await;
        let Some(current) = self.peek(key).await else {
            return Ok(UpdateOutcome::Missing);
        };

        let mut next = CacheEntry::clone(&current);
        if !apply(&mut next.data) {
            return Ok(UpdateOutcome::Unchanged);
        }

        let entry = self.persist_and_install(next).await?;
        Ok(UpdateOutcome::Updated(entry))
    }

    /// Drop `key` from memory and disk. Returns whether anything was removed.
    pub async fn invalidate(&self, key: &str) -> Result<bool, CacheError> {
        let guard = self.lock_key(key).await;
        let in_memory = rw_write(&self.memory, SOURCE, "invalidate")
            .remove(key)
            .is_some();
        let removed = self.store.remove(key).await;
        drop(guard);
        self.release_key(key);
        let on_disk = removed?;
        debug!(
            target = "vitrine::cache::ttl",
            op = "invalidate",
            key,
            in_memory,
            on_disk,
            "Cache entry invalidated"
        );
        Ok(in_memory || on_disk)
    }

    /// Invalidate every key known in memory or on disk. Returns the number removed.
    pub async fn clear(&self) -> Result<usize, CacheError> {
        let mut keys: BTreeSet<String> = rw_read(&self.memory, SOURCE, "clear")
            .keys()
            .cloned()
            .collect();
        keys.extend(self.store.keys().await?);

        let mut removed = 0;
        for key in keys {
            if self.invalidate(&key).await? {
                removed += 1;
            }
        }
        info!(
            target = "vitrine::cache::ttl",
            op = "clear",
            removed,
            "Cache cleared"
        );
        Ok(removed)
    }

    /// Hydrate memory from every persisted entry. Corrupt files are skipped.
    pub async fn load_persisted(&self) -> Result<usize, CacheError> {
        let mut loaded = 0;
        for key in self.store.keys().await? {
            if self.load_from_store(&key).await.is_some() {
                loaded += 1;
            }
        }
        info!(
            target = "vitrine::cache::ttl",
            op = "load_persisted",
            loaded,
            directory = %self.store.root().display(),
            "Loaded persisted cache entries"
        );
        Ok(loaded)
    }

    /// Keys currently held in memory, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = rw_read(&self.memory, SOURCE, "keys")
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub fn record_refresh(&self) {
        self.stats.record_refresh(self.clock.now());
    }

    pub fn stats(&self) -> CacheStatsView {
        let memory = rw_read(&self.memory, SOURCE, "stats");
        let memory_usage = memory.values().map(|slot| slot.size).sum();
        self.stats.snapshot(memory_usage, memory.len())
    }

    fn memory_entry(&self, key: &str) -> Option<Arc<CacheEntry>> {
        rw_read(&self.memory, SOURCE, "memory_entry")
            .get(key)
            .map(|slot| Arc::clone(&slot.entry))
    }

    fn install(&self, entry: Arc<CacheEntry>, size: u64) {
        rw_write(&self.memory, SOURCE, "install").insert(entry.key.clone(), Slot { entry, size });
    }

    async fn persist_and_install(&self, entry: CacheEntry) -> Result<Arc<CacheEntry>, CacheError> {
        let size = self.store.write(&entry).await?;
        let entry = Arc::new(entry);
        self.install(Arc::clone(&entry), size);
        Ok(entry)
    }

    async fn load_from_store(&self, key: &str) -> Option<Arc<CacheEntry>> {
        match self.store.read_sized(key).await {
            Ok(Some((entry, size))) => {
                let entry = Arc::new(entry);
                self.install(Arc::clone(&entry), size);
                Some(entry)
            }
            Ok(None) => None,
            Err(err) => {
                warn!(
                    target = "vitrine::cache::ttl",
                    op = "load_from_store",
                    key,
                    error = %err,
                    "Unreadable cache entry treated as a miss"
                );
                None
            }
        }
    }

    async fn lock_key(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .write_locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Forget the lock for `key` unless another caller still holds or awaits it.
    fn release_key(&self, key: &str) {
        self.write_locks.remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;
    use time::Duration;
    use time::macros::datetime;

    use super::*;
    use crate::cache::clock::ManualClock;

    fn cache() -> (TempDir, Arc<ManualClock>, TtlCache) {
        let dir = TempDir::new().expect("temp dir");
        let clock = Arc::new(ManualClock::new(datetime!(2026-04-01 09:00 UTC)));
        let cache = TtlCache::new(
            CacheConfig::with_directory(dir.path().join("cache")),
            clock.clone(),
        )
        .expect("cache");
        (dir, clock, cache)
    }

    #[tokio::test]
    async fn ttl_boundary_hits_before_and_misses_after() {
        let (_dir, clock, cache) = cache();
        cache
            .set("products", json!([{"id": 1}]), Some(60))
            .await
            .expect("set");

        clock.advance(Duration::minutes(59));
        assert!(cache.get("products").await.is_some());

        clock.advance(Duration::minutes(2));
        assert!(cache.get("products").await.is_none());

        let stats = cache.stats();
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 1);
    }

    #[tokio::test]
    async fn default_expiry_comes_from_collection_type() {
        let (_dir, _clock, cache) = cache();
        let entry = cache.set("menus", json!([]), None).await.expect("set");
        assert_eq!(entry.expiry, 720);
        let entry = cache.set("product-5", json!({}), None).await.expect("set");
        assert_eq!(entry.expiry, 60);
    }

    #[tokio::test]
    async fn fresh_persisted_entry_survives_restart() {
        let dir = TempDir::new().expect("temp dir");
        let clock = Arc::new(ManualClock::new(datetime!(2026-04-01 09:00 UTC)));
        let config = CacheConfig::with_directory(dir.path().join("cache"));

        let first = TtlCache::new(config.clone(), clock.clone()).expect("cache");
        first
            .set("categories", json!([{"id": 3}]), None)
            .await
            .expect("set");
        drop(first);

        let second = TtlCache::new(config, clock.clone()).expect("cache");
        assert!(second.keys().is_empty());
        assert_eq!(second.load_persisted().await.expect("load"), 1);

        let entry = second.get("categories").await.expect("fresh entry");
        assert_eq!(entry.data, json!([{"id": 3}]));
    }

    #[tokio::test]
    async fn stale_entry_is_still_peekable() {
        let (_dir, clock, cache) = cache();
        cache.set("posts", json!(["a"]), None).await.expect("set");
        clock.advance(Duration::minutes(61));

        assert_eq!(cache.freshness("posts").await, Freshness::Stale);
        assert!(cache.get("posts").await.is_none());
        assert_eq!(
            cache.peek("posts").await.map(|entry| entry.data.clone()),
            Some(json!(["a"]))
        );
        assert_eq!(cache.freshness("pages").await, Freshness::Missing);
    }

    #[tokio::test]
    async fn update_keeps_metadata() {
        let (_dir, clock, cache) = cache();
        let original = cache.set("products", json!([1, 2]), None).await.expect("set");
        clock.advance(Duration::minutes(10));

        let outcome = cache
            .update("products", |data| {
                if let Some(items) = data.as_array_mut() {
                    items.push(json!(3));
                }
                true
            })
            .await
            .expect("update");

        let UpdateOutcome::Updated(entry) = outcome else {
            panic!("expected update, got {outcome:?}");
        };
        assert_eq!(entry.data, json!([1, 2, 3]));
        assert_eq!(entry.last_updated, original.last_updated);
        assert_eq!(entry.expiry, original.expiry);
    }

    #[tokio::test]
    async fn update_of_missing_key_does_not_fabricate() {
        let (_dir, _clock, cache) = cache();
        let outcome = cache
            .update("products", |_| panic!("closure must not run"))
            .await
            .expect("update");
        assert_eq!(outcome, UpdateOutcome::Missing);
        assert_eq!(cache.freshness("products").await, Freshness::Missing);
    }

    #[tokio::test]
    async fn invalidate_removes_file_and_is_idempotent() {
        let (dir, _clock, cache) = cache();
        cache.set("pages", json!([]), None).await.expect("set");
        let file = dir.path().join("cache").join("pages.json");
        assert!(file.exists());

        assert!(cache.invalidate("pages").await.expect("invalidate"));
        assert!(!file.exists());
        assert!(!cache.invalidate("pages").await.expect("invalidate"));
    }

    #[tokio::test]
    async fn invalidated_keys_release_their_write_locks() {
        let (_dir, _clock, cache) = cache();
        for id in 1..=3 {
            cache
                .set(&format!("product-{id}"), json!({"id": id}), None)
                .await
                .expect("set");
        }
        assert_eq!(cache.write_locks.len(), 3);

        cache.invalidate("product-1").await.expect("invalidate");
        assert!(!cache.write_locks.contains_key("product-1"));
        assert!(cache.write_locks.contains_key("product-2"));

        cache.clear().await.expect("clear");
        assert!(cache.write_locks.is_empty());
    }

    #[tokio::test]
    async fn clear_removes_memory_and_disk_only_keys() {
        let (dir, _clock, cache) = cache();
        cache.set("pages", json!([]), None).await.expect("set");
        let orphan = CacheEntry::new("menus", json!([]), cache.now(), 720);
        std::fs::write(
            dir.path().join("cache").join("menus.json"),
            serde_json::to_vec(&orphan).expect("serialize"),
        )
        .expect("seed");

        assert_eq!(cache.clear().await.expect("clear"), 2);
        assert!(cache.keys().is_empty());
        assert_eq!(cache.stats().memory_usage, 0);
    }

    #[tokio::test]
    async fn corrupt_file_counts_as_miss() {
        let (dir, _clock, cache) = cache();
        std::fs::write(dir.path().join("cache").join("products.json"), b"[[[").expect("seed");

        assert!(cache.get("products").await.is_none());
        assert_eq!(cache.load_persisted().await.expect("load"), 0);
        assert_eq!(cache.stats().cache_misses, 1);
    }

    #[tokio::test]
    async fn memory_usage_tracks_serialized_size() {
        let (_dir, _clock, cache) = cache();
        cache.set("posts", json!(["x"]), None).await.expect("set");
        let first = cache.stats().memory_usage;
        assert!(first > 0);

        cache
            .set("posts", json!(["x", "a much longer payload"]), None)
            .await
            .expect("set");
        assert!(cache.stats().memory_usage > first);
        assert_eq!(cache.stats().entries, 1);
    }
}
