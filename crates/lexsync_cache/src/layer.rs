//! The TTL cache and its coalesced read-through loader.

use crate::config::CacheConfig;
use crate::stats::CacheStats;
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    stored_at: Instant,
    ttl: Duration,
}

/// In-progress loads of one key share a loader. `generation` moves on every
/// invalidation of the key, so a fetch that started before it does not
/// store its result.
#[derive(Default)]
struct Loader {
    gate: Arc<tokio::sync::Mutex<()>>,
    generation: AtomicU64,
}

/// Holds a loader for the duration of a `get_or_set` call and hands it back
/// on drop, including when the call is cancelled.
struct LoadSlot<'a> {
    cache: &'a CacheLayer,
    key: &'a str,
    loader: Option<Arc<Loader>>,
}

impl LoadSlot<'_> {
    fn generation(&self) -> u64 {
        self.loader
            .as_ref()
            .map_or(0, |loader| loader.generation.load(Ordering::SeqCst))
    }
}

impl Drop for LoadSlot<'_> {
    fn drop(&mut self) {
        if let Some(loader) = self.loader.take() {
            self.cache.release_loader(self.key, loader);
        }
    }
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) < self.ttl
    }
}

/// Typed TTL cache.
///
/// Safe to share between tasks; every method takes `&self`.
pub struct CacheLayer {
    config: CacheConfig,
    entries: RwLock<HashMap<String, CacheEntry>>,
    /// One loader per key with a `get_or_set` call in progress.
    loading: Mutex<HashMap<String, Arc<Loader>>>,
    stats: CacheStats,
}

impl CacheLayer {
    /// Creates an empty cache with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    /// Creates an empty cache.
    #[must_use]
    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
            loading: Mutex::new(HashMap::new()),
            stats: CacheStats::default(),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the counters.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Returns a clone of the value under `key` if it is fresh and of type `T`.
    ///
    /// An expired entry is removed.
    pub fn get<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                None => {
                    self.stats.record_miss();
                    return None;
                }
                Some(entry) if entry.is_fresh(now) => {
                    let value = entry.value.downcast_ref::<T>().cloned();
                    if value.is_some() {
                        self.stats.record_hit();
                    } else {
                        trace!(key, "cached value has a different type");
                        self.stats.record_miss();
                    }
                    return value;
                }
                Some(_) => {}
            }
        }

        // Expired: re-check under the write lock, a concurrent set may have
        // replaced it.
        let mut entries = self.entries.write();
        if entries.get(key).is_some_and(|entry| !entry.is_fresh(now)) {
            entries.remove(key);
            self.stats.record_evictions(1);
            trace!(key, "expired entry evicted");
        }
        self.stats.record_miss();
        None
    }

    /// Stores `value` under `key` with the default TTL.
    pub fn set<T>(&self, key: impl Into<String>, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.set_with_ttl(key, value, self.config.default_ttl);
    }

    /// Stores `value` under `key`, fresh for `ttl`.
    ///
    /// Replaces any previous entry, whatever its type.
    pub fn set_with_ttl<T>(&self, key: impl Into<String>, value: T, ttl: Duration)
    where
        T: Send + Sync + 'static,
    {
        let entry = CacheEntry {
            value: Arc::new(value),
            stored_at: Instant::now(),
            ttl,
        };
        self.entries.write().insert(key.into(), entry);
    }

    /// Removes the entry under `key`. Returns true if there was one.
    ///
    /// A `get_or_set` fetch for `key` that is already running will not
    /// store its result.
    pub fn delete(&self, key: &str) -> bool {
        let mut entries = self.entries.write();
        if let Some(loader) = self.loading.lock().get(key) {
            loader.generation.fetch_add(1, Ordering::SeqCst);
        }
        entries.remove(key).is_some()
    }

    /// Removes every expired entry and returns how many were removed.
    pub fn clear_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(now));
        let removed = before - entries.len();
        if removed > 0 {
            self.stats.record_evictions(removed as u64);
            debug!(removed, "expired cache entries cleared");
        }
        removed
    }

    /// Removes every entry. Fetches already running will not store their
    /// results.
    pub fn clear_all(&self) {
        let mut entries = self.entries.write();
        for loader in self.loading.lock().values() {
            loader.generation.fetch_add(1, Ordering::SeqCst);
        }
        let count = entries.len();
        entries.clear();
        debug!(count, "cache cleared");
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn size(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns the cached value for `key`, or runs `fetch` and caches its
    /// result for `ttl` (the default TTL when `None`).
    ///
    /// While one caller's fetch for a key is running, other callers for the
    /// same key wait for it and then read the stored value instead of
    /// fetching again. A failed fetch stores nothing; its error goes to the
    /// caller that ran it and the next waiter fetches afresh. A result whose
    /// key was deleted or cleared during the fetch is returned but not
    /// stored.
    ///
    /// # Errors
    ///
    /// Returns the error produced by `fetch`.
    pub async fn get_or_set<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        fetch: F,
    ) -> Result<T, E>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get::<T>(key) {
            return Ok(value);
        }

        let loader = {
            let mut loading = self.loading.lock();
            Arc::clone(loading.entry(key.to_string()).or_default())
        };
        let gate = Arc::clone(&loader.gate);
        let slot = LoadSlot {
            cache: self,
            key,
            loader: Some(loader),
        };
        let _permit = gate.lock_owned().await;

        // Another caller may have loaded the key while we waited.
        if let Some(value) = self.peek::<T>(key) {
            return Ok(value);
        }

        let generation = slot.generation();
        self.stats.record_fetch();
        debug!(key, "loading cache entry");
        let outcome = fetch().await;
        if let Ok(value) = &outcome {
            let entry = CacheEntry {
                value: Arc::new(value.clone()),
                stored_at: Instant::now(),
                ttl: ttl.unwrap_or(self.config.default_ttl),
            };
            let mut entries = self.entries.write();
            if slot.generation() == generation {
                entries.insert(key.to_string(), entry);
            } else {
                debug!(key, "entry invalidated during load, result not cached");
            }
        }
        outcome
    }

    /// Fresh lookup without touching the counters.
    fn peek<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let now = Instant::now();
        self.entries
            .read()
            .get(key)
            .filter(|entry| entry.is_fresh(now))
            .and_then(|entry| entry.value.downcast_ref::<T>().cloned())
    }

    /// Gives back a loader; the last holder removes it from the map.
    ///
    /// Loaders are only cloned and dropped under the `loading` lock, so the
    /// reference count checked here is exact.
    fn release_loader(&self, key: &str, loader: Arc<Loader>) {
        let mut loading = self.loading.lock();
        drop(loader);
        if loading
            .get(key)
            .is_some_and(|current| Arc::strong_count(current) == 1)
        {
            loading.remove(key);
        }
    }
}

impl Default for CacheLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CacheLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheLayer")
            .field("config", &self.config)
            .field("size", &self.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn set_then_get() {
        let cache = CacheLayer::new();
        cache.set("case:1", "Smith v. Jones".to_string());

        assert_eq!(cache.get::<String>("case:1").as_deref(), Some("Smith v. Jones"));
        assert_eq!(cache.get::<String>("case:2"), None);
        assert_eq!(cache.stats().hits(), 1);
        assert_eq!(cache.stats().misses(), 1);
    }

    #[test]
    fn type_mismatch_is_a_miss_and_keeps_entry() {
        let cache = CacheLayer::new();
        cache.set("count", 3_u64);

        assert_eq!(cache.get::<String>("count"), None);
        assert_eq!(cache.get::<u64>("count"), Some(3));
        assert_eq!(cache.size(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_misses_and_is_evicted() {
        let cache = CacheLayer::new();
        cache.set_with_ttl("k", 1_u32, Duration::from_millis(100));
        cache.set("other", 2_u32);
        assert_eq!(cache.size(), 2);

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(cache.get::<u32>("k"), None);
        assert_eq!(cache.size(), 1);
        assert_eq!(cache.stats().evictions(), 1);
        assert_eq!(cache.get::<u32>("other"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn clear_expired_counts_removed() {
        let cache = CacheLayer::new();
        cache.set_with_ttl("a", 1_u8, Duration::from_millis(10));
        cache.set_with_ttl("b", 2_u8, Duration::from_millis(10));
        cache.set_with_ttl("c", 3_u8, Duration::from_secs(10));

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(cache.clear_expired(), 2);
        assert_eq!(cache.clear_expired(), 0);
        assert_eq!(cache.size(), 1);
    }

    #[test]
    fn delete_and_clear_all() {
        let cache = CacheLayer::new();
        cache.set("a", 1_i32);
        cache.set("b", 2_i32);

        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
        cache.clear_all();
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn zero_ttl_is_never_fresh() {
        let cache = CacheLayer::new();
        cache.set_with_ttl("k", 1_u32, Duration::ZERO);
        assert_eq!(cache.get::<u32>("k"), None);
    }

    #[tokio::test]
    async fn get_or_set_fetches_once_then_hits() {
        let cache = CacheLayer::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_set("list:lawFirmCases", None, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(vec![1, 2, 3])
                })
                .await
                .unwrap();
            assert_eq!(value, vec![1, 2, 3]);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().fetches(), 1);
    }

    #[tokio::test]
    async fn failed_fetch_is_not_cached() {
        let cache = CacheLayer::new();

        let first: Result<u32, String> = cache
            .get_or_set("k", None, || async { Err("upstream down".to_string()) })
            .await;
        assert_eq!(first, Err("upstream down".to_string()));
        assert_eq!(cache.size(), 0);

        let second: Result<u32, String> = cache.get_or_set("k", None, || async { Ok(9) }).await;
        assert_eq!(second, Ok(9));
    }

    #[tokio::test(start_paused = true)]
    async fn delete_during_load_discards_the_result() {
        let cache = CacheLayer::new();
        let calls = AtomicUsize::new(0);
        let calls = &calls;
        let fetch = || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, String>(n)
        };

        let (loaded, deleted) = tokio::join!(
            cache.get_or_set("listing:lawFirmCases", None, fetch),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                cache.delete("listing:lawFirmCases")
            }
        );

        assert_eq!(loaded, Ok(0));
        assert!(!deleted);
        assert_eq!(cache.size(), 0);

        let reloaded = cache.get_or_set("listing:lawFirmCases", None, fetch).await;
        assert_eq!(reloaded, Ok(1));
        assert_eq!(cache.get::<usize>("listing:lawFirmCases"), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn clear_all_during_load_discards_the_result() {
        let cache = CacheLayer::new();

        let (loaded, ()) = tokio::join!(
            cache.get_or_set("k", None, || async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok::<_, String>(5_u32)
            }),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                cache.clear_all();
            }
        );

        assert_eq!(loaded, Ok(5));
        assert_eq!(cache.size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_load_releases_its_loader() {
        let cache = CacheLayer::new();

        let load = cache.get_or_set("k", None, || async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok::<_, String>(1_u32)
        });
        assert!(tokio::time::timeout(Duration::from_millis(10), load)
            .await
            .is_err());

        assert!(cache.loading.lock().is_empty());
        assert_eq!(cache.size(), 0);
        let value = cache.get_or_set("k", None, || async { Ok::<_, String>(2_u32) }).await;
        assert_eq!(value, Ok(2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_misses_share_one_fetch() {
        let cache = Arc::new(CacheLayer::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            tasks.push(tokio::spawn(async move {
                cache
                    .get_or_set("list:calendarEvents", None, || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<_, String>("events".to_string())
                    })
                    .await
            }));
        }

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), "events");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.loading.lock().is_empty());
    }
}
