//! Two-tier aggregate cache
//!
//! Reads go tier 1 (process-local) → tier 2 (remote, optional) → compute. A computed result
//! is written to tier 1 unconditionally and to tier 2 on a best-effort basis. Every remote
//! round trip is bounded by [`CacheSettings::remote_timeout`]; timeouts, transport errors and
//! unusable payloads all degrade to a miss and are only logged.

mod local;
#[cfg(feature = "redis")]
mod redis;
mod remote;
pub mod wire;

pub use local::{LocalCache, SharedAggregate};
#[cfg(feature = "redis")]
pub use redis::RedisCache;
pub use remote::{InMemoryRemoteCache, RemoteCache};

use crate::{AggregatedPoint, CacheError, CacheSettings, DatasetKey};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::timeout;
use wire::AggregateFingerprint;

#[derive(Default)]
struct CacheMetrics {
    local_hits: AtomicU64,
    remote_hits: AtomicU64,
    remote_misses: AtomicU64,
    remote_errors: AtomicU64,
    remote_writes: AtomicU64,
    computations: AtomicU64,
    coalesced_waits: AtomicU64,
}

/// Point-in-time copy of the cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads answered by tier 1
    pub local_hits: u64,
    /// Reads answered by tier 2
    pub remote_hits: u64,
    /// Tier-2 lookups that found nothing
    pub remote_misses: u64,
    /// Tier-2 failures: transport errors, timeouts, corrupt or mismatched payloads
    pub remote_errors: u64,
    /// Successful tier-2 writes
    pub remote_writes: u64,
    /// Times the aggregation itself ran
    pub computations: u64,
    /// Callers that waited on another caller's in-flight computation
    pub coalesced_waits: u64,
}

/// Read-through / write-through cache over the local and remote tiers
///
/// The manager owns the remote tier and its policy; the local tier is passed per call so the
/// engine can swap it atomically with the dataset.
pub struct CacheManager {
    settings: CacheSettings,
    remote: Option<Arc<dyn RemoteCache>>,
    metrics: CacheMetrics,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl CacheManager {
    /// Create a manager without a remote tier
    pub fn new(settings: CacheSettings) -> Self {
        Self {
            settings,
            remote: None,
            metrics: CacheMetrics::default(),
        }
    }

    /// Attach a remote tier
    pub fn with_remote(mut self, remote: Arc<dyn RemoteCache>) -> Self {
        self.remote = Some(remote);
        self
    }

    #[inline]
    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    #[inline]
    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Remote key: `<namespace>:<dataset id>:v<version>:<cell size>`
    pub fn remote_key(&self, dataset: &DatasetKey, cell_size: u32) -> String {
        format!("{}:{}:{}", self.settings.namespace, dataset, cell_size)
    }

    pub fn stats(&self) -> CacheStats {
        let m = &self.metrics;
        CacheStats {
            local_hits: m.local_hits.load(Ordering::Relaxed),
            remote_hits: m.remote_hits.load(Ordering::Relaxed),
            remote_misses: m.remote_misses.load(Ordering::Relaxed),
            remote_errors: m.remote_errors.load(Ordering::Relaxed),
            remote_writes: m.remote_writes.load(Ordering::Relaxed),
            computations: m.computations.load(Ordering::Relaxed),
            coalesced_waits: m.coalesced_waits.load(Ordering::Relaxed),
        }
    }

    /// Count a computation that bypassed the cache
    pub(crate) fn record_computation(&self) {
        self.metrics.computations.fetch_add(1, Ordering::Relaxed);
    }

    /// Full read path for one cell size
    ///
    /// Concurrent callers missing tier 1 for the same cell size share a single lookup and
    /// computation. `compute` runs at most once per call and only on a full miss.
    pub async fn get_or_compute<F>(
        &self,
        local: &LocalCache,
        dataset: &DatasetKey,
        fingerprint: AggregateFingerprint,
        compute: F,
    ) -> SharedAggregate
    where
        F: FnOnce() -> Vec<AggregatedPoint> + Send,
    {
        let cell_size = fingerprint.cell_size;
        if let Some(hit) = local.get(cell_size) {
            self.metrics.local_hits.fetch_add(1, Ordering::Relaxed);
            return hit;
        }

        let slot = local.inflight_slot(cell_size).await;
        let mut led = false;
        let result = slot
            .get_or_init(|| {
                led = true;
                self.fill(local, dataset, fingerprint, compute)
            })
            .await
            .clone();

        if led {
            local.finish_inflight(cell_size).await;
        } else {
            self.metrics.coalesced_waits.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Miss path run by the caller that owns the in-flight slot
    async fn fill<F>(
        &self,
        local: &LocalCache,
        dataset: &DatasetKey,
        fingerprint: AggregateFingerprint,
        compute: F,
    ) -> SharedAggregate
    where
        F: FnOnce() -> Vec<AggregatedPoint>,
    {
        let cell_size = fingerprint.cell_size;

        // A previous owner may have finished between our tier-1 miss and taking the slot
        if let Some(hit) = local.get(cell_size) {
            self.metrics.local_hits.fetch_add(1, Ordering::Relaxed);
            return hit;
        }

        let key = self.remote_key(dataset, cell_size);
        if let Some(points) = self.fetch_remote(&key, &fingerprint).await {
            let shared = Arc::new(points);
            local.insert(cell_size, Arc::clone(&shared));
            return shared;
        }

        self.metrics.computations.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::new(compute());
        local.insert(cell_size, Arc::clone(&shared));
        tracing::debug!(
            key = %key,
            cells = shared.len(),
            "Computed aggregate"
        );

        if !shared.is_empty() {
            self.store_remote(&key, &fingerprint, &shared).await;
        }
        shared
    }

    async fn fetch_remote(
        &self,
        key: &str,
        fingerprint: &AggregateFingerprint,
    ) -> Option<Vec<AggregatedPoint>> {
        let remote = self.remote.as_ref()?;
        let limit = self.settings.remote_timeout;
        let response = timeout(limit, remote.get(key))
            .await
            .unwrap_or(Err(CacheError::Timeout(limit)));

        let payload = match response {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                self.metrics.remote_misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Err(e) => {
                self.metrics.remote_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key, error = %e, "Remote cache read failed; computing instead");
                return None;
            }
        };

        match wire::decode(&payload, fingerprint) {
            Ok(points) => {
                self.metrics.remote_hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key, cells = points.len(), "Remote cache hit");
                Some(points)
            }
            Err(e) => {
                self.metrics.remote_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key, error = %e, "Discarding unusable remote cache entry");
                None
            }
        }
    }

    async fn store_remote(
        &self,
        key: &str,
        fingerprint: &AggregateFingerprint,
        points: &[AggregatedPoint],
    ) {
        let Some(remote) = self.remote.as_ref() else {
            return;
        };
        let payload = match wire::encode(fingerprint, points) {
            Ok(payload) => payload,
            Err(e) => {
                self.metrics.remote_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key, error = %e, "Failed to serialize aggregate");
                return;
            }
        };

        let limit = self.settings.remote_timeout;
        let result = timeout(limit, remote.set_ex(key, self.settings.ttl, &payload))
            .await
            .unwrap_or(Err(CacheError::Timeout(limit)));
        match result {
            Ok(()) => {
                self.metrics.remote_writes.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.metrics.remote_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key, error = %e, "Remote cache write failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn dataset() -> DatasetKey {
        DatasetKey::new("ore", 1).unwrap()
    }

    fn fingerprint(cell_size: u32) -> AggregateFingerprint {
        AggregateFingerprint {
            cell_size,
            map_width: 64,
            map_height: 64,
            min_points_per_cell: 0,
        }
    }

    fn computed(cell_size: u32) -> Vec<AggregatedPoint> {
        vec![AggregatedPoint {
            x: 2.0,
            y: 3.0,
            weight: 5.0,
            count: 5,
            cell_size,
        }]
    }

    /// Remote that always fails
    struct BrokenRemote {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RemoteCache for BrokenRemote {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(CacheError::Unavailable("connection refused".to_string()))
        }

        async fn set_ex(&self, _key: &str, _ttl: Duration, _value: &str) -> Result<(), CacheError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(CacheError::Unavailable("connection refused".to_string()))
        }
    }

    /// Remote that never answers in time
    struct StalledRemote;

    #[async_trait]
    impl RemoteCache for StalledRemote {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(None)
        }

        async fn set_ex(&self, _key: &str, _ttl: Duration, _value: &str) -> Result<(), CacheError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    #[test]
    fn test_remote_key_format() {
        let manager = CacheManager::new(CacheSettings::default());
        assert_eq!(manager.remote_key(&dataset(), 16), "heatmap:ore:v1:16");
        assert!(!manager.has_remote());
    }

    #[tokio::test]
    async fn test_local_only_computes_once() {
        let manager = CacheManager::new(CacheSettings::default());
        let local = LocalCache::new();

        let first = manager
            .get_or_compute(&local, &dataset(), fingerprint(8), || computed(8))
            .await;
        let second = manager
            .get_or_compute(&local, &dataset(), fingerprint(8), || {
                panic!("second read must be served from tier 1")
            })
            .await;

        assert!(Arc::ptr_eq(&first, &second));
        let stats = manager.stats();
        assert_eq!(stats.computations, 1);
        assert_eq!(stats.local_hits, 1);
        assert_eq!(stats.remote_misses, 0);
    }

    #[tokio::test]
    async fn test_writes_through_to_remote() {
        let remote = Arc::new(InMemoryRemoteCache::default());
        let manager = CacheManager::new(CacheSettings::default()).with_remote(remote.clone());
        let local = LocalCache::new();

        manager
            .get_or_compute(&local, &dataset(), fingerprint(8), || computed(8))
            .await;

        let payload = remote.get("heatmap:ore:v1:8").await.unwrap().unwrap();
        assert_eq!(wire::decode(&payload, &fingerprint(8)).unwrap(), computed(8));
        let stats = manager.stats();
        assert_eq!(stats.remote_misses, 1);
        assert_eq!(stats.remote_writes, 1);
    }

    #[tokio::test]
    async fn test_empty_results_are_not_written_remotely() {
        let remote = Arc::new(InMemoryRemoteCache::default());
        let manager = CacheManager::new(CacheSettings::default()).with_remote(remote.clone());
        let local = LocalCache::new();

        let result = manager
            .get_or_compute(&local, &dataset(), fingerprint(8), Vec::new)
            .await;
        assert!(result.is_empty());
        assert!(remote.is_empty().await);
        assert_eq!(local.len(), 1);
    }

    #[tokio::test]
    async fn test_broken_remote_degrades_to_compute() {
        let remote = Arc::new(BrokenRemote {
            calls: AtomicUsize::new(0),
        });
        let manager = CacheManager::new(CacheSettings::default()).with_remote(remote.clone());
        let local = LocalCache::new();

        let result = manager
            .get_or_compute(&local, &dataset(), fingerprint(4), || computed(4))
            .await;
        assert_eq!(*result, computed(4));
        assert_eq!(remote.calls.load(Ordering::SeqCst), 2);
        assert_eq!(manager.stats().remote_errors, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_remote_times_out() {
        let settings = CacheSettings {
            remote_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let manager = CacheManager::new(settings).with_remote(Arc::new(StalledRemote));
        let local = LocalCache::new();

        let started = tokio::time::Instant::now();
        let result = manager
            .get_or_compute(&local, &dataset(), fingerprint(4), || computed(4))
            .await;
        assert_eq!(*result, computed(4));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(manager.stats().remote_errors, 2);
    }

    #[tokio::test]
    async fn test_corrupt_remote_entry_is_overwritten() {
        let remote = Arc::new(InMemoryRemoteCache::default());
        remote
            .set_ex("heatmap:ore:v1:8", Duration::from_secs(60), "{broken")
            .await
            .unwrap();
        let manager = CacheManager::new(CacheSettings::default()).with_remote(remote.clone());
        let local = LocalCache::new();

        let result = manager
            .get_or_compute(&local, &dataset(), fingerprint(8), || computed(8))
            .await;
        assert_eq!(*result, computed(8));

        let payload = remote.get("heatmap:ore:v1:8").await.unwrap().unwrap();
        assert!(wire::decode(&payload, &fingerprint(8)).is_ok());
        assert_eq!(manager.stats().remote_errors, 1);
    }

    #[tokio::test]
    async fn test_remote_hit_skips_compute() {
        let remote = Arc::new(InMemoryRemoteCache::default());
        let payload = wire::encode(&fingerprint(8), &computed(8)).unwrap();
        remote
            .set_ex("heatmap:ore:v1:8", Duration::from_secs(60), &payload)
            .await
            .unwrap();
        let manager = CacheManager::new(CacheSettings::default()).with_remote(remote);
        let local = LocalCache::new();

        let result = manager
            .get_or_compute(&local, &dataset(), fingerprint(8), || {
                panic!("remote hit must not compute")
            })
            .await;
        assert_eq!(*result, computed(8));
        assert_eq!(local.cell_sizes(), vec![8]);
        assert_eq!(manager.stats().remote_hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_misses_share_one_computation() {
        /// Remote whose reads take a while, so every caller piles up on the slot
        struct SlowRemote;

        #[async_trait]
        impl RemoteCache for SlowRemote {
            async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(None)
            }

            async fn set_ex(&self, _key: &str, _ttl: Duration, _value: &str) -> Result<(), CacheError> {
                Ok(())
            }
        }

        let manager = Arc::new(CacheManager::new(CacheSettings::default()).with_remote(Arc::new(SlowRemote)));
        let local = Arc::new(LocalCache::new());
        let computations = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let manager = Arc::clone(&manager);
            let local = Arc::clone(&local);
            let computations = Arc::clone(&computations);
            handles.push(tokio::spawn(async move {
                manager
                    .get_or_compute(&local, &dataset(), fingerprint(16), move || {
                        computations.fetch_add(1, Ordering::SeqCst);
                        computed(16)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(*handle.await.unwrap(), computed(16));
        }
        assert_eq!(computations.load(Ordering::SeqCst), 1);
        let stats = manager.stats();
        assert_eq!(stats.computations, 1);
        assert_eq!(stats.coalesced_waits, 7);
    }
}
