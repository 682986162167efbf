//! Process-local cache tier
//!
//! One [`LocalCache`] belongs to one dataset generation: replacing the dataset or the
//! configuration installs a fresh instance instead of mutating this one, so late writers
//! from an older generation can never leak into the current one.

use crate::AggregatedPoint;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

/// Shared, immutable aggregation result
pub type SharedAggregate = Arc<Vec<AggregatedPoint>>;

/// Slot that concurrent callers for one cell size wait on
pub(crate) type InflightSlot = Arc<OnceCell<SharedAggregate>>;

/// Tier-1 results keyed by cell size, plus the in-flight computations
#[derive(Default)]
pub struct LocalCache {
    entries: DashMap<u32, SharedAggregate>,
    inflight: Mutex<HashMap<u32, InflightSlot>>,
}

impl LocalCache {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self, cell_size: u32) -> Option<SharedAggregate> {
        self.entries.get(&cell_size).map(|entry| Arc::clone(entry.value()))
    }

    #[inline]
    pub fn insert(&self, cell_size: u32, points: SharedAggregate) {
        self.entries.insert(cell_size, points);
    }

    /// Number of cached cell sizes
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached cell sizes, ascending
    pub fn cell_sizes(&self) -> Vec<u32> {
        let mut sizes: Vec<u32> = self.entries.iter().map(|entry| *entry.key()).collect();
        sizes.sort_unstable();
        sizes
    }

    /// In-flight slot for `cell_size`, created if nobody is computing it yet
    pub(crate) async fn inflight_slot(&self, cell_size: u32) -> InflightSlot {
        let mut inflight = self.inflight.lock().await;
        Arc::clone(
            inflight
                .entry(cell_size)
                .or_insert_with(|| Arc::new(OnceCell::new())),
        )
    }

    /// Forget the in-flight slot once its result is in `entries`
    pub(crate) async fn finish_inflight(&self, cell_size: u32) {
        self.inflight.lock().await.remove(&cell_size);
    }
}
