//! High-level aggregation façade
//!
//! [`HeatmapAggregator`] owns the current dataset, the configuration and the process-local
//! cache tier. All three live in one immutable snapshot that is swapped as a whole, so a
//! request always sees a consistent triple even while `set_data` or `set_options` race it.

use crate::aggregate::aggregate;
use crate::cache::wire::AggregateFingerprint;
use crate::cache::{LocalCache, SharedAggregate};
use crate::zoom;
use crate::{
    AggregatorConfig, AggregatorError, AggregatorOptions, CacheManager, CacheStats, DatasetKey,
    Point, Result,
};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockWriteGuard};

struct Dataset<P> {
    key: DatasetKey,
    points: Vec<Point<P>>,
}

/// One generation of engine state
struct Snapshot<P> {
    dataset: Option<Arc<Dataset<P>>>,
    config: Arc<AggregatorConfig<P>>,
    local: LocalCache,
}

impl<P> Snapshot<P> {
    /// Same dataset and configuration, empty tier 1
    fn regenerate(&self) -> Self {
        Self {
            dataset: self.dataset.clone(),
            config: Arc::clone(&self.config),
            local: LocalCache::new(),
        }
    }
}

/// Zoom-aware point aggregator with two-tier caching
///
/// Cheap to share behind an `Arc`: every method takes `&self`.
///
/// # Example
/// ```no_run
/// # async fn demo() -> heatmap_grid_lib::Result<()> {
/// use heatmap_grid_lib::*;
/// use std::sync::Arc;
///
/// let cache = Arc::new(CacheManager::new(CacheSettings::default()));
/// let engine = HeatmapAggregator::new(AggregatorConfig::default(), cache)?;
/// engine.set_data(
///     DatasetKey::new("iron-ore", 1)?,
///     vec![Point::new(10.0, 20.0), Point::new(12.0, 21.0)],
/// );
/// let cells = engine.get_aggregated_points(6.0).await?;
/// println!("{} cells", cells.len());
/// # Ok(())
/// # }
/// ```
pub struct HeatmapAggregator<P = ()> {
    state: RwLock<Arc<Snapshot<P>>>,
    cache: Arc<CacheManager>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<P> HeatmapAggregator<P>
where
    P: Send + Sync + 'static,
{
    /// Create an engine with no dataset loaded
    pub fn new(config: AggregatorConfig<P>, cache: Arc<CacheManager>) -> Result<Self> {
        config.validate()?;
        tracing::debug!(?config, remote = cache.has_remote(), "Creating heatmap aggregator");
        Ok(Self {
            state: RwLock::new(Arc::new(Snapshot {
                dataset: None,
                config: Arc::new(config),
                local: LocalCache::new(),
            })),
            cache,
        })
    }

    fn snapshot(&self) -> Arc<Snapshot<P>> {
        let guard = match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Aggregator state lock poisoned; recovering");
                poisoned.into_inner()
            }
        };
        Arc::clone(&guard)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, Arc<Snapshot<P>>> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Aggregator state lock poisoned; recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Replace the dataset
    ///
    /// Starts a new tier-1 generation. Requests already running finish against the
    /// previous dataset.
    pub fn set_data(&self, key: DatasetKey, points: Vec<Point<P>>) {
        tracing::info!(dataset = %key, points = points.len(), "Loading dataset");
        let dataset = Arc::new(Dataset { key, points });
        let mut state = self.write_state();
        let next = Snapshot {
            dataset: Some(dataset),
            config: Arc::clone(&state.config),
            local: LocalCache::new(),
        };
        *state = Arc::new(next);
    }

    /// Merge `options` into the configuration
    ///
    /// On error nothing changes. On success tier 1 starts over.
    ///
    /// Remote entries are matched on map bounds, cell size and `min_points_per_cell` only.
    /// A new `weight_fn` is not detected there, so pair it with a [`set_data`](Self::set_data)
    /// under a bumped dataset version or stale weights may be read back from tier 2.
    pub fn set_options(&self, options: AggregatorOptions<P>) -> Result<()> {
        let mut state = self.write_state();
        let config = state.config.merged(options)?;
        tracing::debug!(?config, "Options updated");
        let next = Snapshot {
            dataset: state.dataset.clone(),
            config: Arc::new(config),
            local: LocalCache::new(),
        };
        *state = Arc::new(next);
        Ok(())
    }

    /// Cell size used at `zoom`
    pub fn calculate_cell_size(&self, zoom: f64) -> u32 {
        let config = self.config();
        zoom::calculate_cell_size(zoom, config.min_cell_size, config.max_cell_size)
    }

    /// Aggregated points at an explicit cell size
    ///
    /// Without a dataset the result is empty and nothing is cached.
    pub async fn get_aggregated_points_by_cell_size(
        &self,
        cell_size: u32,
    ) -> Result<SharedAggregate> {
        if cell_size == 0 {
            return Err(AggregatorError::InvalidCellSize(cell_size));
        }

        let snapshot = self.snapshot();
        let Some(dataset) = snapshot.dataset.clone() else {
            tracing::debug!(cell_size, "No dataset loaded");
            return Ok(Arc::new(Vec::new()));
        };

        if !snapshot.config.use_cache {
            self.cache.record_computation();
            return Ok(Arc::new(aggregate(
                &dataset.points,
                cell_size,
                &snapshot.config,
            )));
        }

        let fingerprint = AggregateFingerprint::new(cell_size, &snapshot.config);
        let config = Arc::clone(&snapshot.config);
        let source = Arc::clone(&dataset);
        let points = self
            .cache
            .get_or_compute(&snapshot.local, &dataset.key, fingerprint, move || {
                aggregate(&source.points, cell_size, &config)
            })
            .await;
        Ok(points)
    }

    /// Aggregated points at the cell size for `zoom`
    pub async fn get_aggregated_points(&self, zoom: f64) -> Result<SharedAggregate> {
        let cell_size = self.calculate_cell_size(zoom);
        self.get_aggregated_points_by_cell_size(cell_size).await
    }

    /// Cell size for every integer zoom in `min_zoom..=max_zoom`
    pub fn get_cell_sizes_for_zoom_range(&self, min_zoom: i32, max_zoom: i32) -> BTreeMap<i32, u32> {
        let config = self.config();
        zoom::cell_sizes_for_zoom_range(
            min_zoom,
            max_zoom,
            config.min_cell_size,
            config.max_cell_size,
        )
    }

    /// Warm both cache tiers for every distinct cell size in the zoom range
    ///
    /// Returns the cell sizes fetched, ascending.
    pub async fn precompute_for_zoom_range(&self, min_zoom: i32, max_zoom: i32) -> Result<Vec<u32>> {
        let config = self.config();
        let sizes = zoom::distinct_cell_sizes(
            min_zoom,
            max_zoom,
            config.min_cell_size,
            config.max_cell_size,
        );
        for &cell_size in &sizes {
            let points = self.get_aggregated_points_by_cell_size(cell_size).await?;
            tracing::debug!(cell_size, cells = points.len(), "Precomputed");
        }
        tracing::info!(min_zoom, max_zoom, sizes = ?sizes, "Precomputed zoom range");
        Ok(sizes)
    }

    /// Drop tier 1; remote entries are left to expire
    pub fn clear_cache(&self) {
        tracing::debug!("Clearing local cache");
        let mut state = self.write_state();
        let next = state.regenerate();
        *state = Arc::new(next);
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn dataset_key(&self) -> Option<DatasetKey> {
        self.snapshot().dataset.as_ref().map(|d| d.key.clone())
    }

    /// Number of points in the current dataset
    pub fn point_count(&self) -> usize {
        self.snapshot().dataset.as_ref().map_or(0, |d| d.points.len())
    }

    pub fn config(&self) -> Arc<AggregatorConfig<P>> {
        Arc::clone(&self.snapshot().config)
    }

    /// Cell sizes currently held in tier 1, ascending
    pub fn cached_cell_sizes(&self) -> Vec<u32> {
        self.snapshot().local.cell_sizes()
    }
}
