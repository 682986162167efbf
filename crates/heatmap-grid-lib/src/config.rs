//! Engine and cache configuration

use crate::{AggregatorError, Point, Result};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Caller-supplied mapping from a point to its heatmap contribution
pub type WeightFn<P> = Arc<dyn Fn(&Point<P>) -> f64 + Send + Sync>;

/// Configuration for the aggregation engine
///
/// The map bounds are fixed pixel extents; points outside them are ignored. The cell size
/// range bounds the resolution that zoom levels map to.
pub struct AggregatorConfig<P = ()> {
    /// Map width in pixels. Default: 1024
    pub map_width: u32,
    /// Map height in pixels. Default: 1024
    pub map_height: u32,
    /// Cell size used at the highest zoom. Default: 1
    pub min_cell_size: u32,
    /// Cell size used at zoom 0. Default: 64
    pub max_cell_size: u32,
    /// Cells with fewer points are dropped from the output (0 keeps everything)
    pub min_points_per_cell: usize,
    /// When false, both cache tiers are bypassed and every call recomputes
    pub use_cache: bool,
    /// Weight of each point. Default: constant 1
    pub weight_fn: WeightFn<P>,
}

impl<P> AggregatorConfig<P> {
    /// Check the invariants `1 <= min_cell_size <= max_cell_size` and non-empty map bounds
    pub fn validate(&self) -> Result<()> {
        if self.map_width == 0 || self.map_height == 0 {
            return Err(AggregatorError::InvalidConfiguration {
                reason: format!(
                    "map bounds must be positive, got {}x{}",
                    self.map_width, self.map_height
                ),
            });
        }
        if self.min_cell_size == 0 {
            return Err(AggregatorError::InvalidConfiguration {
                reason: "min_cell_size must be at least 1".to_string(),
            });
        }
        if self.min_cell_size > self.max_cell_size {
            return Err(AggregatorError::InvalidConfiguration {
                reason: format!(
                    "min_cell_size ({}) is greater than max_cell_size ({})",
                    self.min_cell_size, self.max_cell_size
                ),
            });
        }
        Ok(())
    }

    /// Merge a partial set of options into a copy of this configuration
    ///
    /// The merged configuration is validated; `self` is left untouched either way.
    pub fn merged(&self, options: AggregatorOptions<P>) -> Result<Self> {
        let merged = Self {
            map_width: options.map_width.unwrap_or(self.map_width),
            map_height: options.map_height.unwrap_or(self.map_height),
            min_cell_size: options.min_cell_size.unwrap_or(self.min_cell_size),
            max_cell_size: options.max_cell_size.unwrap_or(self.max_cell_size),
            min_points_per_cell: options
                .min_points_per_cell
                .unwrap_or(self.min_points_per_cell),
            use_cache: options.use_cache.unwrap_or(self.use_cache),
            weight_fn: options
                .weight_fn
                .unwrap_or_else(|| Arc::clone(&self.weight_fn)),
        };
        merged.validate()?;
        Ok(merged)
    }

    /// Weight of a single point according to the configured weight function
    #[inline(always)]
    pub fn weight_of(&self, point: &Point<P>) -> f64 {
        (self.weight_fn)(point)
    }
}

impl<P: 'static> Default for AggregatorConfig<P> {
    fn default() -> Self {
        Self {
            map_width: 1024,
            map_height: 1024,
            min_cell_size: 1,
            max_cell_size: 64,
            min_points_per_cell: 0,
            use_cache: true,
            weight_fn: Arc::new(|_: &Point<P>| 1.0),
        }
    }
}

impl<P> Clone for AggregatorConfig<P> {
    fn clone(&self) -> Self {
        Self {
            map_width: self.map_width,
            map_height: self.map_height,
            min_cell_size: self.min_cell_size,
            max_cell_size: self.max_cell_size,
            min_points_per_cell: self.min_points_per_cell,
            use_cache: self.use_cache,
            weight_fn: Arc::clone(&self.weight_fn),
        }
    }
}

impl<P> fmt::Debug for AggregatorConfig<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregatorConfig")
            .field("map_width", &self.map_width)
            .field("map_height", &self.map_height)
            .field("min_cell_size", &self.min_cell_size)
            .field("max_cell_size", &self.max_cell_size)
            .field("min_points_per_cell", &self.min_points_per_cell)
            .field("use_cache", &self.use_cache)
            .finish_non_exhaustive()
    }
}

/// Partial configuration update; `None` fields keep their current value
pub struct AggregatorOptions<P = ()> {
    pub map_width: Option<u32>,
    pub map_height: Option<u32>,
    pub min_cell_size: Option<u32>,
    pub max_cell_size: Option<u32>,
    pub min_points_per_cell: Option<usize>,
    pub use_cache: Option<bool>,
    pub weight_fn: Option<WeightFn<P>>,
}

impl<P> Default for AggregatorOptions<P> {
    fn default() -> Self {
        Self {
            map_width: None,
            map_height: None,
            min_cell_size: None,
            max_cell_size: None,
            min_points_per_cell: None,
            use_cache: None,
            weight_fn: None,
        }
    }
}

/// Settings for the cache tiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// First segment of every remote key. Default: "heatmap"
    pub namespace: String,
    /// Expiry of remote entries. Default: 12 hours
    pub ttl: Duration,
    /// Upper bound on a single remote round trip. Default: 250 ms
    pub remote_timeout: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            namespace: "heatmap".to_string(),
            ttl: Duration::from_secs(12 * 60 * 60),
            remote_timeout: Duration::from_millis(250),
        }
    }
}
