//! Heatmap Grid Library - Zoom-Aware Point Aggregation
//!
//! This library turns large sets of raw map points (resource node locations, kill spots, ...)
//! into a coarse grid of weighted centroids suitable for heatmap rendering. The grid resolution
//! follows the map zoom level, and results are cached in two tiers: a process-local map and an
//! optional external key-value store with time-based expiry.
//!
//! # Architecture
//!
//! - **[`zoom`]**: Maps a continuous zoom level to a discrete cell size
//! - **[`grid`]**: Maps a coordinate to a single integer cell index over fixed map bounds
//! - **[`aggregate`]**: Buckets points per cell and computes centroid, weight and count
//! - **[`CacheManager`]**: Read-through / write-through cache over both tiers
//! - **[`HeatmapAggregator`]**: High-level façade owning the dataset and configuration
//!
//! # Performance Characteristics
//!
//! - **Aggregation**: O(N) bucketing + O(C log C) ordering (C = occupied cells)
//! - **Cached reads**: O(1) lookup in the local tier, one round trip for the remote tier
//! - **Concurrent misses**: coalesced into a single computation per cell size

pub mod aggregate;
pub mod cache;
mod config;
mod engine;
pub mod grid;
mod point;
pub mod zoom;

// Public API exports
pub use aggregate::AggregatedPoint;
pub use cache::{CacheManager, CacheStats, InMemoryRemoteCache, RemoteCache};
#[cfg(feature = "redis")]
pub use cache::RedisCache;
pub use config::{AggregatorConfig, AggregatorOptions, CacheSettings, WeightFn};
pub use engine::HeatmapAggregator;
pub use point::{DatasetKey, Point};
pub use zoom::MAX_ZOOM;

use std::time::Duration;

/// Errors raised by the external cache tier.
///
/// These never reach the callers of [`HeatmapAggregator`]: the engine logs them
/// and falls back to computing the aggregate.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Remote cache unavailable: {0}")]
    Unavailable(String),

    #[error("Remote cache did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Corrupt cache payload: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Cache payload mismatch: {reason}")]
    SchemaMismatch { reason: String },
}

/// Error types for the aggregation engine
#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    #[error("Invalid cell size: {0} (must be at least 1)")]
    InvalidCellSize(u32),

    #[error("Invalid dataset key: {0}")]
    InvalidDatasetKey(String),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

pub type Result<T> = std::result::Result<T, AggregatorError>;
