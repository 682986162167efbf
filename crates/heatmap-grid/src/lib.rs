//! Heatmap Grid - Command Line Front End
//!
//! Loads a points file into a [`HeatmapAggregator`], optionally backed by a Redis cache
//! tier, and prints aggregated cells as JSON on stdout. Logs go to stderr.

mod error;
mod input;
mod logging;
mod settings;

pub use error::{CliError, Result};
pub use input::{load_points, parse_points};
pub use logging::setup_logging;
pub use settings::{Mode, Settings};

use heatmap_grid_lib::{CacheManager, DatasetKey, HeatmapAggregator, MAX_ZOOM, Point};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Output of a precompute run
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrecomputeReport {
    cell_sizes_by_zoom: BTreeMap<i32, u32>,
    warmed: Vec<u32>,
}

/// Cache manager for the given settings, with a Redis tier when a URL is set
pub fn cache_manager(settings: &Settings) -> Result<CacheManager> {
    let manager = CacheManager::new(settings.cache_settings());
    match settings.redis_url.as_deref() {
        None => Ok(manager),
        #[cfg(feature = "redis")]
        Some(url) => {
            let redis = heatmap_grid_lib::RedisCache::open(url)?;
            tracing::info!(url, "Using Redis cache tier");
            Ok(manager.with_remote(Arc::new(redis)))
        }
        #[cfg(not(feature = "redis"))]
        Some(_) => Err(CliError::RedisDisabled),
    }
}

/// Run one mode against an already loaded point set and render the JSON output
pub async fn run_with_points(
    settings: &Settings,
    cache: Arc<CacheManager>,
    points: Vec<Point<f64>>,
) -> Result<String> {
    let engine = HeatmapAggregator::new(settings.aggregator_config(), cache)?;
    let key = DatasetKey::new(settings.dataset_id(), settings.dataset_version)?;
    engine.set_data(key, points);

    let output = match settings.mode() {
        Mode::Zoom(zoom) => {
            let cells = engine.get_aggregated_points(zoom).await?;
            serde_json::to_string_pretty(cells.as_slice())?
        }
        Mode::CellSize(cell_size) => {
            let cells = engine.get_aggregated_points_by_cell_size(cell_size).await?;
            serde_json::to_string_pretty(cells.as_slice())?
        }
        Mode::Precompute(range) => {
            let (min_zoom, max_zoom) = range.into_inner();
            let warmed = engine.precompute_for_zoom_range(min_zoom, max_zoom).await?;
            // Zooms past either end share the end's cell size; list only the distinct window
            let top = MAX_ZOOM as i32;
            let report = PrecomputeReport {
                cell_sizes_by_zoom: engine
                    .get_cell_sizes_for_zoom_range(min_zoom.clamp(0, top), max_zoom.clamp(0, top)),
                warmed,
            };
            serde_json::to_string_pretty(&report)?
        }
    };

    let stats = engine.stats();
    tracing::info!(
        local_hits = stats.local_hits,
        remote_hits = stats.remote_hits,
        remote_misses = stats.remote_misses,
        remote_errors = stats.remote_errors,
        computations = stats.computations,
        "Cache statistics"
    );
    Ok(output)
}

/// Load the points file and run the selected mode
pub async fn run(settings: &Settings) -> Result<String> {
    let points = load_points(&settings.points)?;
    let cache = Arc::new(cache_manager(settings)?);
    run_with_points(settings, cache, points).await
}
