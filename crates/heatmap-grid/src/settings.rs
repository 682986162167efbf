use clap::{ArgGroup, Parser};
use heatmap_grid_lib::{AggregatorConfig, CacheSettings, Point};
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
#[clap(group(ArgGroup::new("mode").required(true).args(["zoom", "cell_size", "precompute"])))]
/// Heatmap Grid - Aggregate map points into zoom-dependent heatmap cells
pub struct Settings {
    /// JSON file holding an array of `{"x": .., "y": .., "weight": ..}` points
    #[clap(short, long, value_name = "FILE", env = "HEATMAP_POINTS")]
    pub points: PathBuf,

    /// Dataset id used in cache keys (defaults to the points file name)
    #[clap(short, long, value_name = "ID", env = "HEATMAP_DATASET")]
    pub dataset: Option<String>,

    /// Dataset version; bump it whenever the points change
    #[clap(long, default_value = "1", env = "HEATMAP_DATASET_VERSION")]
    pub dataset_version: u64,

    /// Map width in pixels
    #[clap(long, default_value = "1024", env = "HEATMAP_MAP_WIDTH")]
    pub map_width: u32,

    /// Map height in pixels
    #[clap(long, default_value = "1024", env = "HEATMAP_MAP_HEIGHT")]
    pub map_height: u32,

    /// Cell size at the highest zoom
    #[clap(long, default_value = "1", env = "HEATMAP_MIN_CELL_SIZE")]
    pub min_cell_size: u32,

    /// Cell size at zoom 0
    #[clap(long, default_value = "64", env = "HEATMAP_MAX_CELL_SIZE")]
    pub max_cell_size: u32,

    /// Drop cells holding fewer points than this
    #[clap(long, default_value = "0", env = "HEATMAP_MIN_POINTS_PER_CELL")]
    pub min_points_per_cell: usize,

    /// Bypass both cache tiers
    #[clap(long, default_value = "false", env = "HEATMAP_NO_CACHE")]
    pub no_cache: bool,

    /// Redis server for the shared cache tier, e.g. redis://127.0.0.1:6379/0
    #[clap(long, value_name = "URL", env = "HEATMAP_REDIS_URL")]
    pub redis_url: Option<String>,

    /// First segment of every remote cache key
    #[clap(long, default_value = "heatmap", env = "HEATMAP_NAMESPACE")]
    pub namespace: String,

    /// Expiry of remote cache entries, in seconds
    #[clap(long, default_value = "43200", env = "HEATMAP_TTL_SECS")]
    pub ttl_secs: u64,

    /// Upper bound on a single remote cache round trip, in milliseconds
    #[clap(long, default_value = "250", env = "HEATMAP_REMOTE_TIMEOUT_MS")]
    pub remote_timeout_ms: u64,

    /// Print the aggregate for this zoom level
    #[clap(short, long, env = "HEATMAP_ZOOM")]
    pub zoom: Option<f64>,

    /// Print the aggregate for this cell size
    #[clap(short, long, env = "HEATMAP_CELL_SIZE")]
    pub cell_size: Option<u32>,

    /// Warm the caches for every zoom in MIN..MAX (inclusive) and print the cell sizes
    #[clap(long, value_name = "MIN..MAX", value_parser = parse_zoom_range, allow_hyphen_values = true, env = "HEATMAP_PRECOMPUTE")]
    pub precompute: Option<RangeInclusive<i32>>,
}

/// What the run should print
#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    Zoom(f64),
    CellSize(u32),
    Precompute(RangeInclusive<i32>),
}

impl Settings {
    pub fn from_cli() -> Self {
        Settings::parse()
    }

    pub fn mode(&self) -> Mode {
        // The "mode" group guarantees exactly one of these is set
        match (&self.zoom, &self.cell_size, &self.precompute) {
            (Some(zoom), _, _) => Mode::Zoom(*zoom),
            (_, Some(cell_size), _) => Mode::CellSize(*cell_size),
            (_, _, Some(range)) => Mode::Precompute(range.clone()),
            (None, None, None) => unreachable!("mode group is required"),
        }
    }

    /// Engine configuration; the weight comes from each point's payload
    pub fn aggregator_config(&self) -> AggregatorConfig<f64> {
        AggregatorConfig {
            map_width: self.map_width,
            map_height: self.map_height,
            min_cell_size: self.min_cell_size,
            max_cell_size: self.max_cell_size,
            min_points_per_cell: self.min_points_per_cell,
            use_cache: !self.no_cache,
            weight_fn: Arc::new(|p: &Point<f64>| p.payload),
        }
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            namespace: self.namespace.clone(),
            ttl: Duration::from_secs(self.ttl_secs),
            remote_timeout: Duration::from_millis(self.remote_timeout_ms),
        }
    }

    /// Dataset id: explicit, else the points file stem
    pub fn dataset_id(&self) -> String {
        self.dataset.clone().unwrap_or_else(|| {
            self.points
                .file_stem()
                .map(|stem| stem.to_string_lossy().replace(char::is_whitespace, "_"))
                .unwrap_or_else(|| "points".to_string())
        })
    }
}

/// Parse `MIN..MAX` into an inclusive zoom range
fn parse_zoom_range(value: &str) -> Result<RangeInclusive<i32>, String> {
    let (min, max) = value
        .split_once("..")
        .ok_or_else(|| format!("expected MIN..MAX, got {value:?}"))?;
    let max = max.strip_prefix('=').unwrap_or(max);
    let min: i32 = min
        .trim()
        .parse()
        .map_err(|e| format!("invalid minimum zoom {min:?}: {e}"))?;
    let max: i32 = max
        .trim()
        .parse()
        .map_err(|e| format!("invalid maximum zoom {max:?}: {e}"))?;
    if min > max {
        return Err(format!("minimum zoom {min} is above maximum zoom {max}"));
    }
    Ok(min..=max)
}
