use heatmap_grid_lib::{AggregatorError, CacheError};
use std::path::PathBuf;

/// Everything that can abort a CLI run
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid points file {path}: {source}")]
    Points {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write output: {0}")]
    Output(#[from] serde_json::Error),

    #[error(transparent)]
    Aggregator(#[from] AggregatorError),

    #[error("Remote cache setup failed: {0}")]
    RemoteCache(#[from] CacheError),

    #[error("--redis-url given but this build has no Redis support")]
    RedisDisabled,
}

pub type Result<T> = std::result::Result<T, CliError>;
