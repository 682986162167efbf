//! Points file loading

use crate::error::{CliError, Result};
use heatmap_grid_lib::Point;
use serde::Deserialize;
use std::path::Path;

/// One entry of the points file
#[derive(Debug, Deserialize)]
struct InputPoint {
    x: f64,
    y: f64,
    #[serde(default = "default_weight")]
    weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl From<InputPoint> for Point<f64> {
    fn from(p: InputPoint) -> Self {
        Point::with_payload(p.x, p.y, p.weight)
    }
}

/// Parse a JSON array of `{x, y, weight?}` objects; the weight becomes the payload
pub fn parse_points(json: &str) -> serde_json::Result<Vec<Point<f64>>> {
    let raw: Vec<InputPoint> = serde_json::from_str(json)?;
    Ok(raw.into_iter().map(Point::from).collect())
}

pub fn load_points(path: &Path) -> Result<Vec<Point<f64>>> {
    let json = std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let points = parse_points(&json).map_err(|source| CliError::Points {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), points = points.len(), "Loaded points file");
    Ok(points)
}
