//! Grid aggregation of raw points
//!
//! Points are bucketed by [`GridIndexer`] cell index. Each surviving bucket becomes one
//! [`AggregatedPoint`] at the centroid of its members (not the geometric cell center), which
//! keeps heatmap blobs where the data actually is.

use crate::grid::GridIndexer;
use crate::{AggregatorConfig, Point};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Inputs at least this large compute their cell indices in parallel
pub const PARALLEL_THRESHOLD: usize = 16_384;

/// One heatmap sample: the weighted centroid of a grid cell
///
/// Serialized as `{x, y, weight, count, cellSize}`, the wire format consumed by the map UI.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedPoint {
    /// Mean x of the member points
    pub x: f64,
    /// Mean y of the member points
    pub y: f64,
    /// Sum of member weights
    pub weight: f64,
    /// Number of member points
    pub count: u64,
    /// Cell size that produced this sample
    pub cell_size: u32,
}

/// Neumaier compensated sum
#[derive(Debug, Clone, Copy, Default)]
struct CompensatedSum {
    sum: f64,
    compensation: f64,
}

impl CompensatedSum {
    #[inline(always)]
    fn add(&mut self, value: f64) {
        let t = self.sum + value;
        if self.sum.abs() >= value.abs() {
            self.compensation += (self.sum - t) + value;
        } else {
            self.compensation += (value - t) + self.sum;
        }
        self.sum = t;
    }

    #[inline(always)]
    fn value(&self) -> f64 {
        self.sum + self.compensation
    }
}

/// Running totals for one cell
#[derive(Debug, Clone, Copy, Default)]
struct CellAccumulator {
    x: CompensatedSum,
    y: CompensatedSum,
    weight: CompensatedSum,
    count: u64,
}

impl CellAccumulator {
    #[inline(always)]
    fn push(&mut self, x: f64, y: f64, weight: f64) {
        self.x.add(x);
        self.y.add(y);
        self.weight.add(weight);
        self.count += 1;
    }

    fn finish(&self, cell_size: u32) -> AggregatedPoint {
        let n = self.count as f64;
        AggregatedPoint {
            x: self.x.value() / n,
            y: self.y.value() / n,
            weight: self.weight.value(),
            count: self.count,
            cell_size,
        }
    }
}

/// Cell index of every point, `None` for points outside the map
///
/// Parallel and sequential paths produce identical output; only the index computation is
/// split across threads.
fn cell_indices<P: Sync>(points: &[Point<P>], grid: &GridIndexer, parallel: bool) -> Vec<Option<u64>> {
    if parallel {
        points
            .par_iter()
            .map(|p| grid.cell_index(p.x, p.y))
            .collect()
    } else {
        points.iter().map(|p| grid.cell_index(p.x, p.y)).collect()
    }
}

/// Aggregate points into grid cells of side `cell_size`
///
/// Cells holding fewer than `config.min_points_per_cell` points are dropped. The output is
/// sorted by cell index (row-major), so identical inputs always yield identical outputs.
///
/// # Arguments
/// * `points` - Raw points; those outside the map bounds or with non-finite coordinates are skipped
/// * `cell_size` - Side of a grid cell in map pixels (must be at least 1)
/// * `config` - Map bounds, sparse-cell threshold and weight function
pub fn aggregate<P: Sync>(
    points: &[Point<P>],
    cell_size: u32,
    config: &AggregatorConfig<P>,
) -> Vec<AggregatedPoint> {
    #[cfg(feature = "profiling")]
    profiling::scope!("aggregate::aggregate");

    if points.is_empty() {
        return Vec::new();
    }

    let grid = GridIndexer::new(config.map_width, config.map_height, cell_size);
    let indices = cell_indices(points, &grid, points.len() >= PARALLEL_THRESHOLD);

    // Accumulate sequentially in input order so floating point sums are reproducible
    let mut buckets: HashMap<u64, CellAccumulator> = HashMap::new();
    let mut skipped = 0usize;
    for (point, index) in points.iter().zip(indices) {
        let Some(index) = index else {
            skipped += 1;
            continue;
        };
        buckets
            .entry(index)
            .or_default()
            .push(point.x, point.y, config.weight_of(point));
    }

    if skipped > 0 {
        tracing::debug!(
            skipped,
            map_width = config.map_width,
            map_height = config.map_height,
            "Skipped points outside map bounds"
        );
    }

    let min_points = config.min_points_per_cell as u64;
    let mut cells: Vec<(u64, CellAccumulator)> = buckets
        .into_iter()
        .filter(|(_, acc)| acc.count >= min_points)
        .collect();
    cells.sort_unstable_by_key(|(index, _)| *index);

    cells
        .iter()
        .map(|(_, acc)| acc.finish(grid.cell_size()))
        .collect()
}
