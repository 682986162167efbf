//! Zoom level to cell size mapping
//!
//! Higher zoom shows more detail, so it maps to smaller cells. The mapping is a linear
//! interpolation between the configured maximum cell size (zoom 0) and minimum cell size
//! (zoom [`MAX_ZOOM`]), rounded half-up to an integer.

use std::collections::BTreeMap;

/// Highest zoom level the map UI exposes; larger values are clamped
pub const MAX_ZOOM: f64 = 28.0;

/// Convert a zoom level into a grid cell size
///
/// The zoom is clamped to `[0, MAX_ZOOM]` (NaN counts as 0). The result is always at
/// least 1 and never increases when the zoom increases.
#[inline]
pub fn calculate_cell_size(zoom: f64, min_cell_size: u32, max_cell_size: u32) -> u32 {
    let t = if zoom.is_nan() {
        0.0
    } else {
        (zoom / MAX_ZOOM).clamp(0.0, 1.0)
    };
    let max = f64::from(max_cell_size);
    let min = f64::from(min_cell_size);
    let raw = max - t * (max - min);

    // Round half-up; `raw` is never negative so this matches the usual schoolbook rule
    let rounded = (raw + 0.5).floor();
    (rounded as u32).max(1)
}

/// Cell size for every integer zoom in `min_zoom..=max_zoom`
///
/// Returns an empty map when `min_zoom > max_zoom`.
pub fn cell_sizes_for_zoom_range(
    min_zoom: i32,
    max_zoom: i32,
    min_cell_size: u32,
    max_cell_size: u32,
) -> BTreeMap<i32, u32> {
    (min_zoom..=max_zoom)
        .map(|zoom| {
            (
                zoom,
                calculate_cell_size(f64::from(zoom), min_cell_size, max_cell_size),
            )
        })
        .collect()
}

/// Distinct cell sizes spanned by a zoom range, ascending
///
/// Neighbouring zoom levels frequently share a cell size, so this is usually shorter
/// than the zoom range itself. Zooms outside `[0, MAX_ZOOM]` clamp to the range ends, so
/// only that window is walked however wide the request is.
pub fn distinct_cell_sizes(
    min_zoom: i32,
    max_zoom: i32,
    min_cell_size: u32,
    max_cell_size: u32,
) -> Vec<u32> {
    if min_zoom > max_zoom {
        return Vec::new();
    }
    let top = MAX_ZOOM as i32;
    let mut sizes: Vec<u32> = (min_zoom.clamp(0, top)..=max_zoom.clamp(0, top))
        .map(|zoom| calculate_cell_size(f64::from(zoom), min_cell_size, max_cell_size))
        .collect();
    sizes.sort_unstable();
    sizes.dedup();
    sizes
}
