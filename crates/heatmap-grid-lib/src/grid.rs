//! Grid indexing over fixed map bounds
//!
//! A [`GridIndexer`] splits a `map_width × map_height` pixel area into square cells of side
//! `cell_size` and encodes each cell as a single integer, row-major:
//! `cell_index = cell_y * horizontal_cells + cell_x`.

/// Row-major cell indexer for one cell size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridIndexer {
    map_width: u32,
    map_height: u32,
    cell_size: u32,
    horizontal_cells: u64,
}

impl GridIndexer {
    /// Create an indexer for the given map bounds and cell size
    ///
    /// `cell_size` must be at least 1; the façade rejects zero before getting here.
    #[inline]
    pub fn new(map_width: u32, map_height: u32, cell_size: u32) -> Self {
        debug_assert!(cell_size >= 1, "cell size must be at least 1");
        let cell_size = cell_size.max(1);
        Self {
            map_width,
            map_height,
            cell_size,
            horizontal_cells: u64::from(map_width.div_ceil(cell_size)),
        }
    }

    /// Number of cells along the x axis (`ceil(map_width / cell_size)`)
    #[inline]
    pub fn horizontal_cells(&self) -> u64 {
        self.horizontal_cells
    }

    /// Number of cells along the y axis (`ceil(map_height / cell_size)`)
    #[inline]
    pub fn vertical_cells(&self) -> u64 {
        u64::from(self.map_height.div_ceil(self.cell_size))
    }

    #[inline]
    pub fn cell_size(&self) -> u32 {
        self.cell_size
    }

    /// Check if a coordinate lies inside `[0, width) × [0, height)`
    #[inline(always)]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= 0.0 && y >= 0.0 && x < f64::from(self.map_width) && y < f64::from(self.map_height)
    }

    /// Cell index of a coordinate, or `None` if it lies outside the map
    ///
    /// Non-finite coordinates are outside the map by definition. Indices are below
    /// `horizontal_cells * vertical_cells`, which fits in `u64` for any `u32` bounds.
    #[inline(always)]
    pub fn cell_index(&self, x: f64, y: f64) -> Option<u64> {
        if !self.contains(x, y) {
            return None;
        }
        let size = f64::from(self.cell_size);
        let cell_x = (x / size).floor() as u64;
        let cell_y = (y / size).floor() as u64;
        Some(cell_y * self.horizontal_cells + cell_x)
    }

    /// Inverse of [`cell_index`](Self::cell_index): `(cell_x, cell_y)`
    #[inline]
    pub fn cell_coords(&self, cell_index: u64) -> (u64, u64) {
        (
            cell_index % self.horizontal_cells,
            cell_index / self.horizontal_cells,
        )
    }
}
