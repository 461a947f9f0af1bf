//! Uniform grid for neighbour queries.
//!
//! The grid is rebuilt from scratch every step with a counting sort: one pass
//! counts agents per cell, a prefix sum turns the counts into offsets, and a
//! second pass scatters agent indices into one packed array. Queries scan the
//! cells overlapping a square of side `2 * radius` and return a candidate
//! superset; callers filter by true distance.
//!
//! Cell size should equal the flock's perception radius so a perception query
//! touches at most 3x3 cells.

use glam::Vec2;

use crate::error::ConfigError;

/// Uniform bucket grid covering `[0, width] x [0, height]`.
#[derive(Clone, Debug)]
pub struct SpatialGrid {
    cell_size: f32,
    width: f32,
    height: f32,
    cols: usize,
    rows: usize,
    /// `cell_start[c]..cell_start[c + 1]` indexes `entries` for cell `c`.
    cell_start: Vec<u32>,
    /// Agent indices ordered by cell, ascending index within a cell.
    entries: Vec<u32>,
    /// Cell of each agent from the last rebuild.
    agent_cells: Vec<u32>,
}

impl SpatialGrid {
    /// Create a grid over a `width x height` world.
    pub fn new(cell_size: f32, width: f32, height: f32) -> Result<Self, ConfigError> {
        validate_cell_size(cell_size)?;
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            return Err(ConfigError::InvalidWorldSize { width, height });
        }
        let mut grid = Self {
            cell_size,
            width,
            height,
            cols: 1,
            rows: 1,
            cell_start: Vec::new(),
            entries: Vec::new(),
            agent_cells: Vec::new(),
        };
        grid.layout();
        Ok(grid)
    }

    fn layout(&mut self) {
        self.cols = ((self.width / self.cell_size).ceil() as usize).max(1);
        self.rows = ((self.height / self.cell_size).ceil() as usize).max(1);
        self.cell_start.clear();
        self.cell_start.resize(self.cols * self.rows + 1, 0);
        self.entries.clear();
        self.agent_cells.clear();
    }

    /// Change the cell edge length. Contents are cleared until the next rebuild.
    pub fn set_cell_size(&mut self, cell_size: f32) -> Result<(), ConfigError> {
        validate_cell_size(cell_size)?;
        self.cell_size = cell_size;
        self.layout();
        Ok(())
    }

    /// Change the covered world extent. Non-positive sizes are ignored.
    pub fn resize(&mut self, width: f32, height: f32) {
        if width > 0.0 && height > 0.0 && width.is_finite() && height.is_finite() {
            self.width = width;
            self.height = height;
            self.layout();
        }
    }

    #[inline]
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Grid dimensions as `(cols, rows)`.
    #[inline]
    pub fn dimensions(&self) -> (usize, usize) {
        (self.cols, self.rows)
    }

    /// Cell coordinates for a position, clamped to the grid extent.
    #[inline]
    pub fn cell_coords(&self, pos: Vec2) -> (usize, usize) {
        let cx = (pos.x / self.cell_size).floor();
        let cy = (pos.y / self.cell_size).floor();
        // NaN clamps to 0 through the `max` below.
        let cx = cx.max(0.0).min((self.cols - 1) as f32) as usize;
        let cy = cy.max(0.0).min((self.rows - 1) as f32) as usize;
        (cx, cy)
    }

    /// Clear all cells and reinsert every position.
    pub fn rebuild(&mut self, positions: &[Vec2]) {
        let cell_count = self.cols * self.rows;
        self.cell_start.clear();
        self.cell_start.resize(cell_count + 1, 0);
        self.agent_cells.clear();
        self.agent_cells.reserve(positions.len());

        for &pos in positions {
            let (cx, cy) = self.cell_coords(pos);
            let cell = cy * self.cols + cx;
            self.agent_cells.push(cell as u32);
            self.cell_start[cell + 1] += 1;
        }
        for c in 0..cell_count {
            self.cell_start[c + 1] += self.cell_start[c];
        }

        self.entries.clear();
        self.entries.resize(positions.len(), 0);
        let mut cursor: Vec<u32> = self.cell_start[..cell_count].to_vec();
        for (idx, &cell) in self.agent_cells.iter().enumerate() {
            let slot = &mut cursor[cell as usize];
            self.entries[*slot as usize] = idx as u32;
            *slot += 1;
        }
    }

    /// Number of agents inserted by the last rebuild.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Agents in a single cell.
    pub fn cell(&self, cx: usize, cy: usize) -> &[u32] {
        if cx >= self.cols || cy >= self.rows {
            return &[];
        }
        let c = cy * self.cols + cx;
        let start = self.cell_start[c] as usize;
        let end = self.cell_start[c + 1] as usize;
        &self.entries[start..end]
    }

    /// Visit every agent whose cell overlaps the query square.
    ///
    /// Visits are ordered by cell row, then column, then agent index, so the
    /// order is a pure function of the positions passed to `rebuild`.
    #[inline]
    pub fn for_each_candidate(&self, center: Vec2, radius: f32, mut visit: impl FnMut(usize)) {
        if self.entries.is_empty() {
            return;
        }
        let r = radius.max(0.0);
        let (x0, y0) = self.cell_coords(center - Vec2::splat(r));
        let (x1, y1) = self.cell_coords(center + Vec2::splat(r));
        for cy in y0..=y1 {
            let row = cy * self.cols;
            let start = self.cell_start[row + x0] as usize;
            let end = self.cell_start[row + x1 + 1] as usize;
            // Cells in a row are contiguous in `entries`.
            for &idx in &self.entries[start..end] {
                visit(idx as usize);
            }
        }
    }

    /// Candidate neighbours of `(x, y)` within `radius`, excluding `exclude`.
    ///
    /// The result is a superset of the agents inside the radius.
    pub fn query_neighbors(&self, x: f32, y: f32, radius: f32, exclude: Option<usize>) -> Vec<usize> {
        let mut out = Vec::new();
        self.query_into(Vec2::new(x, y), radius, exclude, &mut out);
        out
    }

    /// Allocation-free variant of [`query_neighbors`](Self::query_neighbors).
    pub fn query_into(&self, center: Vec2, radius: f32, exclude: Option<usize>, out: &mut Vec<usize>) {
        out.clear();
        self.for_each_candidate(center, radius, |idx| {
            if Some(idx) != exclude {
                out.push(idx);
            }
        });
    }
}

fn validate_cell_size(cell_size: f32) -> Result<(), ConfigError> {
    if cell_size.is_finite() && cell_size > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidCellSize(cell_size))
    }
}
