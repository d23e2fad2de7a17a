//! Uniform spatial partition grid
//!
//! Broad-phase index over the play-field. Every tracked object lives in exactly
//! one cell, `floor(position / cell_size)`, clamped to the border cells when the
//! position leaves the world. Queries walk the covered cells in row-major order.

use glam::Vec2;

#[derive(Debug, Clone)]
pub struct SpatialGrid<H> {
    cell_size: Vec2,
    columns: usize,
    rows: usize,
    cells: Vec<Vec<H>>,
}

impl<H: Copy + PartialEq> SpatialGrid<H> {
    /// Derive a grid that covers `world_width` x `world_height`
    pub fn setup(world_width: f32, world_height: f32, cell_width: f32, cell_height: f32) -> Self {
        let columns = ((world_width / cell_width).ceil() as usize).max(1);
        let rows = ((world_height / cell_height).ceil() as usize).max(1);
        Self {
            cell_size: Vec2::new(cell_width, cell_height),
            columns,
            rows,
            cells: vec![Vec::new(); columns * rows],
        }
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Cell coordinate for a world position, clamped to the grid
    pub fn cell_of(&self, pos: Vec2) -> (usize, usize) {
        (
            Self::clamp_axis(pos.x / self.cell_size.x, self.columns),
            Self::clamp_axis(pos.y / self.cell_size.y, self.rows),
        )
    }

    fn clamp_axis(scaled: f32, count: usize) -> usize {
        // NaN and negatives both land in cell 0
        if scaled.is_nan() || scaled < 0.0 {
            return 0;
        }
        (scaled.floor() as usize).min(count - 1)
    }

    #[inline]
    fn cell_index(&self, (x, y): (usize, usize)) -> usize {
        y * self.columns + x
    }

    pub fn add(&mut self, pos: Vec2, handle: H) {
        let idx = self.cell_index(self.cell_of(pos));
        self.cells[idx].push(handle);
    }

    /// Remove `handle` from the cell `pos` maps to. `pos` must be the position
    /// the handle was last inserted under. Returns false if it was not there.
    pub fn remove(&mut self, pos: Vec2, handle: H) -> bool {
        let idx = self.cell_index(self.cell_of(pos));
        let cell = &mut self.cells[idx];
        match cell.iter().position(|h| *h == handle) {
            Some(i) => {
                cell.swap_remove(i);
                true
            }
            None => false,
        }
    }

    /// Move `handle` from the cell of `old` to the cell of `new`
    pub fn update(&mut self, old: Vec2, new: Vec2, handle: H) {
        let from = self.cell_of(old);
        let to = self.cell_of(new);
        if from == to {
            return;
        }
        let removed = self.remove(old, handle);
        debug_assert!(removed, "grid update for an untracked handle");
        let idx = self.cell_index(to);
        self.cells[idx].push(handle);
    }

    /// Visit every handle stored in a cell that intersects `[min, max]`
    pub fn for_each_in_area(&self, min: Vec2, max: Vec2, mut f: impl FnMut(H)) {
        let (x0, y0) = self.cell_of(min.min(max));
        let (x1, y1) = self.cell_of(min.max(max));
        for y in y0..=y1 {
            for x in x0..=x1 {
                for &handle in &self.cells[self.cell_index((x, y))] {
                    f(handle);
                }
            }
        }
    }

    /// Number of tracked handles
    pub fn len(&self) -> usize {
        self.cells.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(Vec::is_empty)
    }

    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.clear();
        }
    }
}
