// The 2-D cell grid — DirtSim's spatial substrate.
//
// `Grid` is a dense row-major array of `Cell`s. Alongside it lives
// `CellBitmap`, an 8x8-block-packed occupancy bitmap that lets the physics
// stepper and the light pipeline skip whole blocks of empty space without
// touching every cell. A lazily-rebuilt 3x3 material neighborhood cache
// (4 bits per cell, 9 cells packed into one `u64`) serves the same purpose
// for material-aware scans.
//
// Mutations to the grid **must** keep the bitmap and neighborhood cache
// coherent in the same call — `replace_material`/`add_material` do this
// internally so callers never observe a stale view.
//
// See also: `types.rs` for `CellPos`/`Material`, `material.rs` for the
// static per-material property table, `physics.rs` for the stepper that
// reads and writes this grid every tick.
//
// **Critical constraint: determinism.** No randomness, no wall-clock time.
// Grid mutation is a pure function of explicit inputs.

use crate::types::{CellPos, Material};

/// One cell of the world: a material kind, how full it is, its sub-cell
/// center of mass, velocity, pressure field, and the force accumulator the
/// physics stepper fills in and drains every tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cell {
    pub material: Material,
    pub fill_ratio: f32,
    pub com: [f32; 2],
    pub velocity: [f32; 2],
    pub pressure: f32,
    pub pressure_gradient: [f32; 2],
    pub pending_force: [f32; 2],
    /// Scenario-supplied override of how this cell should be rendered,
    /// independent of its physical material.
    pub render_as: Option<Material>,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            material: Material::Air,
            fill_ratio: 0.0,
            com: [0.0, 0.0],
            velocity: [0.0, 0.0],
            pressure: 0.0,
            pressure_gradient: [0.0, 0.0],
            pending_force: [0.0, 0.0],
            render_as: None,
        }
    }
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        self.material == Material::Air
    }

    pub fn add_pending_force(&mut self, force: [f32; 2]) {
        self.pending_force[0] += force[0];
        self.pending_force[1] += force[1];
    }
}

// ---------------------------------------------------------------------------
// Occupancy bitmap
// ---------------------------------------------------------------------------

pub const BLOCK_SIZE: i32 = 8;

/// 8x8-block-packed occupancy bitmap. One bit per cell; bit `y*8 + x` within
/// the cell's containing block gives a row-major layout (bit 0-7 is row 0,
/// bit 8-15 is row 1, and so on). A set bit means "empty" (Air).
#[derive(Clone, Debug)]
pub struct CellBitmap {
    width: i32,
    height: i32,
    blocks_x: i32,
    blocks_y: i32,
    blocks: Vec<u64>,
}

impl CellBitmap {
    pub fn new(width: i32, height: i32) -> Self {
        let blocks_x = (width + BLOCK_SIZE - 1) / BLOCK_SIZE;
        let blocks_y = (height + BLOCK_SIZE - 1) / BLOCK_SIZE;
        Self {
            width,
            height,
            blocks_x,
            blocks_y,
            blocks: vec![0u64; (blocks_x * blocks_y).max(0) as usize],
        }
    }

    fn cell_to_block_and_bit(&self, x: i32, y: i32) -> (usize, u32) {
        let bx = x / BLOCK_SIZE;
        let by = y / BLOCK_SIZE;
        let local_x = x % BLOCK_SIZE;
        let local_y = y % BLOCK_SIZE;
        let block_idx = (by * self.blocks_x + bx) as usize;
        let bit_idx = (local_y * BLOCK_SIZE + local_x) as u32;
        (block_idx, bit_idx)
    }

    fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && x < self.width && y < self.height
    }

    pub fn set(&mut self, x: i32, y: i32) {
        if !self.in_bounds(x, y) {
            return;
        }
        let (block, bit) = self.cell_to_block_and_bit(x, y);
        self.blocks[block] |= 1u64 << bit;
    }

    pub fn clear(&mut self, x: i32, y: i32) {
        if !self.in_bounds(x, y) {
            return;
        }
        let (block, bit) = self.cell_to_block_and_bit(x, y);
        self.blocks[block] &= !(1u64 << bit);
    }

    pub fn is_set(&self, x: i32, y: i32) -> bool {
        if !self.in_bounds(x, y) {
            return false;
        }
        let (block, bit) = self.cell_to_block_and_bit(x, y);
        (self.blocks[block] >> bit) & 1 != 0
    }

    fn block_index(&self, bx: i32, by: i32) -> Option<usize> {
        if bx < 0 || by < 0 || bx >= self.blocks_x || by >= self.blocks_y {
            None
        } else {
            Some((by * self.blocks_x + bx) as usize)
        }
    }

    /// `true` iff every cell in block `(bx, by)` is empty.
    pub fn is_block_all_set(&self, bx: i32, by: i32) -> bool {
        self.block_index(bx, by)
            .is_some_and(|i| self.blocks[i] == u64::MAX)
    }

    /// `true` iff every cell in block `(bx, by)` is occupied.
    pub fn is_block_all_clear(&self, bx: i32, by: i32) -> bool {
        self.block_index(bx, by).is_some_and(|i| self.blocks[i] == 0)
    }

    pub fn blocks_x(&self) -> i32 {
        self.blocks_x
    }

    pub fn blocks_y(&self) -> i32 {
        self.blocks_y
    }
}

// ---------------------------------------------------------------------------
// Grid
// ---------------------------------------------------------------------------

/// Dense row-major 2-D grid of cells, with a parallel occupancy bitmap and
/// lazily-rebuilt material neighborhood cache.
#[derive(Clone, Debug)]
pub struct Grid {
    width: i32,
    height: i32,
    cells: Vec<Cell>,
    empty_bitmap: CellBitmap,
    /// Packed 3x3 material neighborhood around each cell: 4 bits per cell,
    /// 9 cells (row-major, center last) in the low 36 bits. `None` entries
    /// are stale and rebuilt on next read.
    neighborhood_cache: Vec<Option<u64>>,
    /// Side-channel accumulator of forces applied this step, per cell.
    /// Never consulted by gameplay logic — diagnostics only.
    debug_forces: Vec<[f32; 2]>,
}

impl Grid {
    pub fn new(width: i32, height: i32) -> Self {
        let count = (width.max(0) * height.max(0)) as usize;
        Self {
            width,
            height,
            cells: vec![Cell::default(); count],
            empty_bitmap: CellBitmap::new(width, height),
            neighborhood_cache: vec![None; count],
            debug_forces: vec![[0.0, 0.0]; count],
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn in_bounds(&self, pos: CellPos) -> bool {
        pos.x >= 0 && pos.y >= 0 && pos.x < self.width && pos.y < self.height
    }

    fn index(&self, pos: CellPos) -> Option<usize> {
        if self.in_bounds(pos) {
            Some((pos.y * self.width + pos.x) as usize)
        } else {
            None
        }
    }

    pub fn at(&self, pos: CellPos) -> Option<&Cell> {
        self.index(pos).map(|i| &self.cells[i])
    }

    pub fn at_mut(&mut self, pos: CellPos) -> Option<&mut Cell> {
        match self.index(pos) {
            Some(i) => Some(&mut self.cells[i]),
            None => None,
        }
    }

    pub fn resize(&mut self, width: i32, height: i32) {
        *self = Grid::new(width, height);
    }

    /// Reset a cell to empty (Air, zero fill, zero motion).
    pub fn clear(&mut self, pos: CellPos) {
        if let Some(i) = self.index(pos) {
            self.cells[i] = Cell::default();
            self.mark_dirty(pos);
        }
    }

    /// Overwrite a cell's material and fill ratio outright.
    pub fn replace_material(&mut self, pos: CellPos, kind: Material, fill: f32) {
        if let Some(i) = self.index(pos) {
            self.cells[i].material = kind;
            self.cells[i].fill_ratio = fill.clamp(0.0, 1.0);
            self.mark_dirty(pos);
        }
    }

    /// Add `delta_fill` of `kind` to a cell. If the cell is currently Air,
    /// this adopts `kind` as the new material; if it already holds a
    /// different non-Air material, the call is a no-op (solids/liquids
    /// don't silently blend materials here — see `physics.rs` transfer
    /// semantics for the rules governing that).
    pub fn add_material(&mut self, pos: CellPos, kind: Material, delta_fill: f32) {
        let Some(i) = self.index(pos) else { return };
        let cell = &mut self.cells[i];
        if cell.material == Material::Air || cell.material == kind {
            cell.material = kind;
            cell.fill_ratio = (cell.fill_ratio + delta_fill).clamp(0.0, 1.0);
            if cell.fill_ratio == 0.0 {
                cell.material = Material::Air;
            }
            self.mark_dirty(pos);
        }
    }

    fn mark_dirty(&mut self, pos: CellPos) {
        let i = (pos.y * self.width + pos.x) as usize;
        if self.cells[i].is_empty() {
            self.empty_bitmap.set(pos.x, pos.y);
        } else {
            self.empty_bitmap.clear(pos.x, pos.y);
        }
        // Invalidate this cell's and its 8 neighbors' caches — each of
        // those neighbors' 3x3 windows includes the cell that changed.
        for dy in -1..=1 {
            for dx in -1..=1 {
                let np = CellPos::new(pos.x + dx, pos.y + dy);
                if let Some(ni) = self.index(np) {
                    self.neighborhood_cache[ni] = None;
                }
            }
        }
    }

    pub fn empty_bitmap(&self) -> &CellBitmap {
        &self.empty_bitmap
    }

    /// Packed 3x3 material neighborhood around `(x,y)`: 4 bits per cell,
    /// row-major (top-left first), rebuilt lazily after mutation.
    /// Out-of-bounds neighbors read as `Material::Wall` (treated as solid
    /// boundary, matching the physics stepper's edge-of-world behavior).
    pub fn neighborhood_3x3(&mut self, pos: CellPos) -> u64 {
        if let Some(i) = self.index(pos) {
            if let Some(cached) = self.neighborhood_cache[i] {
                return cached;
            }
            let packed = self.compute_neighborhood_3x3(pos);
            self.neighborhood_cache[i] = Some(packed);
            packed
        } else {
            self.compute_neighborhood_3x3(pos)
        }
    }

    fn compute_neighborhood_3x3(&self, pos: CellPos) -> u64 {
        let mut packed: u64 = 0;
        let mut slot = 0u32;
        for dy in -1..=1 {
            for dx in -1..=1 {
                let np = CellPos::new(pos.x + dx, pos.y + dy);
                let mat = self.at(np).map(|c| c.material).unwrap_or(Material::Wall);
                packed |= (mat as u64 & 0xF) << (slot * 4);
                slot += 1;
            }
        }
        packed
    }

    pub fn debug_add_force(&mut self, pos: CellPos, force: [f32; 2]) {
        if let Some(i) = self.index(pos) {
            self.debug_forces[i][0] += force[0];
            self.debug_forces[i][1] += force[1];
        }
    }

    pub fn debug_clear_forces(&mut self) {
        for f in &mut self.debug_forces {
            *f = [0.0, 0.0];
        }
    }

    pub fn debug_force_at(&self, pos: CellPos) -> Option<[f32; 2]> {
        self.index(pos).map(|i| self.debug_forces[i])
    }

    /// Iterate all in-bounds cell positions in row-major order.
    pub fn positions(&self) -> impl Iterator<Item = CellPos> + '_ {
        let width = self.width;
        let height = self.height;
        (0..height).flat_map(move |y| (0..width).map(move |x| CellPos::new(x, y)))
    }

    /// 2-D DDA (Amanatides & Woo) grid traversal from `from` to `to` (both
    /// sub-cell world coordinates). Calls `visit(pos)` for every cell
    /// strictly between the two endpoints' cells (the destination cell is
    /// not visited, so a light's target cell never self-occludes), stopping
    /// early if `visit` returns `false`.
    pub fn trace_line(&self, from: [f32; 2], to: [f32; 2], mut visit: impl FnMut(CellPos) -> bool) {
        let dir = [to[0] - from[0], to[1] - from[1]];
        let mut cell = [from[0].floor() as i32, from[1].floor() as i32];
        let end_cell = [to[0].floor() as i32, to[1].floor() as i32];

        let mut step = [0i32; 2];
        let mut t_max = [f32::INFINITY; 2];
        let mut t_delta = [f32::INFINITY; 2];

        for axis in 0..2 {
            if dir[axis] > 0.0 {
                step[axis] = 1;
                t_delta[axis] = 1.0 / dir[axis];
                t_max[axis] = ((cell[axis] as f32 + 1.0) - from[axis]) / dir[axis];
            } else if dir[axis] < 0.0 {
                step[axis] = -1;
                t_delta[axis] = 1.0 / (-dir[axis]);
                t_max[axis] = (from[axis] - cell[axis] as f32) / (-dir[axis]);
            }
        }

        loop {
            if cell == end_cell {
                return;
            }
            if !visit(CellPos::new(cell[0], cell[1])) {
                return;
            }
            let min_axis = if t_max[0] <= t_max[1] { 0 } else { 1 };
            if t_max[min_axis] > 1.0 {
                return;
            }
            cell[min_axis] += step[min_axis];
            t_max[min_axis] += t_delta[min_axis];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_grid_is_all_air_and_empty_bitmap_is_all_set() {
        let grid = Grid::new(4, 4);
        for pos in grid.positions() {
            assert!(grid.at(pos).unwrap().is_empty());
            assert!(grid.empty_bitmap().is_set(pos.x, pos.y));
        }
    }

    #[test]
    fn out_of_bounds_read_is_none_and_write_is_noop() {
        let mut grid = Grid::new(4, 4);
        assert!(grid.at(CellPos::new(-1, 0)).is_none());
        grid.replace_material(CellPos::new(100, 100), Material::Wood, 1.0);
    }

    #[test]
    fn replace_material_updates_bitmap() {
        let mut grid = Grid::new(4, 4);
        let pos = CellPos::new(2, 2);
        grid.replace_material(pos, Material::Wood, 1.0);
        assert!(!grid.empty_bitmap().is_set(pos.x, pos.y));
        assert_eq!(grid.at(pos).unwrap().material, Material::Wood);
        grid.clear(pos);
        assert!(grid.empty_bitmap().is_set(pos.x, pos.y));
    }

    #[test]
    fn block_all_set_and_all_clear() {
        let mut grid = Grid::new(16, 16);
        assert!(grid.empty_bitmap().is_block_all_set(0, 0));
        for y in 0..8 {
            for x in 0..8 {
                grid.replace_material(CellPos::new(x, y), Material::Wall, 1.0);
            }
        }
        assert!(grid.empty_bitmap().is_block_all_clear(0, 0));
        assert!(grid.empty_bitmap().is_block_all_set(1, 0));
    }

    #[test]
    fn neighborhood_cache_reflects_mutation() {
        let mut grid = Grid::new(5, 5);
        let center = CellPos::new(2, 2);
        let before = grid.neighborhood_3x3(center);
        grid.replace_material(CellPos::new(1, 1), Material::Metal, 1.0);
        let after = grid.neighborhood_3x3(center);
        assert_ne!(before, after);
    }

    #[test]
    fn out_of_bounds_neighbor_reads_as_wall() {
        let mut grid = Grid::new(4, 4);
        let packed = grid.neighborhood_3x3(CellPos::new(0, 0));
        // Top-left slot (0) is out of bounds -> Wall.
        let top_left = packed & 0xF;
        assert_eq!(top_left, Material::Wall as u64);
    }

    #[test]
    fn trace_line_does_not_visit_destination() {
        let grid = Grid::new(16, 16);
        let mut visited = Vec::new();
        grid.trace_line([0.5, 4.5], [8.5, 4.5], |pos| {
            visited.push(pos);
            true
        });
        assert!(!visited.contains(&CellPos::new(8, 4)));
        assert!(visited.contains(&CellPos::new(0, 4)));
    }

    #[test]
    fn trace_line_stops_early_when_visitor_returns_false() {
        let grid = Grid::new(16, 16);
        let mut count = 0;
        grid.trace_line([0.5, 0.5], [10.5, 0.5], |_| {
            count += 1;
            count < 2
        });
        assert_eq!(count, 2);
    }

    #[test]
    fn add_material_adopts_air_cell_and_clears_on_drain() {
        let mut grid = Grid::new(4, 4);
        let pos = CellPos::new(1, 1);
        grid.add_material(pos, Material::Water, 0.6);
        assert_eq!(grid.at(pos).unwrap().material, Material::Water);
        grid.add_material(pos, Material::Water, -0.6);
        assert!(grid.at(pos).unwrap().is_empty());
    }
}
