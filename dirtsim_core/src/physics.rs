// Physics stepper — advances the grid by one fixed tick.
//
// The order of operations below is load-bearing: gravity must be applied
// before the pressure solve, which must run before integration, which must
// run before advection, and so on. Reordering changes the sim's output for
// a given seed. The clear-forces -> gather -> integrate -> advect shape
// is the same fixed tick-loop pattern used elsewhere in this crate,
// adapted here from a discrete-event update to a continuous cell-physics
// pass.

use crate::grid::Grid;
use crate::material::MaterialTable;
use crate::organism::OrganismManager;
use crate::types::{CellPos, Material};
use crate::config::PhysicsSettings;

/// A cell transferring from one position to another, reported to the
/// organism manager so owned cells keep their bidirectional map coherent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellTransfer {
    pub from: CellPos,
    pub to: CellPos,
}

fn is_ground(grid: &Grid, materials: &MaterialTable, pos: CellPos) -> bool {
    let Some(cell) = grid.at(pos) else { return false };
    materials.get(cell.material).is_solid && cell.fill_ratio >= 0.5
}

/// Clear every cell's `pending_force` accumulator. Must run before any
/// caller (scenario hooks, tree/duck brain updates) adds forces for the
/// tick, and therefore strictly before `step` below — callers own the
/// ordering: `clear_forces`, then organism updates, then `step`.
pub fn clear_forces(grid: &mut Grid) {
    let positions: Vec<CellPos> = grid.positions().collect();
    for pos in positions {
        if let Some(cell) = grid.at_mut(pos) {
            cell.pending_force = [0.0, 0.0];
        }
    }
    grid.debug_clear_forces();
}

/// Run one fixed physics tick over `grid`. Returns the set of organism-owned
/// cells that transferred position this tick, for the caller to forward to
/// `OrganismManager::notify_transfers`.
///
/// Does *not* clear `pending_force` — the caller must call `clear_forces`
/// before gathering external forces (scenario ticks, tree/duck brain
/// output) and before calling this function, so that those forces survive
/// into the gravity/integration passes below instead of being wiped.
pub fn step(
    grid: &mut Grid,
    materials: &MaterialTable,
    settings: &PhysicsSettings,
    organisms: &OrganismManager,
    dt: f32,
) -> Vec<CellTransfer> {
    let positions: Vec<CellPos> = grid.positions().collect();

    // 2b. Bone forces, added on top of whatever external forces the caller
    // already gathered into pending_force before calling this function.
    organisms.apply_bone_forces(grid);

    // 3. Gravity.
    for &pos in &positions {
        if let Some(cell) = grid.at_mut(pos) {
            if !cell.is_empty() {
                let weight = materials.get(cell.material).density_class.weight();
                cell.pending_force[1] += settings.gravity * weight;
            }
        }
    }

    // 4. Pressure field: iterative column-stacking Gauss-Seidel sweep.
    // Open question (see design notes): the exact water-column algorithm is
    // underspecified beyond "a sweep is acceptable" — this implementation
    // accumulates weight from cells above within the same column, relaxed
    // over several iterations so a stack of several liquid cells converges
    // to a linear pressure gradient rather than jumping in one step.
    for _ in 0..settings.pressure_iterations {
        for &pos in &positions {
            let above = CellPos::new(pos.x, pos.y - 1);
            let above_pressure = grid.at(above).map(|c| c.pressure).unwrap_or(0.0);
            if let Some(cell) = grid.at_mut(pos) {
                if !cell.is_empty() {
                    let weight = materials.get(cell.material).density_class.weight();
                    cell.pressure = (above_pressure + weight * cell.fill_ratio) * settings.pressure_scale;
                } else {
                    cell.pressure = 0.0;
                }
            }
        }
    }
    for &pos in &positions {
        let left = grid.at(CellPos::new(pos.x - 1, pos.y)).map(|c| c.pressure).unwrap_or(0.0);
        let right = grid.at(CellPos::new(pos.x + 1, pos.y)).map(|c| c.pressure).unwrap_or(0.0);
        let up = grid.at(CellPos::new(pos.x, pos.y - 1)).map(|c| c.pressure).unwrap_or(0.0);
        let down = grid.at(CellPos::new(pos.x, pos.y + 1)).map(|c| c.pressure).unwrap_or(0.0);
        if let Some(cell) = grid.at_mut(pos) {
            cell.pressure_gradient = [(right - left) * 0.5, (down - up) * 0.5];
        }
    }

    // 5. Integrate velocity, apply damping, clamp speed.
    for &pos in &positions {
        if let Some(cell) = grid.at_mut(pos) {
            if cell.is_empty() {
                continue;
            }
            let pressure_force = [-cell.pressure_gradient[0], -cell.pressure_gradient[1]];
            cell.velocity[0] += (cell.pending_force[0] + pressure_force[0]) * dt;
            cell.velocity[1] += (cell.pending_force[1] + pressure_force[1]) * dt;
            let damping = materials.get(cell.material).damping * (1.0 - settings.air_resistance.clamp(0.0, 1.0));
            cell.velocity[0] *= damping;
            cell.velocity[1] *= damping;
            let speed = (cell.velocity[0] * cell.velocity[0] + cell.velocity[1] * cell.velocity[1]).sqrt();
            if speed > settings.max_speed {
                let scale = settings.max_speed / speed;
                cell.velocity[0] *= scale;
                cell.velocity[1] *= scale;
            }
        }
    }

    // 6 & 7. Advect COM; transfer when it exits [-0.5, 0.5]^2.
    let mut transfers = Vec::new();
    for &pos in &positions {
        let Some(cell) = grid.at(pos) else { continue };
        if cell.is_empty() {
            continue;
        }
        let mut com = [
            cell.com[0] + cell.velocity[0] * dt,
            cell.com[1] + cell.velocity[1] * dt,
        ];
        let material = cell.material;
        let fill = cell.fill_ratio;
        let velocity = cell.velocity;

        let mut dx = 0i32;
        let mut dy = 0i32;
        if com[0] > 0.5 {
            dx = 1;
        } else if com[0] < -0.5 {
            dx = -1;
        }
        if com[1] > 0.5 {
            dy = 1;
        } else if com[1] < -0.5 {
            dy = -1;
        }

        if dx == 0 && dy == 0 {
            if let Some(c) = grid.at_mut(pos) {
                c.com = com;
            }
            continue;
        }

        let target = CellPos::new(pos.x + dx, pos.y + dy);
        let owner = organisms.owner_of(pos);
        let can_enter = match grid.at(target) {
            None => false,
            Some(t) => {
                t.is_empty()
                    || (t.material == material && t.fill_ratio < 1.0)
            }
        };

        if can_enter {
            com[0] -= dx as f32;
            com[1] -= dy as f32;
            if let Some(t) = grid.at_mut(target) {
                t.material = material;
                t.fill_ratio = (t.fill_ratio + fill).min(1.0);
                t.com = com;
                t.velocity = velocity;
            }
            grid.clear(pos);
            if owner.is_some() {
                transfers.push(CellTransfer { from: pos, to: target });
            }
        } else {
            // Transfer dropped: zero velocity along the blocked axis, clamp
            // COM back inside range.
            if let Some(c) = grid.at_mut(pos) {
                if dx != 0 {
                    c.velocity[0] = 0.0;
                    com[0] = com[0].clamp(-0.5, 0.5);
                }
                if dy != 0 {
                    c.velocity[1] = 0.0;
                    com[1] = com[1].clamp(-0.5, 0.5);
                }
                c.com = com;
            }
        }
    }

    // 8. Swap semantics: heavier material above lighter, neither owned.
    if settings.swap_enabled {
        for &pos in &positions {
            let below = CellPos::new(pos.x, pos.y + 1);
            if !grid.in_bounds(below) {
                continue;
            }
            if organisms.owner_of(pos).is_some() || organisms.owner_of(below).is_some() {
                continue;
            }
            let (Some(top), Some(bottom)) = (grid.at(pos), grid.at(below)) else { continue };
            if top.is_empty() || top.material == bottom.material {
                continue;
            }
            let top_weight = materials.get(top.material).density_class.weight();
            let bottom_weight = materials.get(bottom.material).density_class.weight();
            if top_weight > bottom_weight {
                let top_copy = *top;
                let bottom_copy = *bottom;
                if let Some(c) = grid.at_mut(pos) {
                    *c = bottom_copy;
                }
                if let Some(c) = grid.at_mut(below) {
                    *c = top_copy;
                }
            }
        }
    }

    // 9. Friction against ground.
    for &pos in &positions {
        let below = CellPos::new(pos.x, pos.y + 1);
        let grounded = is_ground(grid, materials, below);
        if let Some(cell) = grid.at_mut(pos) {
            if grounded && !cell.is_empty() {
                let friction = settings.friction_strength * dt;
                let vx = cell.velocity[0];
                cell.velocity[0] = if vx.abs() <= friction { 0.0 } else { vx - friction * vx.signum() };
            }
        }
    }

    // 10. COM-cohesion: pull COM toward the cell center when close to a
    // same-organism neighbor.
    for &pos in &positions {
        let Some(owner) = organisms.owner_of(pos) else { continue };
        let Some(cell) = grid.at(pos) else { continue };
        let com_mag = (cell.com[0] * cell.com[0] + cell.com[1] * cell.com[1]).sqrt();
        if com_mag >= settings.com_cohesion_range || com_mag < 1e-6 {
            continue;
        }
        let neighbors = pos.face_neighbors();
        let same_organism_nearby = neighbors
            .iter()
            .any(|&n| organisms.owner_of(n) == Some(owner));
        if same_organism_nearby {
            let restore = [
                -cell.com[0] * settings.com_cohesion_strength,
                -cell.com[1] * settings.com_cohesion_strength,
            ];
            if let Some(c) = grid.at_mut(pos) {
                c.add_pending_force(restore);
            }
        }
    }

    // 11. Bitmap/neighborhood cache coherence is maintained incrementally by
    // `Grid::replace_material`/`clear`/`add_material`, so there is nothing
    // left to rebuild here.

    transfers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::organism::OrganismManager;

    #[test]
    fn gravity_pulls_a_loose_cell_down() {
        let mut grid = Grid::new(5, 5);
        let materials = MaterialTable::default();
        let settings = PhysicsSettings::default();
        let organisms = OrganismManager::new();
        grid.replace_material(CellPos::new(2, 2), Material::Sand, 1.0);

        for _ in 0..5 {
            clear_forces(&mut grid);
            step(&mut grid, &materials, &settings, &organisms, 1.0 / 60.0);
        }
        let cell = grid.at(CellPos::new(2, 2)).unwrap();
        assert!(cell.velocity[1] > 0.0, "sand should be accelerating downward");
    }

    #[test]
    fn air_cell_is_never_touched() {
        let mut grid = Grid::new(4, 4);
        let materials = MaterialTable::default();
        let settings = PhysicsSettings::default();
        let organisms = OrganismManager::new();
        clear_forces(&mut grid);
        step(&mut grid, &materials, &settings, &organisms, 1.0 / 60.0);
        for pos in grid.positions() {
            let cell = grid.at(pos).unwrap();
            assert!(cell.is_empty());
            assert_eq!(cell.velocity, [0.0, 0.0]);
        }
    }

    #[test]
    fn immovable_metal_does_not_fall_through_wall() {
        let mut grid = Grid::new(3, 3);
        let materials = MaterialTable::default();
        let settings = PhysicsSettings::default();
        let organisms = OrganismManager::new();
        grid.replace_material(CellPos::new(1, 1), Material::Sand, 1.0);
        grid.replace_material(CellPos::new(1, 2), Material::Wall, 1.0);

        for _ in 0..200 {
            clear_forces(&mut grid);
            step(&mut grid, &materials, &settings, &organisms, 1.0 / 60.0);
        }
        assert_eq!(grid.at(CellPos::new(1, 2)).unwrap().material, Material::Wall);
    }

    #[test]
    fn com_stays_in_bounds() {
        let mut grid = Grid::new(5, 5);
        let materials = MaterialTable::default();
        let settings = PhysicsSettings::default();
        let organisms = OrganismManager::new();
        grid.replace_material(CellPos::new(2, 0), Material::Water, 1.0);

        for _ in 0..300 {
            clear_forces(&mut grid);
            step(&mut grid, &materials, &settings, &organisms, 1.0 / 60.0);
            for pos in grid.positions() {
                let cell = grid.at(pos).unwrap();
                assert!(cell.com[0] >= -0.5 && cell.com[0] <= 0.5);
                assert!(cell.com[1] >= -0.5 && cell.com[1] <= 0.5);
            }
        }
    }
}
