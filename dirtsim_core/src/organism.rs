// Organism model — the cell<->organism bidirectional map, bones, and the
// manager that owns every organism's lifecycle.
//
// An owning struct holds a `BTreeMap<Id, Entity>` plus a reverse index from
// cell position back to owning organism. The bone force formula in
// `apply_bone_forces` follows a Hookean-spring-plus-damping shape, applying
// forces directly each tick rather than iterating to a static convergence
// point.

use crate::grid::Grid;
use crate::types::{CellPos, HingeEnd, Material, OrganismId, OrganismKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A Hookean spring connecting two cells of the same organism.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bone {
    pub endpoint_a: CellPos,
    pub endpoint_b: CellPos,
    pub rest_distance: f32,
    pub stiffness: f32,
    pub hinge_end: HingeEnd,
    pub rotational_damping: f32,
}

/// Cap on a single bone's contribution to `pending_force`, so a badly
/// stretched bone can't inject an unbounded impulse in one tick.
pub const MAX_BONE_FORCE: f32 = 500.0;

/// Per-reinforcement stiffness multiplier for `ReinforceCell`.
pub const REINFORCE_STIFFNESS_FACTOR: f32 = 1.5;

/// Ceiling on a bone's stiffness, so repeated reinforcement can't make a
/// bone infinitely rigid.
pub const REINFORCE_MAX_STIFFNESS: f32 = 40_000.0;

/// Errors the organism manager's API can return. These map onto the wire
/// error kinds in `dirtsim_protocol`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum OrganismError {
    SpawnOccupied,
    InvalidCoordinates,
    NotFound,
}

/// A long-lived entity owning one or more cells.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Organism {
    pub id: OrganismId,
    pub kind: OrganismKind,
    pub cells: BTreeSet<CellPos>,
    pub bones: Vec<Bone>,
    pub anchor_cell: CellPos,
    pub facing: [f32; 2],
    pub age_seconds: f32,
    pub active: bool,
}

impl Organism {
    fn new(id: OrganismId, kind: OrganismKind, anchor: CellPos) -> Self {
        let mut cells = BTreeSet::new();
        cells.insert(anchor);
        Self {
            id,
            kind,
            cells,
            bones: Vec::new(),
            anchor_cell: anchor,
            facing: [1.0, 0.0],
            age_seconds: 0.0,
            active: true,
        }
    }
}

/// Material-pair stiffness lookup used when a new bone is created. A single
/// symmetric lookup keyed by the two endpoint materials' solidity, taking
/// the harmonic mean of their base stiffness so the weaker material
/// dominates.
pub fn bone_stiffness(a: Material, b: Material) -> f32 {
    let base = |m: Material| -> f32 {
        match m {
            Material::Wood => 8000.0,
            Material::Root => 6000.0,
            Material::Leaf => 200.0,
            Material::Seed => 4000.0,
            _ => 1000.0,
        }
    };
    // Harmonic mean: a single weak link dominates, matching how a real
    // spring-network softens at its weakest joint.
    let (sa, sb) = (base(a), base(b));
    2.0 * sa * sb / (sa + sb)
}

/// Owns every organism and the bidirectional cell<->organism map.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OrganismManager {
    organisms: BTreeMap<OrganismId, Organism>,
    reverse_map: BTreeMap<CellPos, OrganismId>,
    next_id: u32,
}

impl OrganismManager {
    pub fn new() -> Self {
        Self {
            organisms: BTreeMap::new(),
            reverse_map: BTreeMap::new(),
            next_id: 1,
        }
    }

    fn allocate_id(&mut self) -> OrganismId {
        let id = OrganismId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Plant a tree seed at `pos`, owning that cell.
    pub fn create_tree(&mut self, grid: &mut Grid, pos: CellPos) -> Result<OrganismId, OrganismError> {
        self.create_organism(grid, pos, OrganismKind::Tree, Material::Seed)
    }

    /// Drop a duck body at `pos`, owning that cell.
    pub fn create_duck(&mut self, grid: &mut Grid, pos: CellPos) -> Result<OrganismId, OrganismError> {
        self.create_organism(grid, pos, OrganismKind::Duck, Material::Wood)
    }

    fn create_organism(
        &mut self,
        grid: &mut Grid,
        pos: CellPos,
        kind: OrganismKind,
        material: Material,
    ) -> Result<OrganismId, OrganismError> {
        if !grid.in_bounds(pos) {
            return Err(OrganismError::InvalidCoordinates);
        }
        if self.reverse_map.contains_key(&pos) {
            return Err(OrganismError::SpawnOccupied);
        }
        let cell = grid.at(pos).ok_or(OrganismError::InvalidCoordinates)?;
        if cell.material != Material::Air {
            return Err(OrganismError::SpawnOccupied);
        }

        let id = self.allocate_id();
        grid.replace_material(pos, material, 1.0);
        self.reverse_map.insert(pos, id);
        self.organisms.insert(id, Organism::new(id, kind, pos));
        Ok(id)
    }

    /// Clear every owned cell to Air and deallocate the organism.
    pub fn remove_from_world(&mut self, grid: &mut Grid, id: OrganismId) -> Result<(), OrganismError> {
        let organism = self.organisms.remove(&id).ok_or(OrganismError::NotFound)?;
        for pos in &organism.cells {
            self.reverse_map.remove(pos);
            grid.clear(*pos);
        }
        Ok(())
    }

    pub fn get(&self, id: OrganismId) -> Option<&Organism> {
        self.organisms.get(&id)
    }

    pub fn get_mut(&mut self, id: OrganismId) -> Option<&mut Organism> {
        self.organisms.get_mut(&id)
    }

    pub fn owner_of(&self, pos: CellPos) -> Option<OrganismId> {
        self.reverse_map.get(&pos).copied()
    }

    /// Add a newly-grown cell to an organism's set, updating both sides of
    /// the map.
    pub fn add_cell_to_organism(&mut self, id: OrganismId, pos: CellPos) -> Result<(), OrganismError> {
        let organism = self.organisms.get_mut(&id).ok_or(OrganismError::NotFound)?;
        organism.cells.insert(pos);
        self.reverse_map.insert(pos, id);
        Ok(())
    }

    pub fn remove_cells(&mut self, id: OrganismId, positions: &[CellPos]) -> Result<(), OrganismError> {
        let organism = self.organisms.get_mut(&id).ok_or(OrganismError::NotFound)?;
        for pos in positions {
            organism.cells.remove(pos);
            self.reverse_map.remove(pos);
        }
        Ok(())
    }

    /// Apply a batch of `{from, to, id}` cell-transfer notifications: update
    /// the organism's cell set, the reverse map, the anchor if it moved, and
    /// every bone endpoint equal to `from`.
    pub fn notify_transfers(&mut self, events: &[(CellPos, CellPos, OrganismId)]) {
        for &(from, to, id) in events {
            let Some(organism) = self.organisms.get_mut(&id) else {
                continue;
            };
            organism.cells.remove(&from);
            organism.cells.insert(to);
            self.reverse_map.remove(&from);
            self.reverse_map.insert(to, id);
            if organism.anchor_cell == from {
                organism.anchor_cell = to;
            }
            for bone in &mut organism.bones {
                if bone.endpoint_a == from {
                    bone.endpoint_a = to;
                }
                if bone.endpoint_b == from {
                    bone.endpoint_b = to;
                }
            }
        }
    }

    /// Create a bone between two existing cells of the same organism.
    pub fn add_bone(
        &mut self,
        id: OrganismId,
        a: CellPos,
        b: CellPos,
        material_a: Material,
        material_b: Material,
    ) -> Result<(), OrganismError> {
        let organism = self.organisms.get_mut(&id).ok_or(OrganismError::NotFound)?;
        let rest_distance = (((a.x - b.x).pow(2) + (a.y - b.y).pow(2)) as f32).sqrt();
        organism.bones.push(Bone {
            endpoint_a: a,
            endpoint_b: b,
            rest_distance,
            stiffness: bone_stiffness(material_a, material_b),
            hinge_end: HingeEnd::None,
            rotational_damping: 0.0,
        });
        Ok(())
    }

    /// Strengthen every bone with an endpoint at `pos`, multiplying its
    /// stiffness by `REINFORCE_STIFFNESS_FACTOR` and clamping to
    /// `REINFORCE_MAX_STIFFNESS`. A no-op (not an error) if `pos` has no
    /// incident bones.
    pub fn reinforce_bones_at(&mut self, id: OrganismId, pos: CellPos) -> Result<(), OrganismError> {
        let organism = self.organisms.get_mut(&id).ok_or(OrganismError::NotFound)?;
        for bone in &mut organism.bones {
            if bone.endpoint_a == pos || bone.endpoint_b == pos {
                bone.stiffness = (bone.stiffness * REINFORCE_STIFFNESS_FACTOR).min(REINFORCE_MAX_STIFFNESS);
            }
        }
        Ok(())
    }

    /// Apply every organism's bone forces to the grid's cells.
    ///
    /// World-space endpoint position: `cell_index + 0.5 + com * 0.5` (the
    /// cell-center offset plus half the sub-cell center-of-mass).
    pub fn apply_bone_forces(&self, grid: &mut Grid) {
        for organism in self.organisms.values() {
            for bone in &organism.bones {
                let (Some(cell_a), Some(cell_b)) =
                    (grid.at(bone.endpoint_a), grid.at(bone.endpoint_b))
                else {
                    continue;
                };
                let pa = [
                    bone.endpoint_a.x as f32 + 0.5 + cell_a.com[0] * 0.5,
                    bone.endpoint_a.y as f32 + 0.5 + cell_a.com[1] * 0.5,
                ];
                let pb = [
                    bone.endpoint_b.x as f32 + 0.5 + cell_b.com[0] * 0.5,
                    bone.endpoint_b.y as f32 + 0.5 + cell_b.com[1] * 0.5,
                ];
                let delta = [pb[0] - pa[0], pb[1] - pa[1]];
                let dist = (delta[0] * delta[0] + delta[1] * delta[1]).sqrt();
                if dist < 1e-6 {
                    continue;
                }
                let dir = [delta[0] / dist, delta[1] / dist];
                let err = dist - bone.rest_distance;
                let mut spring = [bone.stiffness * err * dir[0], bone.stiffness * err * dir[1]];

                let rel_vel = [
                    cell_b.velocity[0] - cell_a.velocity[0],
                    cell_b.velocity[1] - cell_a.velocity[1],
                ];
                let along = rel_vel[0] * dir[0] + rel_vel[1] * dir[1];
                let damping = bone.stiffness * 0.01 * along;
                spring[0] += damping * dir[0];
                spring[1] += damping * dir[1];

                let mag = (spring[0] * spring[0] + spring[1] * spring[1]).sqrt();
                if mag > MAX_BONE_FORCE {
                    let scale = MAX_BONE_FORCE / mag;
                    spring[0] *= scale;
                    spring[1] *= scale;
                }

                // Equal and opposite: `b` is pulled along `dir`, `a` against it.
                // A hinge endpoint does not receive the spring force, only the
                // non-pivot side does, plus its tangential damping term.
                match bone.hinge_end {
                    HingeEnd::None => {
                        if let Some(c) = grid.at_mut(bone.endpoint_b) {
                            c.add_pending_force([-spring[0], -spring[1]]);
                        }
                        if let Some(c) = grid.at_mut(bone.endpoint_a) {
                            c.add_pending_force(spring);
                        }
                    }
                    HingeEnd::A => {
                        let tangent = [-dir[1], dir[0]];
                        let tangential_vel = rel_vel[0] * tangent[0] + rel_vel[1] * tangent[1];
                        let damp = bone.rotational_damping * tangential_vel;
                        if let Some(c) = grid.at_mut(bone.endpoint_b) {
                            c.add_pending_force([-spring[0] - damp * tangent[0], -spring[1] - damp * tangent[1]]);
                        }
                    }
                    HingeEnd::B => {
                        let tangent = [-dir[1], dir[0]];
                        let tangential_vel = rel_vel[0] * tangent[0] + rel_vel[1] * tangent[1];
                        let damp = bone.rotational_damping * tangential_vel;
                        if let Some(c) = grid.at_mut(bone.endpoint_a) {
                            c.add_pending_force([spring[0] - damp * tangent[0], spring[1] - damp * tangent[1]]);
                        }
                    }
                }
            }
        }
    }

    /// Iterate organisms in deterministic ascending-id order.
    pub fn for_each_organism(&self, mut f: impl FnMut(&Organism)) {
        for organism in self.organisms.values() {
            f(organism);
        }
    }

    pub fn len(&self) -> usize {
        self.organisms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.organisms.is_empty()
    }

    /// Check the bidirectional map invariant: every cell in the reverse map
    /// belongs to that organism's set, and vice versa. Intended for tests
    /// and debug assertions, not the hot path.
    pub fn check_invariant(&self) -> bool {
        for (pos, id) in &self.reverse_map {
            match self.organisms.get(id) {
                Some(o) if o.cells.contains(pos) => {}
                _ => return false,
            }
        }
        for organism in self.organisms.values() {
            for pos in &organism.cells {
                if self.reverse_map.get(pos) != Some(&organism.id) {
                    return false;
                }
            }
        }
        true
    }
}
