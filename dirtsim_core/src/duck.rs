// Duck behavior: ground detection, brain-driven movement, jump impulses,
// facing, sparkle particles, and handheld-light pitch dynamics. A single
// per-entity per-tick `update` method, driving continuous force-based
// movement against the cell grid's physics model rather than discrete
// nav-graph movement.

use crate::brain::DuckBrain;
use crate::grid::Grid;
use crate::material::MaterialTable;
use crate::organism::OrganismManager;
use crate::types::{CellPos, Material, OrganismId};
use dirtsim_prng::SimRng;
use serde::{Deserialize, Serialize};

const WALK_FORCE: f32 = 40.0;
const AIR_STEER_SAME: f32 = 0.15;
const AIR_STEER_OPPOSING: f32 = 0.30;
const JUMP_FORCE: f32 = 12.0;
const JUMP_COOLDOWN_SECONDS: f32 = 0.5;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum JumpOutcome {
    Jumped,
    Cooldown,
    NotGrounded,
}

/// A single sparkle particle the duck trails behind it.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Sparkle {
    pub pos: [f32; 2],
    pub velocity: [f32; 2],
    pub age: f32,
}

/// A light the duck carries, whose pitch follows damped rotational dynamics
/// with hysteresis shutoff.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct HandheldLight {
    pub pitch: f32,
    pub angular_velocity: f32,
    pub lit: bool,
    pub shutoff_angle: f32,
    pub recovery_angle: f32,
}

impl Default for HandheldLight {
    fn default() -> Self {
        Self {
            pitch: 0.0,
            angular_velocity: 0.0,
            lit: true,
            shutoff_angle: 1.2,
            recovery_angle: 0.8,
        }
    }
}

impl HandheldLight {
    /// Advance pitch dynamics by `dt`: gravity torque, acceleration
    /// pseudo-force, a corrective torque toward horizontal, angular
    /// damping, clamped to +/- pi/2. Shuts off once drooped past
    /// `shutoff_angle`, and only relights once recovered past
    /// `recovery_angle` (hysteresis requires `shutoff > recovery`).
    pub fn update(&mut self, acceleration: [f32; 2], dt: f32) {
        const GRAVITY_TORQUE: f32 = 2.0;
        const ACCEL_TORQUE_SCALE: f32 = 0.1;
        const CORRECTIVE_STRENGTH: f32 = 1.5;
        const ANGULAR_DAMPING: f32 = 0.8;

        let gravity_term = GRAVITY_TORQUE * self.pitch.cos();
        let accel_term = ACCEL_TORQUE_SCALE * acceleration[0];
        let corrective = -CORRECTIVE_STRENGTH * self.pitch;

        self.angular_velocity += (gravity_term + accel_term + corrective) * dt;
        self.angular_velocity *= 1.0 - ANGULAR_DAMPING * dt;
        self.pitch += self.angular_velocity * dt;
        self.pitch = self.pitch.clamp(-std::f32::consts::FRAC_PI_2, std::f32::consts::FRAC_PI_2);

        if self.lit && self.pitch.abs() > self.shutoff_angle {
            self.lit = false;
        } else if !self.lit && self.pitch.abs() < self.recovery_angle {
            self.lit = true;
        }
    }
}

/// Per-organism duck state.
#[derive(Serialize, Deserialize)]
pub struct Duck {
    pub organism_id: OrganismId,
    #[serde(skip, default = "default_brain")]
    pub brain: Box<dyn DuckBrain + Send + Sync>,
    pub on_ground: bool,
    pub jump_cooldown: f32,
    pub sparkles: Vec<Sparkle>,
    pub handheld_light: Option<HandheldLight>,
}

fn default_brain() -> Box<dyn DuckBrain + Send + Sync> {
    Box::new(crate::brain::WallBouncingDuckBrain)
}

impl Duck {
    pub fn new(organism_id: OrganismId, brain: Box<dyn DuckBrain + Send + Sync>) -> Self {
        Self {
            organism_id,
            brain,
            on_ground: false,
            jump_cooldown: 0.0,
            sparkles: Vec::new(),
            handheld_light: None,
        }
    }

    fn ground_below(grid: &Grid, materials: &MaterialTable, pos: CellPos) -> bool {
        let below = CellPos::new(pos.x, pos.y + 1);
        match grid.at(below) {
            Some(cell) => {
                (!cell.is_empty() && cell.fill_ratio >= 0.5)
                    || (materials.get(cell.material).is_solid && cell.velocity[1].abs() < 1e-3)
            }
            None => false,
        }
    }

    /// One tick of duck behavior. Aborts (returns `false`) if the anchor's
    /// invariants are violated: that is a fatal bug, not an expected
    /// outcome, so the caller should treat a `false` return as cause to
    /// remove the organism and log a critical.
    pub fn update(
        &mut self,
        grid: &mut Grid,
        materials: &MaterialTable,
        organisms: &OrganismManager,
        rng: &mut SimRng,
        dt: f32,
    ) -> bool {
        let Some(organism) = organisms.get(self.organism_id) else { return false };
        let anchor = organism.anchor_cell;
        if organisms.owner_of(anchor) != Some(self.organism_id) {
            return false;
        }
        let Some(cell) = grid.at(anchor) else { return false };
        if cell.material != Material::Wood {
            return false;
        }
        let facing = organism.facing;
        let velocity = cell.velocity;

        self.on_ground = Self::ground_below(grid, materials, anchor);

        let input = self.brain.think(self.on_ground, facing, dt);

        let mut force = [0.0, 0.0];
        if self.on_ground {
            force[0] += WALK_FORCE * input.move_x;
        } else {
            let same_direction = input.move_x.signum() == facing[0].signum();
            let multiplier = if same_direction { AIR_STEER_SAME } else { AIR_STEER_OPPOSING };
            force[0] += WALK_FORCE * input.move_x * multiplier;
        }

        if self.jump_cooldown > 0.0 {
            self.jump_cooldown = (self.jump_cooldown - dt).max(0.0);
        }
        let jump_outcome = if input.jump {
            if self.on_ground && self.jump_cooldown <= 0.0 {
                force[1] -= JUMP_FORCE / dt.max(1e-6);
                self.jump_cooldown = JUMP_COOLDOWN_SECONDS;
                JumpOutcome::Jumped
            } else if !self.on_ground {
                JumpOutcome::NotGrounded
            } else {
                JumpOutcome::Cooldown
            }
        } else {
            JumpOutcome::NotGrounded
        };
        let _ = jump_outcome;

        if let Some(cell) = grid.at_mut(anchor) {
            cell.add_pending_force(force);
        }

        if self.on_ground && input.move_x.abs() > 1e-3 {
            let new_facing_x = input.move_x.signum();
            if let Some(organism) = organisms.get(self.organism_id) {
                let _ = organism;
            }
            self.update_facing_hint(new_facing_x);
        }

        self.update_sparkles(rng, velocity, dt);

        if let Some(light) = &mut self.handheld_light {
            let acceleration = [force[0] / 5.0, force[1] / 5.0];
            light.update(acceleration, dt);
        }

        true
    }

    fn update_facing_hint(&mut self, _new_facing_x: f32) {
        // Facing lives on `Organism`, owned by the manager; ducks cannot
        // mutate it directly here without a `&mut Organism` borrow, which
        // the caller (`World::step`) applies after calling `update` using
        // the same sign convention as `on_ground && move.x != 0`.
    }

    fn update_sparkles(&mut self, rng: &mut SimRng, duck_velocity: [f32; 2], dt: f32) {
        const GRAVITY: f32 = 9.8;
        const DAMPING: f32 = 0.9;
        const SPAWN_FLOOR: f32 = 0.05;

        for sparkle in &mut self.sparkles {
            sparkle.velocity[1] += GRAVITY * dt;
            sparkle.velocity[0] *= 1.0 - (1.0 - DAMPING) * dt * 60.0;
            sparkle.velocity[1] *= 1.0 - (1.0 - DAMPING) * dt * 60.0;
            sparkle.pos[0] += sparkle.velocity[0] * dt;
            sparkle.pos[1] += sparkle.velocity[1] * dt;
            sparkle.age += dt;
        }
        self.sparkles.retain(|s| s.age < 3.0);

        let speed = (duck_velocity[0] * duck_velocity[0] + duck_velocity[1] * duck_velocity[1]).sqrt();
        if speed < SPAWN_FLOOR {
            return;
        }
        let target_count = (speed * 5.0).min(20.0) as usize;
        while self.sparkles.len() < target_count {
            self.sparkles.push(Sparkle {
                pos: [0.0, 0.0],
                velocity: [rng.range_f32(-1.0, 1.0), rng.range_f32(-2.0, 0.0)],
                age: 0.0,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::RandomDuckBrain;

    fn spawn_duck(grid: &mut Grid, organisms: &mut OrganismManager, pos: CellPos) -> Duck {
        let id = organisms.create_duck(grid, pos).unwrap();
        Duck::new(id, Box::new(RandomDuckBrain { bias: 0.0 }))
    }

    #[test]
    fn duck_on_solid_ground_is_detected_as_grounded() {
        let mut grid = Grid::new(9, 9);
        let mut organisms = OrganismManager::new();
        grid.replace_material(CellPos::new(4, 5), Material::Wall, 1.0);
        let mut duck = spawn_duck(&mut grid, &mut organisms, CellPos::new(4, 4));
        let materials = MaterialTable::default();
        let mut rng = SimRng::new(1);
        duck.update(&mut grid, &materials, &organisms, &mut rng, 1.0 / 60.0);
        assert!(duck.on_ground);
    }

    #[test]
    fn duck_aborts_if_anchor_material_is_not_wood() {
        let mut grid = Grid::new(9, 9);
        let mut organisms = OrganismManager::new();
        let mut duck = spawn_duck(&mut grid, &mut organisms, CellPos::new(4, 4));
        grid.replace_material(CellPos::new(4, 4), Material::Dirt, 1.0);
        let materials = MaterialTable::default();
        let mut rng = SimRng::new(1);
        assert!(!duck.update(&mut grid, &materials, &organisms, &mut rng, 1.0 / 60.0));
    }

    #[test]
    fn handheld_light_shuts_off_when_drooped_and_relights_with_hysteresis() {
        let mut light = HandheldLight { pitch: 0.0, angular_velocity: 0.0, lit: true, shutoff_angle: 1.0, recovery_angle: 0.5 };
        light.pitch = 1.1;
        light.update([0.0, 0.0], 0.001);
        assert!(!light.lit);
        light.pitch = 0.9;
        light.update([0.0, 0.0], 0.001);
        assert!(!light.lit, "should not relight above recovery_angle");
        light.pitch = 0.3;
        light.update([0.0, 0.0], 0.001);
        assert!(light.lit);
    }

    #[test]
    fn jump_requires_ground_and_respects_cooldown() {
        let mut grid = Grid::new(9, 9);
        let mut organisms = OrganismManager::new();
        grid.replace_material(CellPos::new(4, 5), Material::Wall, 1.0);
        let id = organisms.create_duck(&mut grid, CellPos::new(4, 4)).unwrap();
        let mut duck = Duck::new(id, Box::new(RandomDuckBrain { bias: 0.0 }));
        duck.jump_cooldown = 0.0;
        duck.on_ground = true;
        let materials = MaterialTable::default();
        assert!(Duck::ground_below(&grid, &materials, CellPos::new(4, 4)));
    }
}
