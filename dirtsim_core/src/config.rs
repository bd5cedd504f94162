// Data-driven simulation configuration.
//
// All tunable physics parameters live here in `PhysicsSettings`, reachable
// from clients via `PhysicsSettingsGet/Set`. The stepper never uses magic
// numbers for gravity, friction, or cohesion — it reads from this struct, so
// a scenario or operator can retune the world without recompiling.
//
// **The sim runs at a fixed ~16.67ms tick** (`tick_duration_ms`). All
// per-tick rates (friction strength, COM cohesion) are calibrated for this
// rate; changing it rescales apparent behavior.
//
// See also: `sim.rs`, which owns `DirtConfig` as part of `World`; `physics.rs`
// for the stepper that reads `PhysicsSettings`.
//
// **Critical constraint: determinism.** Config values feed directly into
// simulation logic; all peers evaluating the same scenario must use
// identical configs for identical results.

use serde::{Deserialize, Serialize};

/// Tunable physics parameters, mutable at runtime via the wire protocol's
/// `PhysicsSettingsSet` command.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhysicsSettings {
    pub gravity: f32,
    pub elasticity: f32,
    pub timescale: f32,
    pub pressure_scale: f32,
    pub friction_strength: f32,
    pub com_cohesion_range: f32,
    pub com_cohesion_strength: f32,
    pub air_resistance: f32,
    /// Maximum speed a cell's velocity is clamped to after integration.
    pub max_speed: f32,
    /// Gauss-Seidel sweep count for the pressure solve.
    pub pressure_iterations: u32,
    pub swap_enabled: bool,
}

impl Default for PhysicsSettings {
    fn default() -> Self {
        Self {
            gravity: 9.8,
            elasticity: 0.1,
            timescale: 1.0,
            pressure_scale: 1.0,
            friction_strength: 4.0,
            com_cohesion_range: 0.3,
            com_cohesion_strength: 2.0,
            air_resistance: 0.02,
            max_speed: 20.0,
            pressure_iterations: 4,
            swap_enabled: true,
        }
    }
}

/// The tick duration and physics settings the stepper consumes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DirtConfig {
    pub tick_duration_ms: f32,
    pub physics: PhysicsSettings,
}

impl Default for DirtConfig {
    fn default() -> Self {
        Self {
            tick_duration_ms: 1000.0 / 60.0,
            physics: PhysicsSettings::default(),
        }
    }
}

impl DirtConfig {
    pub fn dt_seconds(&self) -> f32 {
        self.tick_duration_ms / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tick_is_about_sixty_hz() {
        let config = DirtConfig::default();
        assert!((config.dt_seconds() - 1.0 / 60.0).abs() < 1e-6);
    }

    #[test]
    fn physics_defaults_are_sane() {
        let p = PhysicsSettings::default();
        assert!(p.gravity > 0.0);
        assert!(p.max_speed > 0.0);
        assert!(p.pressure_iterations > 0);
    }
}
