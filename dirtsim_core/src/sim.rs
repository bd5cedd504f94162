// World orchestrator: owns the grid, organisms, lighting, and the per-tick
// sequence that drives them all forward: clear -> update entities -> run
// physics -> run lighting, built around a cell-ownership model rather than
// a set of discrete, independently-positioned entities.

use crate::config::DirtConfig;
use crate::duck::Duck;
use crate::evolution::{fitness, EvolutionConfig};
use crate::genome::GenomeRepository;
use crate::grid::Grid;
use crate::light::{Light, LightConfig, LightGrid};
use crate::material::MaterialTable;
use crate::organism::OrganismManager;
use crate::physics;
use crate::scenario::{Scenario, ScenarioConfig, ScenarioRegistry};
use crate::tree::Tree;
use crate::types::{Material, OrganismId};
use dirtsim_prng::SimRng;

/// A fatal invariant violation surfaced by an organism update. These are
/// bugs, not expected runtime outcomes: the orchestrator logs a critical
/// and removes the offending organism rather than silently limping on with
/// an inconsistent cell<->organism map.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrganismInvariantViolation {
    pub organism_id: OrganismId,
}

/// The live, tickable world: grid, organisms, lighting, and the scenario
/// driving them.
pub struct World {
    pub grid: Grid,
    pub materials: MaterialTable,
    pub organisms: OrganismManager,
    pub trees: Vec<Tree>,
    pub ducks: Vec<Duck>,
    pub light: LightGrid,
    pub light_config: LightConfig,
    pub lights: Vec<Light>,
    pub config: DirtConfig,
    pub rng: SimRng,
    pub elapsed_seconds: f32,
    pub scenario_id: String,
    pub scenario_config: ScenarioConfig,
}

impl World {
    pub fn new(width: i32, height: i32, seed: u64) -> Self {
        Self {
            grid: Grid::new(width, height),
            materials: MaterialTable::default(),
            organisms: OrganismManager::new(),
            trees: Vec::new(),
            ducks: Vec::new(),
            light: LightGrid::new(width, height),
            light_config: LightConfig::default(),
            lights: Vec::new(),
            config: DirtConfig::default(),
            rng: SimRng::new(seed),
            elapsed_seconds: 0.0,
            scenario_id: String::new(),
            scenario_config: ScenarioConfig::default(),
        }
    }

    /// Wipe organisms/trees/ducks and re-run `scenario.setup` over a fresh
    /// grid of the same dimensions.
    pub fn reset_with_scenario(&mut self, scenario: &dyn Scenario, config: ScenarioConfig, genomes: &GenomeRepository) {
        let (width, height) = (self.grid.width(), self.grid.height());
        self.grid = Grid::new(width, height);
        self.organisms = OrganismManager::new();
        self.trees.clear();
        self.ducks.clear();
        self.elapsed_seconds = 0.0;
        self.scenario_id = scenario.metadata().id;
        self.scenario_config = config;
        scenario.setup(
            &mut self.grid,
            &mut self.organisms,
            &mut self.trees,
            &mut self.ducks,
            &self.scenario_config,
            genomes,
            &mut self.rng,
        );
    }

    /// Advance the world by one fixed tick. Returns any organisms that were
    /// force-removed this tick due to a fatal invariant violation.
    pub fn step(&mut self, scenario: Option<&dyn Scenario>) -> Vec<OrganismInvariantViolation> {
        let dt = self.config.dt_seconds() * self.config.physics.timescale;
        self.elapsed_seconds += dt;

        // Forces must be cleared before any organism update or scenario hook
        // adds into `pending_force`, and before `physics::step` (which no
        // longer clears) consumes them during gravity/integration.
        physics::clear_forces(&mut self.grid);

        for tree in &mut self.trees {
            tree.update(&mut self.grid, &mut self.organisms, dt);
            tree.absorb_water(&mut self.grid, &self.organisms, dt);
        }

        let mut violations = Vec::new();
        for duck in &mut self.ducks {
            let facing_before = self.organisms.get(duck.organism_id).map(|o| o.facing);
            let ok = duck.update(&mut self.grid, &self.materials, &self.organisms, &mut self.rng, dt);
            if !ok {
                violations.push(OrganismInvariantViolation { organism_id: duck.organism_id });
                continue;
            }
            // Facing lives on `Organism`; `Duck::update` only has shared
            // access to the manager, so the actual mutation happens here,
            // immediately after the duck decides it moved on the ground.
            if duck.on_ground {
                if let Some(organism) = self.organisms.get_mut(duck.organism_id) {
                    if let Some(before) = facing_before {
                        organism.facing = before;
                    }
                    let vx = self.grid.at(organism.anchor_cell).map(|c| c.velocity[0]).unwrap_or(0.0);
                    if vx.abs() > 1e-3 {
                        organism.facing = [vx.signum(), 0.0];
                    }
                }
            }
        }

        for violation in &violations {
            let _ = self.organisms.remove_from_world(&mut self.grid, violation.organism_id);
            self.ducks.retain(|d| d.organism_id != violation.organism_id);
            eprintln!("critical: organism {} violated its invariants and was removed", violation.organism_id.0);
        }

        if let Some(scenario) = scenario {
            scenario.tick(&mut self.grid, dt, &mut self.rng);
        }

        let transfers = physics::step(&mut self.grid, &self.materials, &self.config.physics, &self.organisms, dt);
        let organism_transfers: Vec<(crate::types::CellPos, crate::types::CellPos, OrganismId)> = transfers
            .iter()
            .filter_map(|t| self.organisms.owner_of(t.from).map(|id| (t.from, t.to, id)))
            .collect();
        self.organisms.notify_transfers(&organism_transfers);

        self.light.compute(&self.grid, &self.materials, &self.lights, &self.light_config);

        violations
    }

    /// Run a private, scratch world (same dimensions) for up to
    /// `config.max_simulation_time_seconds`, seeded with a single tree
    /// driven by `weights`, returning the fitness reached. Used by the
    /// evolution loop to score one genome in isolation from any other
    /// individual's world state.
    pub fn evaluate_genome(
        width: i32,
        height: i32,
        weights: Vec<f32>,
        scenario: &dyn Scenario,
        config: &EvolutionConfig,
        seed: u64,
    ) -> f32 {
        let mut world = World::new(width, height, seed);
        let genomes = GenomeRepository::new();
        world.reset_with_scenario(
            scenario,
            ScenarioConfig { initial_tree_count: Some(0), initial_duck_count: Some(0), ..Default::default() },
            &genomes,
        );

        let spawn = crate::types::CellPos::new(width / 2, height / 2 - 3);
        let Ok(organism_id) = world.organisms.create_tree(&mut world.grid, spawn) else {
            return 0.0;
        };
        let brain = crate::brain::NeuralTreeBrain::new(weights);
        world.trees.push(Tree::new(organism_id, Box::new(brain)));

        let mut max_energy = 0.0f32;
        let dt = world.config.dt_seconds();
        let max_ticks = (config.max_simulation_time_seconds / dt).ceil() as u32;
        for _ in 0..max_ticks {
            if world.organisms.get(organism_id).is_none() {
                break;
            }
            world.step(Some(scenario));
            if let Some(tree) = world.trees.iter().find(|t| t.organism_id == organism_id) {
                max_energy = max_energy.max(tree.total_energy);
            } else {
                break;
            }
        }

        fitness(world.elapsed_seconds, max_energy, config)
    }

    pub fn registry() -> ScenarioRegistry {
        ScenarioRegistry::default()
    }

    /// Fraction of grid cells that are not Air, for a quick occupancy probe.
    pub fn occupancy(&self) -> f32 {
        let total = (self.grid.width() * self.grid.height()).max(1) as f32;
        let filled = self
            .grid
            .positions()
            .filter(|&p| self.grid.at(p).is_some_and(|c| c.material != Material::Air))
            .count() as f32;
        filled / total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::ForestClearing;

    #[test]
    fn reset_with_scenario_populates_trees_and_ducks() {
        let mut world = World::new(40, 20, 1);
        let genomes = GenomeRepository::new();
        let scenario = ForestClearing;
        world.reset_with_scenario(&scenario, scenario.default_config(), &genomes);
        assert!(!world.trees.is_empty());
        assert!(!world.ducks.is_empty());
        assert!(world.organisms.check_invariant());
    }

    #[test]
    fn step_advances_elapsed_time_by_one_tick() {
        let mut world = World::new(20, 20, 1);
        let before = world.elapsed_seconds;
        world.step(None);
        assert!(world.elapsed_seconds > before);
    }

    #[test]
    fn duck_with_corrupted_anchor_is_removed_not_left_dangling() {
        let mut world = World::new(20, 20, 1);
        let pos = crate::types::CellPos::new(5, 5);
        let id = world.organisms.create_duck(&mut world.grid, pos).unwrap();
        world.ducks.push(Duck::new(id, Box::new(crate::brain::WallBouncingDuckBrain)));
        world.grid.replace_material(pos, Material::Dirt, 1.0);

        let violations = world.step(None);
        assert_eq!(violations.len(), 1);
        assert!(world.ducks.is_empty());
        assert!(world.organisms.get(id).is_none());
    }

    #[test]
    fn duck_walk_force_survives_into_the_physics_pass() {
        // Regression test: `physics::step` used to clear `pending_force` at
        // its own start, which ran *after* the duck-update loop had already
        // added its walk force for this tick — wiping it before gravity or
        // integration ever saw it. `World::step` now clears forces before
        // the duck loop runs instead.
        let mut world = World::new(20, 5, 1);
        for x in 0..20 {
            world.grid.replace_material(crate::types::CellPos::new(x, 4), Material::Dirt, 1.0);
        }
        let pos = crate::types::CellPos::new(10, 3);
        let id = world.organisms.create_duck(&mut world.grid, pos).unwrap();
        world.ducks.push(Duck::new(id, Box::new(crate::brain::WallBouncingDuckBrain)));

        world.step(None);

        let velocity_x = world.grid.at(pos).unwrap().velocity[0];
        assert!(velocity_x > 0.0, "duck's walk force should have produced rightward velocity, got {velocity_x}");
    }

    #[test]
    fn evaluate_genome_returns_nonnegative_fitness_for_zero_weights() {
        let registry = World::registry();
        let scenario = registry.get("evolution_arena").unwrap();
        let config = EvolutionConfig {
            max_simulation_time_seconds: 1.0,
            ..Default::default()
        };
        let weights = vec![0.0; crate::brain::TREE_GENOME_LEN];
        let score = World::evaluate_genome(20, 20, weights, scenario, &config, 42);
        assert!(score >= 0.0);
    }
}
