// Scenario runtime: named setups that seed a fresh grid/organism population
// and may apply per-scenario tuning on top of the default physics settings.
// A registry of boxed trait objects keyed by name, with an explicit config
// layer instead of hardcoded constants.

use crate::brain::{IdleTreeBrain, NeuralTreeBrain, RandomDuckBrain, WallBouncingDuckBrain};
use crate::config::PhysicsSettings;
use crate::duck::Duck;
use crate::genome::GenomeRepository;
use crate::grid::Grid;
use crate::organism::OrganismManager;
use crate::tree::Tree;
use crate::types::{CellPos, Material};
use dirtsim_prng::SimRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScenarioMetadata {
    pub id: String,
    pub display_name: String,
    pub description: String,
}

/// Per-scenario overrides layered on top of `PhysicsSettings::default()`.
/// Any field left at its `Default` marker is not applied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub gravity: Option<f32>,
    pub timescale: Option<f32>,
    pub initial_tree_count: Option<u32>,
    pub initial_duck_count: Option<u32>,
}

impl ScenarioConfig {
    pub fn apply_to(&self, settings: &mut PhysicsSettings) {
        if let Some(gravity) = self.gravity {
            settings.gravity = gravity;
        }
        if let Some(timescale) = self.timescale {
            settings.timescale = timescale;
        }
    }
}

/// A runnable scenario: knows how to populate a fresh world and (optionally)
/// apply scripted events during the tick.
pub trait Scenario: Send + Sync {
    fn metadata(&self) -> ScenarioMetadata;

    fn default_config(&self) -> ScenarioConfig {
        ScenarioConfig::default()
    }

    /// Populate an empty grid/organism manager. Called by `setup` and by
    /// `reset`.
    fn setup(
        &self,
        grid: &mut Grid,
        organisms: &mut OrganismManager,
        trees: &mut Vec<Tree>,
        ducks: &mut Vec<Duck>,
        config: &ScenarioConfig,
        genomes: &GenomeRepository,
        rng: &mut SimRng,
    );

    /// Scripted per-tick behavior beyond organism/physics updates (e.g.
    /// periodic seed rain, weather). Default: no-op.
    fn tick(&self, _grid: &mut Grid, _dt: f32, _rng: &mut SimRng) {}
}

/// A flat grid of dirt with a handful of idle-brained trees and
/// wall-bouncing ducks — the scenario a fresh server starts with.
pub struct ForestClearing;

impl Scenario for ForestClearing {
    fn metadata(&self) -> ScenarioMetadata {
        ScenarioMetadata {
            id: "forest_clearing".to_string(),
            display_name: "Forest Clearing".to_string(),
            description: "A ground layer of dirt with seeded trees and a few ducks.".to_string(),
        }
    }

    fn default_config(&self) -> ScenarioConfig {
        ScenarioConfig { gravity: None, timescale: None, initial_tree_count: Some(3), initial_duck_count: Some(2) }
    }

    fn setup(
        &self,
        grid: &mut Grid,
        organisms: &mut OrganismManager,
        trees: &mut Vec<Tree>,
        ducks: &mut Vec<Duck>,
        config: &ScenarioConfig,
        genomes: &GenomeRepository,
        rng: &mut SimRng,
    ) {
        let ground_y = grid.height() - 2;
        for x in 0..grid.width() {
            grid.replace_material(CellPos::new(x, ground_y), Material::Dirt, 1.0);
            grid.replace_material(CellPos::new(x, ground_y + 1), Material::Dirt, 1.0);
        }

        let tree_count = config.initial_tree_count.unwrap_or(3);
        for i in 0..tree_count {
            let x = 2 + (i as i32) * (grid.width() / (tree_count.max(1) as i32 + 1));
            let pos = CellPos::new(x, ground_y - 1);
            let Ok(id) = organisms.create_tree(grid, pos) else { continue };
            let brain: Box<dyn crate::brain::TreeBrain + Send + Sync> = match genomes.get_best("forest_clearing") {
                Some(stored) => Box::new(NeuralTreeBrain::new(stored.weights.clone())),
                None => Box::new(IdleTreeBrain),
            };
            trees.push(Tree::new(id, brain));
        }

        let duck_count = config.initial_duck_count.unwrap_or(2);
        for i in 0..duck_count {
            let x = 5 + (i as i32) * 4;
            let pos = CellPos::new(x, ground_y - 1);
            let Ok(id) = organisms.create_duck(grid, pos) else { continue };
            let brain: Box<dyn crate::brain::DuckBrain + Send + Sync> = if i % 2 == 0 {
                Box::new(WallBouncingDuckBrain)
            } else {
                Box::new(RandomDuckBrain { bias: rng.range_f32(-0.2, 0.2) })
            };
            ducks.push(Duck::new(id, brain));
        }
    }
}

/// A bare arena for evolution runs: no scenery, just a spawn point for
/// whichever genome is under evaluation.
pub struct EvolutionArena;

impl Scenario for EvolutionArena {
    fn metadata(&self) -> ScenarioMetadata {
        ScenarioMetadata {
            id: "evolution_arena".to_string(),
            display_name: "Evolution Arena".to_string(),
            description: "A minimal ground strip used to evaluate a single genome in isolation.".to_string(),
        }
    }

    fn setup(
        &self,
        grid: &mut Grid,
        _organisms: &mut OrganismManager,
        _trees: &mut Vec<Tree>,
        _ducks: &mut Vec<Duck>,
        _config: &ScenarioConfig,
        _genomes: &GenomeRepository,
        _rng: &mut SimRng,
    ) {
        let ground_y = grid.height() - 2;
        for x in 0..grid.width() {
            grid.replace_material(CellPos::new(x, ground_y), Material::Dirt, 1.0);
        }
    }
}

/// Name-keyed lookup of every registered scenario.
pub struct ScenarioRegistry {
    scenarios: BTreeMap<String, Box<dyn Scenario>>,
}

impl Default for ScenarioRegistry {
    fn default() -> Self {
        let mut registry = Self { scenarios: BTreeMap::new() };
        registry.register(Box::new(ForestClearing));
        registry.register(Box::new(EvolutionArena));
        registry
    }
}

impl ScenarioRegistry {
    pub fn register(&mut self, scenario: Box<dyn Scenario>) {
        self.scenarios.insert(scenario.metadata().id, scenario);
    }

    pub fn get(&self, id: &str) -> Option<&dyn Scenario> {
        self.scenarios.get(id).map(|b| b.as_ref())
    }

    pub fn list(&self) -> Vec<ScenarioMetadata> {
        self.scenarios.values().map(|s| s.metadata()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_lists_builtin_scenarios_by_name() {
        let registry = ScenarioRegistry::default();
        let names: Vec<String> = registry.list().into_iter().map(|m| m.id).collect();
        assert!(names.contains(&"forest_clearing".to_string()));
        assert!(names.contains(&"evolution_arena".to_string()));
    }

    #[test]
    fn forest_clearing_setup_spawns_requested_organism_counts() {
        let registry = ScenarioRegistry::default();
        let scenario = registry.get("forest_clearing").unwrap();
        let mut grid = Grid::new(40, 20);
        let mut organisms = OrganismManager::new();
        let mut trees = Vec::new();
        let mut ducks = Vec::new();
        let genomes = GenomeRepository::new();
        let mut rng = SimRng::new(1);
        let config = ScenarioConfig { initial_tree_count: Some(2), initial_duck_count: Some(1), ..Default::default() };
        scenario.setup(&mut grid, &mut organisms, &mut trees, &mut ducks, &config, &genomes, &mut rng);
        assert_eq!(trees.len(), 2);
        assert_eq!(ducks.len(), 1);
        assert!(organisms.check_invariant());
    }

    #[test]
    fn scenario_config_overrides_gravity() {
        let mut settings = PhysicsSettings::default();
        let config = ScenarioConfig { gravity: Some(3.0), ..Default::default() };
        config.apply_to(&mut settings);
        assert_eq!(settings.gravity, 3.0);
    }
}
