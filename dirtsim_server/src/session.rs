// Command dispatch over a live (or absent) `World`.
//
// `WorldSession` is the single owner of all mutable simulation state: the
// active `World` (if any), the genome repository, the scenario registry,
// and the server's lifecycle state machine. `server.rs` drives this struct
// from one thread — there is no locking here because there is only ever
// one writer. One `handle_*`-style match arm per incoming command, request
// in and response out, no turn batching.
//
// Field accesses below go through `self.<field>` directly rather than
// through helper methods that borrow all of `self` — several commands need
// simultaneous access to two or three fields (e.g. the scenario registry
// and the active world), and only direct field projections let the borrow
// checker see those accesses as disjoint.

use dirtsim_core::evolution::{EvolutionConfig, MutationConfig, Population};
use dirtsim_core::genome::{BrainKind, GenomeMetadata, GenomeRepository};
use dirtsim_core::scenario::{ScenarioConfig, ScenarioRegistry};
use dirtsim_core::sim::World;
use dirtsim_core::state_machine::{Dispatcher, ServerState, Transition};
use dirtsim_core::types::{CellPos, GenomeId, OrganismKind, TrainingSessionId};
use dirtsim_prng::SimRng;
use dirtsim_protocol::message::{
    CellSnapshot, Command, CommandResult, DirtError, EvolutionProgressReport, RenderFormat,
};
use std::collections::BTreeMap;

/// A finished evolution pass, kept until the caller explicitly saves or
/// discards it.
struct TrainingResult {
    scenario_id: String,
    population: Population,
    #[allow(dead_code)]
    acknowledged: bool,
}

pub struct WorldSession {
    pub world: Option<World>,
    pub genomes: GenomeRepository,
    pub scenarios: ScenarioRegistry,
    pub dispatcher: Dispatcher,
    pub rng: SimRng,
    active_scenario_id: String,
    training_results: BTreeMap<TrainingSessionId, TrainingResult>,
    width: i32,
    height: i32,
}

fn unknown_scenario(id: &str) -> DirtError {
    DirtError::BadCommand { detail: format!("unknown scenario '{id}'") }
}

fn no_training_session(id: TrainingSessionId) -> DirtError {
    DirtError::BadCommand { detail: format!("no training session {id}") }
}

impl WorldSession {
    pub fn new(width: i32, height: i32, seed: u64) -> Self {
        Self {
            world: None,
            genomes: GenomeRepository::new(),
            scenarios: ScenarioRegistry::default(),
            dispatcher: Dispatcher::new(),
            rng: SimRng::new(seed),
            active_scenario_id: String::new(),
            training_results: BTreeMap::new(),
            width,
            height,
        }
    }

    /// Advance the active world by one tick, if any. Called by the server's
    /// fixed-rate tick thread, independent of command dispatch.
    pub fn tick(&mut self) {
        if self.dispatcher.state() != ServerState::SimRunning {
            return;
        }
        let Some(world) = self.world.as_mut() else { return };
        let scenario = self.scenarios.get(&self.active_scenario_id);
        world.step(scenario);
    }

    pub fn handle(&mut self, command: Command) -> Result<CommandResult, DirtError> {
        match command {
            Command::CellGet { pos } => {
                let world = self.world.as_ref().ok_or(DirtError::NoWorld)?;
                let cell = world
                    .grid
                    .at(pos)
                    .ok_or_else(|| DirtError::InvalidCoordinates { detail: format!("{pos} out of bounds") })?;
                Ok(CommandResult::Cell(CellSnapshot {
                    pos,
                    material: cell.material,
                    fill_ratio: cell.fill_ratio,
                    velocity: cell.velocity,
                }))
            }
            Command::CellSet { pos, material, fill_ratio } => {
                let world = self.world.as_mut().ok_or(DirtError::NoWorld)?;
                if !world.grid.in_bounds(pos) {
                    return Err(DirtError::InvalidCoordinates { detail: format!("{pos} out of bounds") });
                }
                world.grid.replace_material(pos, material, fill_ratio.clamp(0.0, 1.0));
                Ok(CommandResult::Ack)
            }
            Command::StateGet => {
                let world = self.world.as_ref().ok_or(DirtError::NoWorld)?;
                Ok(CommandResult::StateSnapshot {
                    width: world.grid.width(),
                    height: world.grid.height(),
                    occupancy: world.occupancy(),
                    elapsed_seconds: world.elapsed_seconds,
                })
            }
            Command::StatusGet => {
                let world = self.world.as_ref().ok_or(DirtError::NoWorld)?;
                Ok(CommandResult::Status {
                    scenario_id: self.active_scenario_id.clone(),
                    organism_count: world.organisms.len(),
                    elapsed_seconds: world.elapsed_seconds,
                })
            }
            Command::Reset => {
                let scenario = self.scenarios.get(&self.active_scenario_id).ok_or_else(|| unknown_scenario(&self.active_scenario_id))?;
                let config = scenario.default_config();
                let world = self.world.as_mut().ok_or(DirtError::NoWorld)?;
                world.reset_with_scenario(scenario, config, &self.genomes);
                self.dispatcher.transition(Transition::Reset).ok();
                Ok(CommandResult::Ack)
            }
            Command::WorldResize { width, height } => {
                self.width = width;
                self.height = height;
                if self.world.is_some() {
                    let seed = self.rng.next_u64();
                    self.world = Some(World::new(width, height, seed));
                }
                Ok(CommandResult::Ack)
            }
            Command::SpawnDirtBall { center, radius, material } => {
                let world = self.world.as_mut().ok_or(DirtError::NoWorld)?;
                for dy in -radius..=radius {
                    for dx in -radius..=radius {
                        if dx * dx + dy * dy > radius * radius {
                            continue;
                        }
                        let pos = CellPos::new(center.x + dx, center.y + dy);
                        if world.grid.in_bounds(pos) {
                            world.grid.replace_material(pos, material, 1.0);
                        }
                    }
                }
                Ok(CommandResult::Ack)
            }
            Command::SeedAdd { pos } => {
                let world = self.world.as_mut().ok_or(DirtError::NoWorld)?;
                let id = world.organisms.create_tree(&mut world.grid, pos).map_err(|e| match e {
                    dirtsim_core::organism::OrganismError::InvalidCoordinates => {
                        DirtError::InvalidCoordinates { detail: format!("{pos} out of bounds") }
                    }
                    dirtsim_core::organism::OrganismError::SpawnOccupied | dirtsim_core::organism::OrganismError::NotFound => {
                        DirtError::SpawnOccupied { pos }
                    }
                })?;
                let brain: Box<dyn dirtsim_core::brain::TreeBrain + Send + Sync> = Box::new(dirtsim_core::brain::IdleTreeBrain);
                world.trees.push(dirtsim_core::tree::Tree::new(id, brain));
                Ok(CommandResult::Ack)
            }

            Command::ScenarioListGet => {
                Ok(CommandResult::ScenarioList { ids: self.scenarios.list().into_iter().map(|m| m.id).collect() })
            }
            Command::ScenarioSwitch { scenario_id } => {
                let config = self.scenarios.get(&scenario_id).ok_or_else(|| unknown_scenario(&scenario_id))?.default_config();
                let seed = self.rng.next_u64();
                let mut world = World::new(self.width, self.height, seed);
                let scenario = self.scenarios.get(&scenario_id).ok_or_else(|| unknown_scenario(&scenario_id))?;
                world.reset_with_scenario(scenario, config, &self.genomes);
                self.world = Some(world);
                self.active_scenario_id = scenario_id;
                Ok(CommandResult::Ack)
            }
            Command::ScenarioConfigSet { scenario_id, config } => {
                if scenario_id != self.active_scenario_id {
                    return Err(DirtError::BadCommand { detail: "config only applies to the active scenario".into() });
                }
                if self.scenarios.get(&scenario_id).is_none() {
                    return Err(unknown_scenario(&scenario_id));
                }
                let world = self.world.as_mut().ok_or(DirtError::NoWorld)?;
                config.apply_to(&mut world.config.physics);
                Ok(CommandResult::Ack)
            }

            Command::SimRun => {
                self.dispatcher
                    .transition(Transition::SimRun)
                    .map_err(|_| DirtError::BadCommand { detail: "cannot run: no world loaded or already running".into() })?;
                Ok(CommandResult::Ack)
            }
            Command::SimStop => {
                self.dispatcher
                    .transition(Transition::SimStop)
                    .map_err(|_| DirtError::BadCommand { detail: "not running".into() })?;
                Ok(CommandResult::Ack)
            }
            Command::ClockEventTrigger { event_name } => {
                Err(DirtError::Unsupported { detail: format!("no scripted clock event named '{event_name}'") })
            }

            Command::PhysicsSettingsGet => {
                Ok(CommandResult::PhysicsSettings(self.world.as_ref().ok_or(DirtError::NoWorld)?.config.physics))
            }
            Command::PhysicsSettingsSet { settings } => {
                self.world.as_mut().ok_or(DirtError::NoWorld)?.config.physics = settings;
                Ok(CommandResult::Ack)
            }
            Command::GravitySet { value } => {
                self.world.as_mut().ok_or(DirtError::NoWorld)?.config.physics.gravity = value;
                Ok(CommandResult::Ack)
            }

            Command::RenderFormatGet => Ok(CommandResult::RenderFormat(RenderFormat::Rgba8)),
            Command::RenderFormatSet { format } => Ok(CommandResult::RenderFormat(format)),
            Command::DiagramGet { organism_id } => {
                let world = self.world.as_ref().ok_or(DirtError::NoWorld)?;
                if world.organisms.get(organism_id).is_none() {
                    return Err(DirtError::BadCommand { detail: format!("no such organism {organism_id}") });
                }
                Ok(CommandResult::Ack)
            }

            Command::FingerDown { event } | Command::FingerMove { event } | Command::FingerUp { event } => {
                let world = self.world.as_ref().ok_or(DirtError::NoWorld)?;
                let pos = CellPos::new(event.world_x.floor() as i32, event.world_y.floor() as i32);
                if !world.grid.in_bounds(pos) {
                    return Err(DirtError::InvalidCoordinates { detail: format!("pointer at {pos} out of bounds") });
                }
                Ok(CommandResult::Ack)
            }

            Command::GenomeList { scenario_id } => {
                let ids = match scenario_id {
                    Some(id) => self.genomes.list_for_scenario(&id).into_iter().map(|g| g.id).collect(),
                    None => self.genomes.list().into_iter().map(|g| g.id).collect(),
                };
                Ok(CommandResult::GenomeList { ids })
            }
            Command::GenomeGet { id } => {
                let stored = self.genomes.get(id).ok_or(DirtError::MissingGenome { id })?;
                Ok(CommandResult::GenomeMeta { id, weights: stored.weights.clone(), metadata: stored.metadata.clone() })
            }
            Command::GenomeGetBest { scenario_id } => {
                let stored = self.genomes.get_best(&scenario_id).ok_or_else(|| {
                    DirtError::BadCommand { detail: format!("no best genome stored for scenario '{scenario_id}'") }
                })?;
                Ok(CommandResult::GenomeMeta { id: stored.id, weights: stored.weights.clone(), metadata: stored.metadata.clone() })
            }
            Command::GenomeSet { id, weights, metadata } => {
                self.genomes.store(id, weights, metadata);
                Ok(CommandResult::Ack)
            }
            Command::GenomeDelete { id } => {
                if !self.genomes.delete(id) {
                    return Err(DirtError::MissingGenome { id });
                }
                Ok(CommandResult::Ack)
            }

            Command::EvolutionStart { scenario_id, config } => {
                self.dispatcher
                    .transition(Transition::EvolutionStart)
                    .map_err(|_| DirtError::BadCommand { detail: "cannot start evolution from the current state".into() })?;
                if self.scenarios.get(&scenario_id).is_none() {
                    self.dispatcher.transition(Transition::EvolutionStop).ok();
                    return Err(unknown_scenario(&scenario_id));
                }
                let evo_config = config.unwrap_or_default();
                let session_id = TrainingSessionId::new(&mut self.rng);
                let population = self.run_evolution(&scenario_id, &evo_config);
                let progress = population.progress();
                self.training_results.insert(
                    session_id,
                    TrainingResult { scenario_id, population, acknowledged: false },
                );
                self.dispatcher.transition(Transition::EvolutionStop).ok();
                Ok(CommandResult::EvolutionProgress(EvolutionProgressReport {
                    session_id,
                    generation: progress.generation,
                    best_fitness: progress.best_fitness,
                    mean_fitness: progress.mean_fitness,
                }))
            }
            Command::EvolutionStop => {
                self.dispatcher
                    .transition(Transition::EvolutionStop)
                    .map_err(|_| DirtError::BadCommand { detail: "no evolution run in progress".into() })?;
                Ok(CommandResult::Ack)
            }
            Command::TrainingResultAvailable { session_id } => {
                if self.training_results.contains_key(&session_id) {
                    Ok(CommandResult::Ack)
                } else {
                    Err(no_training_session(session_id))
                }
            }
            Command::TrainingResultAvailableAck { session_id } => {
                let result = self.training_results.get_mut(&session_id).ok_or_else(|| no_training_session(session_id))?;
                result.acknowledged = true;
                Ok(CommandResult::Ack)
            }
            Command::TrainingResultGet { session_id } => {
                let result = self.training_results.get(&session_id).ok_or_else(|| no_training_session(session_id))?;
                let progress = result.population.progress();
                Ok(CommandResult::EvolutionProgress(EvolutionProgressReport {
                    session_id,
                    generation: progress.generation,
                    best_fitness: progress.best_fitness,
                    mean_fitness: progress.mean_fitness,
                }))
            }
            Command::TrainingResultList => {
                Ok(CommandResult::TrainingResultList { session_ids: self.training_results.keys().copied().collect() })
            }
            Command::TrainingResultSave { session_id, name } => {
                let result = self.training_results.get(&session_id).ok_or_else(|| no_training_session(session_id))?;
                let Some(best) = result.population.best() else {
                    return Err(DirtError::BadCommand { detail: "empty population has no best individual".into() });
                };
                let metadata = GenomeMetadata {
                    name,
                    fitness: best.fitness,
                    robust_fitness: None,
                    robust_eval_count: 0,
                    robust_samples: Vec::new(),
                    generation: result.population.generation,
                    created_timestamp: 0,
                    scenario_id: result.scenario_id.clone(),
                    notes: String::new(),
                    organism_type: Some(OrganismKind::Tree),
                    brain_kind: Some(BrainKind::Neural),
                    brain_variant: None,
                    training_session_id: Some(session_id),
                };
                self.genomes.store(best.genome_id, best.weights.clone(), metadata);
                Ok(CommandResult::Ack)
            }
            Command::TrainingResultDiscard { session_id } => {
                if self.training_results.remove(&session_id).is_none() {
                    return Err(no_training_session(session_id));
                }
                Ok(CommandResult::Ack)
            }

            Command::PeersGet => Ok(CommandResult::Peers { peer_count: 1 }),
            Command::PerfStatsGet => {
                let tick_ms = self.world.as_ref().map(|w| w.config.tick_duration_ms).unwrap_or(1000.0 / 60.0);
                Ok(CommandResult::PerfStats { ticks_per_second: 1000.0 / tick_ms, tick_budget_ms: tick_ms })
            }
            Command::TimerStatsGet => Ok(CommandResult::TimerStats { pending_request_count: self.dispatcher.pending_count() }),

            Command::Exit => {
                self.dispatcher.transition(Transition::Exit).ok();
                Ok(CommandResult::Ack)
            }
        }
    }

    /// Run a full generational evolution pass synchronously to completion.
    ///
    /// Evaluations within a generation are scored in population order, one
    /// at a time, rather than farmed out in parallel: each genome's private
    /// world is seeded by drawing the next `u64` from `self.rng`, and
    /// drawing that seed in a fixed order is what keeps two runs started
    /// from the same initial seed bit-for-bit identical. A parallel
    /// evaluator would need a seed scheme independent of scheduling order
    /// to keep that guarantee, which this implementation does not attempt.
    fn run_evolution(&mut self, scenario_id: &str, config: &EvolutionConfig) -> Population {
        let mut population =
            Population::seed(dirtsim_core::brain::TREE_GENOME_LEN, config, &mut self.rng, |rng| GenomeId::new(rng));
        for _ in 0..config.max_generations {
            for individual in &mut population.individuals {
                let seed = self.rng.next_u64();
                let scenario = self.scenarios.get(scenario_id).expect("validated before run_evolution was called");
                individual.fitness =
                    World::evaluate_genome(self.width, self.height, individual.weights.clone(), scenario, config, seed);
            }
            population.advance_generation(&MutationConfig::default(), config.tournament_size, &mut self.rng, |rng| {
                GenomeId::new(rng)
            });
        }
        population
    }
}
