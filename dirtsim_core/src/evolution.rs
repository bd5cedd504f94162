// Evolution engine: population bookkeeping, fitness scoring, tournament
// selection, and Gaussian mutation, following the standard generational
// update shape (score -> select -> mutate -> replace) applied to
// lifespan/energy scoring over neural tree-brain genomes.
//
// This module does not itself run a simulation. `World::evaluate_genome`
// (in `sim.rs`) owns spinning up a private world per genome; this module
// owns what happens to the population once fitness numbers come back. That
// split is what lets evaluation be run in parallel without this module
// needing to know anything about grids or physics.

use crate::types::GenomeId;
use dirtsim_prng::SimRng;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MutationConfig {
    /// Probability each weight is perturbed at all.
    pub rate: f32,
    /// Standard deviation of the Gaussian perturbation, when applied.
    pub sigma: f32,
    /// Probability a perturbed weight is replaced outright rather than
    /// nudged (escapes local optima a pure random-walk can get stuck in).
    pub reset_rate: f32,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self { rate: 0.05, sigma: 0.3, reset_rate: 0.01 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvolutionConfig {
    pub population_size: usize,
    pub max_generations: u32,
    pub tournament_size: usize,
    pub max_simulation_time_seconds: f32,
    pub energy_reference: f32,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: 32,
            max_generations: 100,
            tournament_size: 4,
            max_simulation_time_seconds: 120.0,
            energy_reference: 100.0,
        }
    }
}

/// Lifespan/energy -> scalar fitness. Dying early is always worse than
/// surviving the full evaluation window, and energy above the reference
/// only ever adds to a genome that already survived.
pub fn fitness(lifespan_seconds: f32, max_energy: f32, config: &EvolutionConfig) -> f32 {
    let survival = (lifespan_seconds / config.max_simulation_time_seconds.max(1e-6)).clamp(0.0, 1.0);
    survival * (1.0 + max_energy / config.energy_reference.max(1e-6))
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Individual {
    pub genome_id: GenomeId,
    pub weights: Vec<f32>,
    pub fitness: f32,
}

/// Perturb `weights` in place per `config`. Each weight is rolled
/// independently: first a `reset_rate` check, on its own, that replaces the
/// weight outright with a fresh draw from N(0, 2*sigma) — a wider spread
/// than an ordinary nudge, so a reset can actually escape a local optimum
/// rather than land right back near it. Only if that roll doesn't fire does
/// the weight get the ordinary `rate`-probability additive N(0, sigma)
/// nudge. The two rolls are not nested — a weight cannot be both reset and
/// nudged in the same call.
pub fn mutate(weights: &mut [f32], config: &MutationConfig, rng: &mut SimRng) {
    for w in weights.iter_mut() {
        if rng.random_bool(config.reset_rate as f64) {
            *w = rng.next_gaussian(2.0 * config.sigma);
        } else if rng.random_bool(config.rate as f64) {
            *w += rng.next_gaussian(config.sigma);
        }
    }
}

/// Pick one winner from `tournament_size` uniformly-drawn candidates.
fn tournament_select<'a>(population: &'a [Individual], tournament_size: usize, rng: &mut SimRng) -> &'a Individual {
    let mut best: Option<&Individual> = None;
    for _ in 0..tournament_size.max(1) {
        let candidate = &population[rng.range_usize(0, population.len())];
        best = match best {
            Some(b) if b.fitness >= candidate.fitness => Some(b),
            _ => Some(candidate),
        };
    }
    best.expect("tournament_size.max(1) guarantees at least one draw")
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvolutionProgress {
    pub generation: u32,
    pub best_fitness: f32,
    pub mean_fitness: f32,
    pub population_size: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Population {
    pub individuals: Vec<Individual>,
    pub generation: u32,
}

impl Population {
    /// Seed a fresh population of randomly-initialized genomes. Fitness is
    /// left at 0.0 until the caller evaluates each individual.
    pub fn seed(
        genome_len: usize,
        config: &EvolutionConfig,
        rng: &mut SimRng,
        mut next_id: impl FnMut(&mut SimRng) -> GenomeId,
    ) -> Self {
        let individuals = (0..config.population_size)
            .map(|_| Individual {
                genome_id: next_id(rng),
                weights: (0..genome_len).map(|_| rng.next_gaussian(1.0)).collect(),
                fitness: 0.0,
            })
            .collect();
        Self { individuals, generation: 0 }
    }

    pub fn best(&self) -> Option<&Individual> {
        self.individuals.iter().max_by(|a, b| a.fitness.partial_cmp(&b.fitness).unwrap())
    }

    pub fn progress(&self) -> EvolutionProgress {
        let sum: f32 = self.individuals.iter().map(|i| i.fitness).sum();
        let population_size = self.individuals.len();
        EvolutionProgress {
            generation: self.generation,
            best_fitness: self.best().map(|b| b.fitness).unwrap_or(0.0),
            mean_fitness: if population_size == 0 { 0.0 } else { sum / population_size as f32 },
            population_size,
        }
    }

    /// Elitist replacement: the single best individual survives unchanged;
    /// every other slot is filled by a tournament winner's mutated offspring.
    pub fn advance_generation(
        &mut self,
        mutation: &MutationConfig,
        tournament_size: usize,
        rng: &mut SimRng,
        mut next_id: impl FnMut(&mut SimRng) -> GenomeId,
    ) {
        let Some(elite) = self.best().cloned() else { return };
        let mut next_generation = Vec::with_capacity(self.individuals.len());
        next_generation.push(elite);
        while next_generation.len() < self.individuals.len() {
            let parent = tournament_select(&self.individuals, tournament_size, rng);
            let mut weights = parent.weights.clone();
            mutate(&mut weights, mutation, rng);
            next_generation.push(Individual { genome_id: next_id(rng), weights, fitness: 0.0 });
        }
        self.individuals = next_generation;
        self.generation += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id_factory() -> impl FnMut(&mut SimRng) -> GenomeId {
        |rng: &mut SimRng| GenomeId::new(rng)
    }

    #[test]
    fn fitness_rewards_survival_and_energy() {
        let config = EvolutionConfig { max_simulation_time_seconds: 100.0, energy_reference: 50.0, ..Default::default() };
        let died_early = fitness(10.0, 0.0, &config);
        let survived_full = fitness(100.0, 0.0, &config);
        let survived_with_energy = fitness(100.0, 50.0, &config);
        assert!(survived_full > died_early);
        assert!(survived_with_energy > survived_full);
    }

    #[test]
    fn fitness_clamps_overlong_lifespan() {
        let config = EvolutionConfig::default();
        let a = fitness(config.max_simulation_time_seconds, 0.0, &config);
        let b = fitness(config.max_simulation_time_seconds * 10.0, 0.0, &config);
        assert!((a - b).abs() < 1e-6);
    }

    #[test]
    fn mutate_is_deterministic_given_same_seed() {
        let config = MutationConfig::default();
        let mut weights_a = vec![0.0; 100];
        let mut weights_b = vec![0.0; 100];
        let mut rng_a = SimRng::new(7);
        let mut rng_b = SimRng::new(7);
        mutate(&mut weights_a, &config, &mut rng_a);
        mutate(&mut weights_b, &config, &mut rng_b);
        assert_eq!(weights_a, weights_b);
    }

    #[test]
    fn mutate_reset_branch_does_not_require_the_nudge_roll() {
        // reset_rate = 1.0, rate = 0.0: every weight must still change,
        // proving the reset check isn't nested inside the `rate` check.
        let config = MutationConfig { rate: 0.0, sigma: 0.3, reset_rate: 1.0 };
        let mut weights = vec![0.0; 50];
        let mut rng = SimRng::new(11);
        mutate(&mut weights, &config, &mut rng);
        assert!(weights.iter().any(|&w| w != 0.0));
    }

    #[test]
    fn mutate_leaves_weights_alone_when_neither_roll_fires() {
        let config = MutationConfig { rate: 0.0, sigma: 0.3, reset_rate: 0.0 };
        let mut weights = vec![1.0; 20];
        let mut rng = SimRng::new(5);
        mutate(&mut weights, &config, &mut rng);
        assert_eq!(weights, vec![1.0; 20]);
    }

    #[test]
    fn advance_generation_keeps_the_elite_unchanged() {
        let mut rng = SimRng::new(3);
        let evo_config = EvolutionConfig { population_size: 6, ..Default::default() };
        let mut population = Population::seed(4, &evo_config, &mut rng, id_factory());
        for (i, individual) in population.individuals.iter_mut().enumerate() {
            individual.fitness = i as f32;
        }
        let best_before = population.best().unwrap().clone();
        population.advance_generation(&MutationConfig::default(), 3, &mut rng, id_factory());
        assert_eq!(population.individuals[0].weights, best_before.weights);
        assert_eq!(population.generation, 1);
    }

    #[test]
    fn seed_produces_requested_population_size() {
        let mut rng = SimRng::new(1);
        let config = EvolutionConfig { population_size: 10, ..Default::default() };
        let population = Population::seed(16, &config, &mut rng, id_factory());
        assert_eq!(population.individuals.len(), 10);
        assert_eq!(population.individuals[0].weights.len(), 16);
    }
}
