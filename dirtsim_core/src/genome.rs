// In-memory, content-addressed genome repository: a `BTreeMap` keyed by a
// UUID-like id, plus a handful of query helpers and a separate
// best-per-scenario pointer map.

use crate::types::{GenomeId, OrganismKind, TrainingSessionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrainKind {
    Idle,
    Random,
    WallBouncing,
    Neural,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenomeMetadata {
    pub name: String,
    pub fitness: f32,
    pub robust_fitness: Option<f32>,
    pub robust_eval_count: u32,
    pub robust_samples: Vec<f32>,
    pub generation: u32,
    pub created_timestamp: u64,
    pub scenario_id: String,
    pub notes: String,
    pub organism_type: Option<OrganismKind>,
    pub brain_kind: Option<BrainKind>,
    pub brain_variant: Option<String>,
    pub training_session_id: Option<TrainingSessionId>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredGenome {
    pub id: GenomeId,
    pub weights: Vec<f32>,
    pub metadata: GenomeMetadata,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GenomeRepository {
    entries: BTreeMap<GenomeId, StoredGenome>,
    best: BTreeMap<String, GenomeId>,
}

impl GenomeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&mut self, id: GenomeId, weights: Vec<f32>, metadata: GenomeMetadata) {
        self.entries.insert(id, StoredGenome { id, weights, metadata });
    }

    pub fn get(&self, id: GenomeId) -> Option<&StoredGenome> {
        self.entries.get(&id)
    }

    /// List every stored genome, deterministically ordered by id.
    pub fn list(&self) -> Vec<&StoredGenome> {
        self.entries.values().collect()
    }

    /// List genomes for one scenario, sorted by descending fitness.
    pub fn list_for_scenario(&self, scenario_id: &str) -> Vec<&StoredGenome> {
        let mut matching: Vec<&StoredGenome> = self
            .entries
            .values()
            .filter(|g| g.metadata.scenario_id == scenario_id)
            .collect();
        matching.sort_by(|a, b| b.metadata.fitness.partial_cmp(&a.metadata.fitness).unwrap());
        matching
    }

    pub fn delete(&mut self, id: GenomeId) -> bool {
        let removed = self.entries.remove(&id).is_some();
        self.best.retain(|_, v| *v != id);
        removed
    }

    /// Mark `id` as the best genome for `scenario_id`. The caller is
    /// responsible for checking `id` actually exists.
    pub fn mark_as_best(&mut self, scenario_id: &str, id: GenomeId) -> bool {
        if !self.entries.contains_key(&id) {
            return false;
        }
        self.best.insert(scenario_id.to_string(), id);
        true
    }

    pub fn get_best(&self, scenario_id: &str) -> Option<&StoredGenome> {
        self.best.get(scenario_id).and_then(|id| self.entries.get(id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirtsim_prng::SimRng;

    fn metadata(name: &str, fitness: f32, scenario: &str) -> GenomeMetadata {
        GenomeMetadata {
            name: name.to_string(),
            fitness,
            robust_fitness: None,
            robust_eval_count: 0,
            robust_samples: Vec::new(),
            generation: 0,
            created_timestamp: 0,
            scenario_id: scenario.to_string(),
            notes: String::new(),
            organism_type: Some(OrganismKind::Tree),
            brain_kind: Some(BrainKind::Neural),
            brain_variant: None,
            training_session_id: None,
        }
    }

    #[test]
    fn store_and_get_roundtrips() {
        let mut rng = SimRng::new(1);
        let mut repo = GenomeRepository::new();
        let id = GenomeId::new(&mut rng);
        repo.store(id, vec![1.0, 2.0, 3.0], metadata("a", 0.5, "forest"));
        let stored = repo.get(id).unwrap();
        assert_eq!(stored.weights, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn list_for_scenario_sorts_by_descending_fitness() {
        let mut rng = SimRng::new(1);
        let mut repo = GenomeRepository::new();
        let low = GenomeId::new(&mut rng);
        let high = GenomeId::new(&mut rng);
        repo.store(low, vec![], metadata("low", 0.1, "forest"));
        repo.store(high, vec![], metadata("high", 0.9, "forest"));
        let list = repo.list_for_scenario("forest");
        assert_eq!(list[0].id, high);
        assert_eq!(list[1].id, low);
    }

    #[test]
    fn mark_as_best_requires_existing_genome() {
        let mut rng = SimRng::new(1);
        let mut repo = GenomeRepository::new();
        let ghost = GenomeId::new(&mut rng);
        assert!(!repo.mark_as_best("forest", ghost));
        let real = GenomeId::new(&mut rng);
        repo.store(real, vec![], metadata("real", 0.3, "forest"));
        assert!(repo.mark_as_best("forest", real));
        assert_eq!(repo.get_best("forest").unwrap().id, real);
    }

    #[test]
    fn delete_clears_best_pointer() {
        let mut rng = SimRng::new(1);
        let mut repo = GenomeRepository::new();
        let id = GenomeId::new(&mut rng);
        repo.store(id, vec![], metadata("a", 0.5, "forest"));
        repo.mark_as_best("forest", id);
        repo.delete(id);
        assert!(repo.get_best("forest").is_none());
        assert!(repo.get(id).is_none());
    }
}
