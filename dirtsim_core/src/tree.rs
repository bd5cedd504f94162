// Tree growth: sensory gathering, brain consultation, command validation,
// and the in-flight command timer. Each tick: consult the tree's brain,
// validate the chosen command, charge its execution timer, and apply the
// effect once the timer completes — a single in-flight growth command per
// tree rather than a queue of them.

use crate::brain::{gather_tree_sensory, TreeBrain, TREE_COMMAND_LOGITS};
use crate::command::{InFlightCommand, TreeCommand};
use crate::grid::Grid;
use crate::organism::OrganismManager;
use crate::types::{CellPos, GrowthStage, Material, OrganismId};
use serde::{Deserialize, Serialize};

/// Energy cost charged when a growth command is accepted.
fn energy_cost(command: TreeCommand) -> f32 {
    match command {
        TreeCommand::Wait | TreeCommand::Cancel => 0.0,
        TreeCommand::GrowWood(_) => 4.0,
        TreeCommand::GrowLeaf(_) => 1.0,
        TreeCommand::GrowRoot(_) => 3.0,
        TreeCommand::ReinforceCell(_) => 1.0,
        TreeCommand::ProduceSeed(_) => 8.0,
    }
}

/// Reasons a growth command is rejected before any state is touched, charging
/// no energy. Matches the "validation errors ... charged no energy" policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TreeCommandRejection {
    NotAdjacent,
    InsufficientEnergy,
    TargetOccupied,
    OutOfBounds,
    BusyWithAnotherCommand,
}

/// Per-organism tree state: energy/water accumulators, growth stage, and the
/// command currently in flight (if any).
#[derive(Serialize, Deserialize)]
pub struct Tree {
    pub organism_id: OrganismId,
    #[serde(skip, default = "default_brain")]
    pub brain: Box<dyn TreeBrain + Send + Sync>,
    pub total_energy: f32,
    pub total_water: f32,
    pub age_seconds: f32,
    pub stage: GrowthStage,
    pub current_action: Option<InFlightCommand>,
}

fn default_brain() -> Box<dyn TreeBrain + Send + Sync> {
    Box::new(crate::brain::IdleTreeBrain)
}

impl Tree {
    pub fn new(organism_id: OrganismId, brain: Box<dyn TreeBrain + Send + Sync>) -> Self {
        Self {
            organism_id,
            brain,
            total_energy: 0.0,
            total_water: 0.0,
            age_seconds: 0.0,
            stage: GrowthStage::Seed,
            current_action: None,
        }
    }

    fn one_hot(&self) -> [f32; TREE_COMMAND_LOGITS] {
        let mut one_hot = [0.0; TREE_COMMAND_LOGITS];
        if let Some(in_flight) = &self.current_action {
            one_hot[in_flight.command.discriminant()] = 1.0;
        }
        one_hot
    }

    fn action_progress(&self) -> f32 {
        match &self.current_action {
            Some(in_flight) => {
                let total = in_flight.command.execution_time().max(1e-6);
                (1.0 - in_flight.remaining_time / total).clamp(0.0, 1.0)
            }
            None => 0.0,
        }
    }

    /// Validate a command against the world. Does not mutate anything.
    fn validate(&self, grid: &Grid, organisms: &OrganismManager, anchor: CellPos, command: TreeCommand) -> Result<(), TreeCommandRejection> {
        let Some(target) = command.target() else {
            return Ok(());
        };
        if !grid.in_bounds(target) {
            return Err(TreeCommandRejection::OutOfBounds);
        }
        let Some(cell) = grid.at(target) else {
            return Err(TreeCommandRejection::OutOfBounds);
        };
        if matches!(command, TreeCommand::ReinforceCell(_)) {
            // Reinforcing requires an already-owned cell, not an empty one.
            if organisms.owner_of(target) != Some(self.organism_id) {
                return Err(TreeCommandRejection::TargetOccupied);
            }
        } else if cell.material != Material::Air {
            return Err(TreeCommandRejection::TargetOccupied);
        }
        let organism = organisms.get(self.organism_id);
        let adjacent = organism.is_some_and(|o| {
            o.cells.iter().any(|&c| c.manhattan_distance(target) == 1) || target == anchor
        });
        if !adjacent {
            return Err(TreeCommandRejection::NotAdjacent);
        }
        if self.total_energy < energy_cost(command) {
            return Err(TreeCommandRejection::InsufficientEnergy);
        }
        Ok(())
    }

    /// Advance one tick: gather sensory, consult the brain (unless a
    /// non-instant command is in progress and not Wait/Cancel), validate,
    /// deduct energy, schedule. Advances any in-progress timer and applies
    /// the command's effect on completion.
    pub fn update(
        &mut self,
        grid: &mut Grid,
        organisms: &mut OrganismManager,
        dt: f32,
    ) {
        self.age_seconds += dt;
        self.advance_stage();

        let Some(organism) = organisms.get(self.organism_id) else { return };
        let anchor = organism.anchor_cell;

        if let Some(mut in_flight) = self.current_action.take() {
            if in_flight.tick(dt) {
                self.apply_command(grid, organisms, anchor, in_flight.command);
            } else {
                self.current_action = Some(in_flight);
                return;
            }
        }

        let sensory = gather_tree_sensory(
            grid,
            anchor,
            self.total_energy,
            self.total_water,
            self.age_seconds,
            self.stage,
            self.one_hot(),
            self.action_progress(),
        );
        let command = self.brain.decide(&sensory);

        if matches!(command, TreeCommand::Wait) {
            return;
        }
        if matches!(command, TreeCommand::Cancel) {
            self.current_action = None;
            return;
        }

        if self.validate(grid, organisms, anchor, command).is_ok() {
            self.total_energy -= energy_cost(command);
            self.current_action = Some(InFlightCommand::new(command));
        }
        // Rejected commands are simply dropped: no energy charged, brain
        // observes `current_action == None` again next tick.
    }

    fn apply_command(&mut self, grid: &mut Grid, organisms: &mut OrganismManager, anchor: CellPos, command: TreeCommand) {
        let Some(target) = command.target() else { return };
        if matches!(command, TreeCommand::ReinforceCell(_)) {
            let _ = organisms.reinforce_bones_at(self.organism_id, target);
            return;
        }
        let material = match command {
            TreeCommand::GrowWood(_) => Material::Wood,
            TreeCommand::GrowLeaf(_) => Material::Leaf,
            TreeCommand::GrowRoot(_) => Material::Root,
            TreeCommand::ProduceSeed(_) => Material::Seed,
            TreeCommand::ReinforceCell(_) => unreachable!("handled above"),
            TreeCommand::Wait | TreeCommand::Cancel => return,
        };
        let Some(cell_material_before) = grid.at(target).map(|c| c.material) else { return };
        if cell_material_before != Material::Air {
            return;
        }
        grid.replace_material(target, material, 1.0);
        if organisms.add_cell_to_organism(self.organism_id, target).is_err() {
            return;
        }
        for neighbor in target.face_neighbors() {
            if organisms.owner_of(neighbor) == Some(self.organism_id) {
                let neighbor_material = grid.at(neighbor).map(|c| c.material).unwrap_or(Material::Air);
                let _ = organisms.add_bone(self.organism_id, target, neighbor, material, neighbor_material);
            }
        }
        let _ = anchor; // anchor retained for symmetry with validate(); no-op here.
    }

    fn advance_stage(&mut self) {
        // Open question: precise per-scenario thresholds are left to the
        // scenario layer; these are reasonable defaults for a standalone
        // tree with no scenario override.
        self.stage = match (self.age_seconds, self.total_energy) {
            (age, _) if age < 5.0 => GrowthStage::Seed,
            (age, _) if age < 10.0 => GrowthStage::Germination,
            (_, energy) if energy < 100.0 => GrowthStage::Sapling,
            (age, _) if age < 600.0 => GrowthStage::Mature,
            _ => GrowthStage::Decline,
        }
        .max(self.stage);
    }

    /// Consume water from an adjacent Water cell at a fixed per-tick rate,
    /// for every Root cell this tree owns.
    pub fn absorb_water(&mut self, grid: &mut Grid, organisms: &OrganismManager, dt: f32) {
        const WATER_RATE: f32 = 0.5;
        let Some(organism) = organisms.get(self.organism_id) else { return };
        let root_cells: Vec<CellPos> = organism
            .cells
            .iter()
            .copied()
            .filter(|&p| grid.at(p).is_some_and(|c| c.material == Material::Root))
            .collect();
        for root in root_cells {
            for neighbor in root.face_neighbors() {
                if let Some(cell) = grid.at_mut(neighbor) {
                    if cell.material == Material::Water && cell.fill_ratio > 0.0 {
                        let drawn = (WATER_RATE * dt).min(cell.fill_ratio);
                        cell.fill_ratio -= drawn;
                        if cell.fill_ratio <= 0.0 {
                            cell.material = Material::Air;
                        }
                        self.total_water += drawn * 10.0;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::IdleTreeBrain;

    fn spawn_tree(grid: &mut Grid, organisms: &mut OrganismManager, pos: CellPos) -> Tree {
        let id = organisms.create_tree(grid, pos).unwrap();
        Tree::new(id, Box::new(IdleTreeBrain))
    }

    #[test]
    fn idle_brain_never_grows() {
        let mut grid = Grid::new(9, 9);
        let mut organisms = OrganismManager::new();
        let mut tree = spawn_tree(&mut grid, &mut organisms, CellPos::new(4, 4));
        tree.total_energy = 100.0;
        for _ in 0..100 {
            tree.update(&mut grid, &mut organisms, 1.0 / 60.0);
        }
        assert_eq!(organisms.get(tree.organism_id).unwrap().cells.len(), 1);
    }

    #[test]
    fn command_completes_after_its_execution_time_and_grows_a_cell() {
        let mut grid = Grid::new(9, 9);
        let mut organisms = OrganismManager::new();
        let mut tree = spawn_tree(&mut grid, &mut organisms, CellPos::new(4, 4));
        tree.total_energy = 50.0;
        tree.current_action = Some(InFlightCommand::new(TreeCommand::GrowRoot(CellPos::new(4, 5))));

        for _ in 0..121 {
            tree.update(&mut grid, &mut organisms, 1.0 / 60.0);
        }
        assert_eq!(grid.at(CellPos::new(4, 5)).unwrap().material, Material::Root);
        assert!(organisms.get(tree.organism_id).unwrap().cells.contains(&CellPos::new(4, 5)));
    }

    #[test]
    fn reinforce_cell_strengthens_an_existing_bone() {
        let mut grid = Grid::new(9, 9);
        let mut organisms = OrganismManager::new();
        let anchor = CellPos::new(4, 4);
        let mut tree = spawn_tree(&mut grid, &mut organisms, anchor);
        let neighbor = CellPos::new(4, 5);
        grid.replace_material(neighbor, Material::Wood, 1.0);
        organisms.add_cell_to_organism(tree.organism_id, neighbor).unwrap();
        organisms.add_bone(tree.organism_id, anchor, neighbor, Material::Seed, Material::Wood).unwrap();
        let before = organisms.get(tree.organism_id).unwrap().bones[0].stiffness;

        tree.total_energy = 10.0;
        tree.current_action = Some(InFlightCommand::new(TreeCommand::ReinforceCell(neighbor)));
        for _ in 0..31 {
            tree.update(&mut grid, &mut organisms, 1.0 / 60.0);
        }

        let after = organisms.get(tree.organism_id).unwrap().bones[0].stiffness;
        assert!(after > before, "reinforcement should have increased stiffness: {before} -> {after}");
    }

    #[test]
    fn reinforcing_an_unowned_cell_is_rejected() {
        let mut grid = Grid::new(9, 9);
        let mut organisms = OrganismManager::new();
        let anchor = CellPos::new(4, 4);
        let tree = spawn_tree(&mut grid, &mut organisms, anchor);
        grid.replace_material(CellPos::new(4, 5), Material::Wood, 1.0);
        let result = tree.validate(&grid, &organisms, anchor, TreeCommand::ReinforceCell(CellPos::new(4, 5)));
        assert_eq!(result, Err(TreeCommandRejection::TargetOccupied));
    }

    #[test]
    fn rejected_command_charges_no_energy() {
        let mut grid = Grid::new(9, 9);
        let mut organisms = OrganismManager::new();
        let tree = spawn_tree(&mut grid, &mut organisms, CellPos::new(4, 4));
        let anchor = organisms.get(tree.organism_id).unwrap().anchor_cell;
        let far_target = CellPos::new(0, 0);
        let result = tree.validate(&grid, &organisms, anchor, TreeCommand::GrowWood(far_target));
        assert_eq!(result, Err(TreeCommandRejection::NotAdjacent));
    }

    #[test]
    fn absorb_water_drains_adjacent_water_cell() {
        let mut grid = Grid::new(9, 9);
        let mut organisms = OrganismManager::new();
        let mut tree = spawn_tree(&mut grid, &mut organisms, CellPos::new(4, 4));
        grid.replace_material(CellPos::new(4, 4), Material::Root, 1.0);
        grid.replace_material(CellPos::new(4, 5), Material::Water, 1.0);
        for _ in 0..10 {
            tree.absorb_water(&mut grid, &organisms, 1.0 / 60.0);
        }
        assert!(tree.total_water > 0.0);
        assert!(grid.at(CellPos::new(4, 5)).unwrap().fill_ratio < 1.0);
    }
}
