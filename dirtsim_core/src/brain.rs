// Brains — the pluggable decision capability trees and ducks consult each
// heartbeat. A brain is a pure function from sensory data to a command or
// movement input; `TreeBrain`/`DuckBrain` are trait objects so a scenario
// can hand an organism a rule-based brain (`IdleTreeBrain`,
// `WallBouncingDuckBrain`) or a trained one (`NeuralTreeBrain`)
// interchangeably.

use crate::command::TreeCommand;
use crate::types::{CellPos, GrowthStage, Material, NUM_MATERIALS};
use serde::{Deserialize, Serialize};

/// Side length of the square sensory window centered on a tree's anchor.
pub const TREE_SENSORY_GRID_SIZE: usize = 15;

/// Flattened length of a tree's sensory vector: a 15x15 material histogram
/// plus 9 scalar state fields.
pub const TREE_SENSORY_LEN: usize =
    TREE_SENSORY_GRID_SIZE * TREE_SENSORY_GRID_SIZE * NUM_MATERIALS + 9;

const TREE_HIDDEN: usize = 48;
pub const TREE_COMMAND_LOGITS: usize = 7;
const TREE_POSITION_LOGITS: usize = TREE_SENSORY_GRID_SIZE * TREE_SENSORY_GRID_SIZE;
const TREE_OUTPUT_LEN: usize = TREE_COMMAND_LOGITS + TREE_POSITION_LOGITS;

/// `2264*48 + 48 + 48*232 + 232 = 119936`. If this doesn't match, either the
/// sensory window or the hidden layer width drifted from the canonical
/// architecture and every previously-trained genome is now the wrong shape.
pub const TREE_GENOME_LEN: usize =
    TREE_SENSORY_LEN * TREE_HIDDEN + TREE_HIDDEN + TREE_HIDDEN * TREE_OUTPUT_LEN + TREE_OUTPUT_LEN;

const _: () = assert!(TREE_SENSORY_LEN == 2264);
const _: () = assert!(TREE_OUTPUT_LEN == 232);
const _: () = assert!(TREE_GENOME_LEN == 119_936);

/// What a tree brain perceives each heartbeat: a material-fill histogram
/// over a window centered on the anchor, plus scalar physiological state.
#[derive(Clone, Debug, PartialEq)]
pub struct TreeSensory {
    /// `[y][x][material]` fill contribution, `TREE_SENSORY_GRID_SIZE` square.
    pub histogram: Vec<[f32; NUM_MATERIALS]>,
    /// World-space position the (0,0) corner of the window maps to.
    pub world_offset: CellPos,
    /// Cell-units-per-window-cell scale (>1 when off-center clipping shrinks
    /// the effective window).
    pub scale: f32,
    pub total_energy: f32,
    pub total_water: f32,
    pub age_seconds: f32,
    pub stage: GrowthStage,
    /// One-hot of the in-progress command (all zero if idle).
    pub in_progress_one_hot: [f32; TREE_COMMAND_LOGITS],
    pub action_progress: f32,
}

impl TreeSensory {
    /// Flatten into the exact 2264-length vector the neural brain consumes:
    /// the histogram row-major, then `total_energy/200, total_water/100,
    /// age/100, stage/4, scale/10, reserved(0), the 7-wide one-hot,
    /// action_progress`.
    pub fn flatten(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(TREE_SENSORY_LEN);
        for row in &self.histogram {
            out.extend_from_slice(row);
        }
        out.push(self.total_energy / 200.0);
        out.push(self.total_water / 100.0);
        out.push(self.age_seconds / 100.0);
        out.push(self.stage as u8 as f32 / 4.0);
        out.push(self.scale / 10.0);
        out.push(0.0); // reserved
        out.extend_from_slice(&self.in_progress_one_hot);
        out.push(self.action_progress);
        debug_assert_eq!(out.len(), TREE_SENSORY_LEN);
        out
    }
}

/// A tree's decision capability: sensory data in, a command out.
pub trait TreeBrain {
    fn decide(&self, sensory: &TreeSensory) -> TreeCommand;
}

/// Input a duck brain supplies on its turn: desired horizontal movement and
/// whether to jump.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DuckInput {
    pub move_x: f32,
    pub jump: bool,
}

pub trait DuckBrain {
    fn think(&self, on_ground: bool, facing: [f32; 2], dt: f32) -> DuckInput;
}

/// Always wait — a harmless default/placeholder brain.
pub struct IdleTreeBrain;

impl TreeBrain for IdleTreeBrain {
    fn decide(&self, _sensory: &TreeSensory) -> TreeCommand {
        TreeCommand::Wait
    }
}

/// Feed-forward neural brain: `2264 -> 48 (ReLU) -> 232`, output partitioned
/// into 7 command logits and 225 position logits. Weight layout is the
/// concatenation `W_ih || b_h || W_ho || b_o`, flattened row-major.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NeuralTreeBrain {
    weights: Vec<f32>,
}

impl NeuralTreeBrain {
    /// Construct from a genome. Panics if `weights.len() != TREE_GENOME_LEN`
    /// — a length mismatch means the caller handed this brain someone
    /// else's genome, which is a programming error, not a runtime outcome
    /// this brain should silently paper over.
    pub fn new(weights: Vec<f32>) -> Self {
        assert_eq!(weights.len(), TREE_GENOME_LEN, "tree genome has wrong length");
        Self { weights }
    }

    pub fn get_genome(&self) -> &[f32] {
        &self.weights
    }

    pub fn set_genome(&mut self, weights: Vec<f32>) {
        assert_eq!(weights.len(), TREE_GENOME_LEN, "tree genome has wrong length");
        self.weights = weights;
    }

    fn forward(&self, input: &[f32]) -> [f32; TREE_OUTPUT_LEN] {
        let w_ih = &self.weights[0..TREE_SENSORY_LEN * TREE_HIDDEN];
        let mut offset = TREE_SENSORY_LEN * TREE_HIDDEN;
        let b_h = &self.weights[offset..offset + TREE_HIDDEN];
        offset += TREE_HIDDEN;
        let w_ho = &self.weights[offset..offset + TREE_HIDDEN * TREE_OUTPUT_LEN];
        offset += TREE_HIDDEN * TREE_OUTPUT_LEN;
        let b_o = &self.weights[offset..offset + TREE_OUTPUT_LEN];

        let mut hidden = [0f32; TREE_HIDDEN];
        for (h, hidden_val) in hidden.iter_mut().enumerate() {
            let mut sum = b_h[h];
            for (i, &x) in input.iter().enumerate() {
                sum += w_ih[i * TREE_HIDDEN + h] * x;
            }
            *hidden_val = sum.max(0.0);
        }

        let mut out = [0f32; TREE_OUTPUT_LEN];
        for (o, out_val) in out.iter_mut().enumerate() {
            let mut sum = b_o[o];
            for (h, &hv) in hidden.iter().enumerate() {
                sum += w_ho[h * TREE_OUTPUT_LEN + o] * hv;
            }
            *out_val = sum;
        }
        out
    }
}

fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for i in 1..values.len() {
        if values[i] > values[best] {
            best = i;
        }
    }
    best
}

impl TreeBrain for NeuralTreeBrain {
    fn decide(&self, sensory: &TreeSensory) -> TreeCommand {
        let input = sensory.flatten();
        let output = self.forward(&input);
        let command_idx = argmax(&output[0..TREE_COMMAND_LOGITS]);

        if command_idx == 0 {
            return TreeCommand::Wait;
        }
        if command_idx == 1 {
            return TreeCommand::Cancel;
        }

        let position_idx = argmax(&output[TREE_COMMAND_LOGITS..]);
        let nx = (position_idx % TREE_SENSORY_GRID_SIZE) as f32;
        let ny = (position_idx / TREE_SENSORY_GRID_SIZE) as f32;
        let world_x = sensory.world_offset.x as f32 + sensory.scale * nx;
        let world_y = sensory.world_offset.y as f32 + sensory.scale * ny;
        let target = CellPos::new(world_x.round() as i32, world_y.round() as i32);

        match command_idx {
            2 => TreeCommand::GrowWood(target),
            3 => TreeCommand::GrowLeaf(target),
            4 => TreeCommand::GrowRoot(target),
            5 => TreeCommand::ReinforceCell(target),
            _ => TreeCommand::ProduceSeed(target),
        }
    }
}

/// Builds a `TreeSensory` window centered on `anchor` from the grid,
/// clipping at world edges (off-center clipping reduces effective scale —
/// implemented here as a fixed scale of 1.0 cell per window cell, with
/// out-of-bounds window cells reading as all-zero histogram rows, which is
/// the simplest faithful rendering of "clip at the edge").
pub fn gather_tree_sensory(
    grid: &crate::grid::Grid,
    anchor: CellPos,
    total_energy: f32,
    total_water: f32,
    age_seconds: f32,
    stage: GrowthStage,
    in_progress_one_hot: [f32; TREE_COMMAND_LOGITS],
    action_progress: f32,
) -> TreeSensory {
    let half = (TREE_SENSORY_GRID_SIZE / 2) as i32;
    let world_offset = CellPos::new(anchor.x - half, anchor.y - half);
    let mut histogram = Vec::with_capacity(TREE_SENSORY_GRID_SIZE * TREE_SENSORY_GRID_SIZE);
    for wy in 0..TREE_SENSORY_GRID_SIZE as i32 {
        for wx in 0..TREE_SENSORY_GRID_SIZE as i32 {
            let pos = CellPos::new(world_offset.x + wx, world_offset.y + wy);
            let mut row = [0f32; NUM_MATERIALS];
            if let Some(cell) = grid.at(pos) {
                row[cell.material.index()] = cell.fill_ratio;
            }
            histogram.push(row);
        }
    }
    TreeSensory {
        histogram,
        world_offset,
        scale: 1.0,
        total_energy,
        total_water,
        age_seconds,
        stage,
        in_progress_one_hot,
        action_progress,
    }
}

/// A duck brain that never moves or jumps — used as a harmless control in
/// tests and as the default spawn for un-genomed ducks.
pub struct RandomDuckBrain {
    pub bias: f32,
}

impl DuckBrain for RandomDuckBrain {
    fn think(&self, _on_ground: bool, _facing: [f32; 2], _dt: f32) -> DuckInput {
        DuckInput { move_x: self.bias.clamp(-1.0, 1.0), jump: false }
    }
}

/// Bounces between walls: walks in `facing` direction, never jumps.
pub struct WallBouncingDuckBrain;

impl DuckBrain for WallBouncingDuckBrain {
    fn think(&self, _on_ground: bool, facing: [f32; 2], _dt: f32) -> DuckInput {
        DuckInput { move_x: facing[0].signum(), jump: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genome_length_matches_canonical_size() {
        assert_eq!(TREE_GENOME_LEN, 119_936);
    }

    #[test]
    fn zero_weights_produce_wait_command() {
        let brain = NeuralTreeBrain::new(vec![0.0; TREE_GENOME_LEN]);
        let sensory = gather_tree_sensory(
            &crate::grid::Grid::new(15, 15),
            CellPos::new(7, 7),
            100.0,
            50.0,
            10.0,
            GrowthStage::Sapling,
            [0.0; 7],
            0.0,
        );
        // All logits tie at zero; argmax picks index 0 (Wait) deterministically.
        assert_eq!(brain.decide(&sensory), TreeCommand::Wait);
    }

    #[test]
    fn deterministic_given_same_weights_and_sensory() {
        let weights: Vec<f32> = (0..TREE_GENOME_LEN).map(|i| ((i % 7) as f32 - 3.0) * 0.01).collect();
        let brain = NeuralTreeBrain::new(weights);
        let grid = crate::grid::Grid::new(15, 15);
        let sensory = gather_tree_sensory(
            &grid,
            CellPos::new(7, 7),
            20.0,
            5.0,
            1.0,
            GrowthStage::Seed,
            [0.0; 7],
            0.0,
        );
        assert_eq!(brain.decide(&sensory), brain.decide(&sensory));
    }

    #[test]
    fn sensory_flatten_has_canonical_length() {
        let grid = crate::grid::Grid::new(15, 15);
        let sensory = gather_tree_sensory(
            &grid,
            CellPos::new(7, 7),
            0.0,
            0.0,
            0.0,
            GrowthStage::Seed,
            [0.0; 7],
            0.0,
        );
        assert_eq!(sensory.flatten().len(), TREE_SENSORY_LEN);
    }

    #[test]
    fn get_set_genome_roundtrips() {
        let mut brain = NeuralTreeBrain::new(vec![0.5; TREE_GENOME_LEN]);
        let mut new_weights = vec![0.1; TREE_GENOME_LEN];
        new_weights[0] = 9.0;
        brain.set_genome(new_weights.clone());
        assert_eq!(brain.get_genome(), new_weights.as_slice());
    }
}
