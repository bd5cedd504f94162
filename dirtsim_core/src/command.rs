// Tree growth commands — the vocabulary a tree brain (rule-based or neural)
// emits once per heartbeat tick. Each command names an action plus a target
// cell; the organism module is responsible for checking feasibility (enough
// stored energy, target cell adjacent to the organism, etc.) before charging
// the command's execution time and applying its effect.
//
// This intentionally avoids a tick-queued `SimCommand { tick, action }`
// model that schedules a command for a specific future tick and replays
// it from a queue, which fits an RTS-style player command stream better
// than a tree's growth. A tree's growth command takes effect immediately
// once its execution time has elapsed — there's no queue, no future tick
// to target, just "this command is in flight, it completes
// `execution_time` seconds from now."

use crate::types::CellPos;
use serde::{Deserialize, Serialize};

/// One command a tree brain can issue. The brain's neural output head has
/// exactly as many command logits as there are variants here (`Wait` and
/// `Cancel` included), argmax-decoded — ordinal position is load-bearing.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum TreeCommand {
    /// Do nothing this tick.
    Wait,
    /// Abandon the tree's current in-flight command, if any.
    Cancel,
    /// Grow a wood cell at the given position.
    GrowWood(CellPos),
    /// Grow a leaf cell at the given position.
    GrowLeaf(CellPos),
    /// Grow a root cell at the given position.
    GrowRoot(CellPos),
    /// Strengthen an existing cell's bond to its neighbors.
    ReinforceCell(CellPos),
    /// Produce a seed at the given position, consuming stored energy.
    ProduceSeed(CellPos),
}

impl TreeCommand {
    /// The ordinal used by the neural brain's command output head (7-way).
    pub fn discriminant(self) -> usize {
        match self {
            TreeCommand::Wait => 0,
            TreeCommand::Cancel => 1,
            TreeCommand::GrowWood(_) => 2,
            TreeCommand::GrowLeaf(_) => 3,
            TreeCommand::GrowRoot(_) => 4,
            TreeCommand::ReinforceCell(_) => 5,
            TreeCommand::ProduceSeed(_) => 6,
        }
    }

    /// The target cell this command acts on, if any.
    pub fn target(self) -> Option<CellPos> {
        match self {
            TreeCommand::Wait | TreeCommand::Cancel => None,
            TreeCommand::GrowWood(p)
            | TreeCommand::GrowLeaf(p)
            | TreeCommand::GrowRoot(p)
            | TreeCommand::ReinforceCell(p)
            | TreeCommand::ProduceSeed(p) => Some(p),
        }
    }

    /// Seconds of execution time a command in flight takes to complete,
    /// charged against the organism's heartbeat clock before the effect
    /// applies.
    pub fn execution_time(self) -> f32 {
        match self {
            TreeCommand::Wait | TreeCommand::Cancel => 0.0,
            TreeCommand::GrowWood(_) => 3.0,
            TreeCommand::GrowLeaf(_) => 0.5,
            TreeCommand::GrowRoot(_) => 2.0,
            TreeCommand::ReinforceCell(_) => 0.5,
            TreeCommand::ProduceSeed(_) => 2.0,
        }
    }
}

/// A command that has been accepted and is counting down to completion.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct InFlightCommand {
    pub command: TreeCommand,
    pub remaining_time: f32,
}

impl InFlightCommand {
    pub fn new(command: TreeCommand) -> Self {
        Self {
            command,
            remaining_time: command.execution_time(),
        }
    }

    /// Advance the countdown by `dt` seconds. Returns `true` once the
    /// command's execution time has fully elapsed.
    pub fn tick(&mut self, dt: f32) -> bool {
        self.remaining_time -= dt;
        self.remaining_time <= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discriminants_are_stable_and_cover_seven_variants() {
        let all = [
            TreeCommand::Wait,
            TreeCommand::Cancel,
            TreeCommand::GrowWood(CellPos::new(0, 0)),
            TreeCommand::GrowLeaf(CellPos::new(0, 0)),
            TreeCommand::GrowRoot(CellPos::new(0, 0)),
            TreeCommand::ReinforceCell(CellPos::new(0, 0)),
            TreeCommand::ProduceSeed(CellPos::new(0, 0)),
        ];
        for (i, cmd) in all.iter().enumerate() {
            assert_eq!(cmd.discriminant(), i);
        }
    }

    #[test]
    fn wait_and_cancel_have_no_target_and_no_time() {
        assert_eq!(TreeCommand::Wait.target(), None);
        assert_eq!(TreeCommand::Cancel.target(), None);
        assert_eq!(TreeCommand::Wait.execution_time(), 0.0);
        assert_eq!(TreeCommand::Cancel.execution_time(), 0.0);
    }

    #[test]
    fn grow_commands_carry_their_target() {
        let p = CellPos::new(3, 4);
        assert_eq!(TreeCommand::GrowWood(p).target(), Some(p));
        assert_eq!(TreeCommand::ProduceSeed(p).target(), Some(p));
    }

    #[test]
    fn execution_times_match_defaults() {
        let p = CellPos::new(0, 0);
        assert_eq!(TreeCommand::GrowWood(p).execution_time(), 3.0);
        assert_eq!(TreeCommand::GrowLeaf(p).execution_time(), 0.5);
        assert_eq!(TreeCommand::GrowRoot(p).execution_time(), 2.0);
        assert_eq!(TreeCommand::ReinforceCell(p).execution_time(), 0.5);
        assert_eq!(TreeCommand::ProduceSeed(p).execution_time(), 2.0);
    }

    #[test]
    fn in_flight_command_completes_after_its_execution_time() {
        let mut cmd = InFlightCommand::new(TreeCommand::GrowLeaf(CellPos::new(1, 1)));
        assert!(!cmd.tick(0.3));
        assert!(cmd.tick(0.3));
    }
}
