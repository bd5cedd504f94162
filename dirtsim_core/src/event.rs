// Simulation events — the internal scheduling queue plus player-visible
// narrative events.
//
// This file defines two related but distinct concepts:
// - `ScheduledEvent`: internal events in the priority queue that drive per-tick
//   organism heartbeats and in-flight command completions.
// - `SimEvent`: player-visible narrative events emitted as output (organism
//   spawned, died, evolution generation advanced).
//
// See also: `sim.rs` for the tick loop that drains scheduled events, `types.rs`
// for `OrganismId`.
//
// **Critical constraint: determinism.** Event ordering must be identical
// across all runs given the same seed. The `(tick, sequence)` key provides a
// total order, breaking ties by insertion order rather than by organism id.

use crate::types::OrganismId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

// ---------------------------------------------------------------------------
// Internal scheduled events (priority queue)
// ---------------------------------------------------------------------------

/// An event scheduled for future processing by the simulation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduledEvent {
    /// The tick at which this event should fire.
    pub tick: u64,
    /// Unique ordering key for deterministic tiebreaking within a tick.
    /// Lower values are processed first.
    pub sequence: u64,
    /// What should happen when this event fires.
    pub kind: ScheduledEventKind,
}

/// The types of internal events the sim can schedule.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ScheduledEventKind {
    /// Periodic heartbeat for a tree (sensory/brain/command cycle).
    TreeHeartbeat { organism_id: OrganismId },
    /// Periodic heartbeat for a duck (ground/brain/movement cycle).
    DuckHeartbeat { organism_id: OrganismId },
    /// An in-flight tree command's execution time has elapsed.
    TreeCommandComplete { organism_id: OrganismId },
}

// We want a min-heap: lowest (tick, sequence) fires first.
// Rust's BinaryHeap is a max-heap, so we reverse the ordering.
impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.tick == other.tick && self.sequence == other.sequence
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .tick
            .cmp(&self.tick)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Priority queue of scheduled events. Wraps a `BinaryHeap` with reversed
/// ordering to give us a min-heap (earliest tick fires first).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EventQueue {
    heap: BinaryHeap<ScheduledEvent>,
    /// Monotonic counter for deterministic ordering within a tick.
    next_sequence: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule an event at the given tick.
    pub fn schedule(&mut self, tick: u64, kind: ScheduledEventKind) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(ScheduledEvent {
            tick,
            sequence,
            kind,
        });
    }

    /// Peek at the next event's tick without removing it.
    pub fn peek_tick(&self) -> Option<u64> {
        self.heap.peek().map(|e| e.tick)
    }

    /// Pop the next event if its tick is <= `up_to_tick`.
    pub fn pop_if_ready(&mut self, up_to_tick: u64) -> Option<ScheduledEvent> {
        if self.heap.peek().is_some_and(|e| e.tick <= up_to_tick) {
            self.heap.pop()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Player-visible narrative events (output)
// ---------------------------------------------------------------------------

/// A narrative event emitted by the simulation for broadcast to clients.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimEvent {
    pub tick: u64,
    pub kind: SimEventKind,
}

/// Types of narrative events visible to a client.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum SimEventKind {
    /// A new organism has spawned (tree seed planted, duck dropped).
    OrganismSpawned { organism_id: OrganismId },
    /// An organism has been removed from the world (died, destroyed).
    OrganismRemoved { organism_id: OrganismId },
    /// A tree transitioned growth stage.
    StageChanged { organism_id: OrganismId },
    /// Evolution advanced to a new generation.
    GenerationAdvanced { generation: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_queue_ordering() {
        let a = OrganismId(1);
        let b = OrganismId(2);

        let mut queue = EventQueue::new();
        queue.schedule(100, ScheduledEventKind::TreeHeartbeat { organism_id: b });
        queue.schedule(50, ScheduledEventKind::TreeHeartbeat { organism_id: a });
        queue.schedule(50, ScheduledEventKind::TreeHeartbeat { organism_id: b });

        let first = queue.pop_if_ready(200).unwrap();
        assert_eq!(first.tick, 50);
        assert_eq!(first.sequence, 1);

        let second = queue.pop_if_ready(200).unwrap();
        assert_eq!(second.tick, 50);
        assert_eq!(second.sequence, 2);

        let third = queue.pop_if_ready(200).unwrap();
        assert_eq!(third.tick, 100);

        assert!(queue.pop_if_ready(200).is_none());
    }

    #[test]
    fn pop_if_ready_respects_tick_limit() {
        let organism_id = OrganismId(7);

        let mut queue = EventQueue::new();
        queue.schedule(100, ScheduledEventKind::DuckHeartbeat { organism_id });

        assert!(queue.pop_if_ready(99).is_none());
        assert!(queue.pop_if_ready(100).is_some());
    }

    #[test]
    fn event_queue_serialization() {
        let organism_id = OrganismId(3);

        let mut queue = EventQueue::new();
        queue.schedule(10, ScheduledEventKind::TreeHeartbeat { organism_id });
        queue.schedule(20, ScheduledEventKind::TreeHeartbeat { organism_id });

        let json = serde_json::to_string(&queue).unwrap();
        let mut restored: EventQueue = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.len(), 2);
        let first = restored.pop_if_ready(100).unwrap();
        assert_eq!(first.tick, 10);
    }
}
