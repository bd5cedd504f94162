// Top-level server state machine: Idle / SimRunning / Evolution / Shutdown,
// plus RPC correlation-token bookkeeping for requests awaiting a reply.
// A single enum with an explicit legal-transition table, paired with a
// pending-request map keyed by correlation id for timeout bookkeeping.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default time a caller waits for a reply before the request is considered
/// timed out.
pub const DEFAULT_RPC_TIMEOUT_SECONDS: f32 = 5.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerState {
    /// No world loaded; only scenario/genome listing and world-creation
    /// commands are valid.
    Idle,
    /// A world is ticking; most commands are valid.
    SimRunning,
    /// An evolution run owns the tick loop; only evolution control and
    /// read-only commands are valid.
    Evolution,
    /// Draining in-flight requests before exit.
    Shutdown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Reset,
    SimRun,
    SimStop,
    EvolutionStart,
    EvolutionStop,
    Exit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IllegalTransition {
    pub from: ServerState,
    pub transition: Transition,
}

impl ServerState {
    /// Apply a transition, or reject it if it isn't legal from the current
    /// state. `Exit` is legal from every state except `Shutdown` itself
    /// (idempotent: already shutting down).
    pub fn apply(self, transition: Transition) -> Result<ServerState, IllegalTransition> {
        use ServerState::*;
        use Transition::*;
        let next = match (self, transition) {
            (_, Exit) if self != Shutdown => Shutdown,
            (Idle, Reset) => Idle,
            (Idle, SimRun) => SimRunning,
            (SimRunning, Reset) => SimRunning,
            (SimRunning, SimStop) => Idle,
            (SimRunning, EvolutionStart) => Evolution,
            (Idle, EvolutionStart) => Evolution,
            (Evolution, EvolutionStop) => Idle,
            _ => return Err(IllegalTransition { from: self, transition }),
        };
        Ok(next)
    }
}

/// One RPC request awaiting a reply, tracked by its correlation token.
#[derive(Clone, Debug)]
pub struct PendingRequest {
    pub correlation_id: u64,
    pub elapsed_seconds: f32,
    pub timeout_seconds: f32,
}

impl PendingRequest {
    pub fn new(correlation_id: u64) -> Self {
        Self { correlation_id, elapsed_seconds: 0.0, timeout_seconds: DEFAULT_RPC_TIMEOUT_SECONDS }
    }

    pub fn with_timeout(correlation_id: u64, timeout_seconds: f32) -> Self {
        Self { correlation_id, elapsed_seconds: 0.0, timeout_seconds }
    }

    pub fn is_expired(&self) -> bool {
        self.elapsed_seconds >= self.timeout_seconds
    }
}

/// Tracks in-flight requests by correlation token and the current server
/// state, rejecting dispatch of commands that aren't legal in that state.
#[derive(Debug, Default)]
pub struct Dispatcher {
    state: ServerStateCell,
    pending: BTreeMap<u64, PendingRequest>,
}

/// Newtype so `Default` can pick `ServerState::Idle` without requiring
/// `ServerState` itself to implement `Default` (it shouldn't: every other
/// state is reachable only via an explicit transition, never a blank one).
#[derive(Debug)]
struct ServerStateCell(ServerState);

impl Default for ServerStateCell {
    fn default() -> Self {
        ServerStateCell(ServerState::Idle)
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ServerState {
        self.state.0
    }

    pub fn transition(&mut self, transition: Transition) -> Result<ServerState, IllegalTransition> {
        let next = self.state.0.apply(transition)?;
        self.state.0 = next;
        Ok(next)
    }

    pub fn begin_request(&mut self, correlation_id: u64) {
        self.pending.insert(correlation_id, PendingRequest::new(correlation_id));
    }

    pub fn complete_request(&mut self, correlation_id: u64) -> Option<PendingRequest> {
        self.pending.remove(&correlation_id)
    }

    /// Advance every pending request's clock by `dt`, returning the
    /// correlation ids that have now timed out (and removing them).
    pub fn tick_timeouts(&mut self, dt: f32) -> Vec<u64> {
        let mut expired = Vec::new();
        for request in self.pending.values_mut() {
            request.elapsed_seconds += dt;
        }
        self.pending.retain(|id, request| {
            if request.is_expired() {
                expired.push(*id);
                false
            } else {
                true
            }
        });
        expired
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
