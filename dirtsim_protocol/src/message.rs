// Wire protocol: every inbound `Command` a client can send, the matching
// `CommandResult` the server answers with, and the typed `DirtError` kinds
// a request can fail with. One flat enum per direction, correlation id
// carried alongside both. This is a request/response RPC model: every
// `Command` gets exactly one `Response` bearing the same correlation id —
// there is no broadcast concept at this layer.

use crate::types::CorrelationId;
use dirtsim_core::evolution::EvolutionConfig;
use dirtsim_core::genome::GenomeMetadata;
use dirtsim_core::scenario::ScenarioConfig;
use dirtsim_core::types::{CellPos, GenomeId, Material, OrganismId, TrainingSessionId};
use serde::{Deserialize, Serialize};

/// The typed error kinds a command can fail with. Matches the seven named
/// failure modes the server distinguishes so clients can branch on them
/// without parsing a free-text message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DirtError {
    InvalidCoordinates { detail: String },
    NoWorld,
    SpawnOccupied { pos: CellPos },
    MissingGenome { id: GenomeId },
    BadCommand { detail: String },
    Timeout { correlation_id: CorrelationId },
    Unsupported { detail: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderFormat {
    /// Packed 32-bit RGBA, display-range clamped.
    Rgba8,
    /// Raw HDR radiance as stored by the light pipeline, one `u32` per cell.
    RawHdr,
}

/// One pointer/touch input event. World coordinates are in cell units
/// (fractional, so a finger can land between cell centers).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointerEvent {
    pub pointer_id: u32,
    pub world_x: f32,
    pub world_y: f32,
}

/// Every command a client can send. One `Response` comes back per command,
/// carrying the same `correlation_id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Command {
    // -- World state --
    CellGet { pos: CellPos },
    CellSet { pos: CellPos, material: Material, fill_ratio: f32 },
    StateGet,
    StatusGet,
    Reset,
    WorldResize { width: i32, height: i32 },
    SpawnDirtBall { center: CellPos, radius: i32, material: Material },
    SeedAdd { pos: CellPos },

    // -- Scenario control --
    ScenarioListGet,
    ScenarioSwitch { scenario_id: String },
    ScenarioConfigSet { scenario_id: String, config: ScenarioConfig },

    // -- Simulation lifecycle --
    SimRun,
    SimStop,
    ClockEventTrigger { event_name: String },

    // -- Physics tuning --
    PhysicsSettingsGet,
    PhysicsSettingsSet { settings: dirtsim_core::config::PhysicsSettings },
    GravitySet { value: f32 },

    // -- Rendering --
    RenderFormatGet,
    RenderFormatSet { format: RenderFormat },
    DiagramGet { organism_id: OrganismId },

    // -- Input --
    FingerDown { event: PointerEvent },
    FingerMove { event: PointerEvent },
    FingerUp { event: PointerEvent },

    // -- Genome repository --
    GenomeList { scenario_id: Option<String> },
    GenomeGet { id: GenomeId },
    GenomeGetBest { scenario_id: String },
    GenomeSet { id: GenomeId, weights: Vec<f32>, metadata: GenomeMetadata },
    GenomeDelete { id: GenomeId },

    // -- Evolution lifecycle --
    EvolutionStart { scenario_id: String, config: Option<EvolutionConfig> },
    EvolutionStop,
    TrainingResultAvailable { session_id: TrainingSessionId },
    TrainingResultAvailableAck { session_id: TrainingSessionId },
    TrainingResultGet { session_id: TrainingSessionId },
    TrainingResultList,
    TrainingResultSave { session_id: TrainingSessionId, name: String },
    TrainingResultDiscard { session_id: TrainingSessionId },

    // -- Diagnostics --
    PeersGet,
    PerfStatsGet,
    TimerStatsGet,

    // -- Lifecycle --
    Exit,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CellSnapshot {
    pub pos: CellPos,
    pub material: Material,
    pub fill_ratio: f32,
    pub velocity: [f32; 2],
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvolutionProgressReport {
    pub session_id: TrainingSessionId,
    pub generation: u32,
    pub best_fitness: f32,
    pub mean_fitness: f32,
}

/// The successful-case payload for every `Command` variant that returns
/// data. Commands with no interesting payload (`SimRun`, `Reset`, ...)
/// answer with `Ack`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CommandResult {
    Ack,
    Cell(CellSnapshot),
    StateSnapshot { width: i32, height: i32, occupancy: f32, elapsed_seconds: f32 },
    Status { scenario_id: String, organism_count: usize, elapsed_seconds: f32 },
    ScenarioList { ids: Vec<String> },
    PhysicsSettings(dirtsim_core::config::PhysicsSettings),
    RenderFormat(RenderFormat),
    GenomeList { ids: Vec<GenomeId> },
    GenomeMeta { id: GenomeId, weights: Vec<f32>, metadata: GenomeMetadata },
    EvolutionProgress(EvolutionProgressReport),
    TrainingResultList { session_ids: Vec<TrainingSessionId> },
    PerfStats { ticks_per_second: f32, tick_budget_ms: f32 },
    TimerStats { pending_request_count: usize },
    Peers { peer_count: usize },
}

/// An inbound request: a correlation token plus the command it's asking
/// the server to run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub correlation_id: CorrelationId,
    pub command: Command,
}

/// The server's answer to exactly one `Request`, carrying the same
/// correlation id back so the caller can match it to the call it made.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub correlation_id: CorrelationId,
    pub result: Result<CommandResult, DirtError>,
}
