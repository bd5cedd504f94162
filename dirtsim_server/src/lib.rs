// dirtsim_server — the tick-driven DirtSim simulation server.
//
// This server is the sim's single authoritative owner: it holds the live
// `World`, steps it at a fixed cadence, and answers every client command
// against that same state. There is no separate relay process and no
// turn-broadcast layer — every connected client is a peer into the one
// world this process owns.
//
// Module overview:
// - `session.rs`:  `WorldSession` — the world, genome repository, scenario
//                  registry, and lifecycle state machine, plus the command
//                  dispatch (`handle`) that answers every `Command` the
//                  wire protocol defines.
// - `server.rs`:   TCP listener, reader threads (one per client), and the
//                  main event loop. Thread-per-reader with an `mpsc`
//                  channel funneling requests into the single-threaded
//                  `WorldSession`.
// - `client.rs`:   `NetClient` — a non-blocking client for issuing commands
//                  and polling responses, used by integration tests and any
//                  embedding process.
//
// Dependencies: `dirtsim_protocol` (wire types and framing), `dirtsim_core`
// (the simulation itself).

pub mod client;
pub mod server;
pub mod session;

pub use server::start_server;
