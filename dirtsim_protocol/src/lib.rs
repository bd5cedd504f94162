// dirtsim_protocol — wire protocol between DirtSim clients and server.
//
// This crate defines the request/response vocabulary and framing used
// between a `dirtsim_server` process and its clients over TCP. It depends
// on `dirtsim_core` for the shared domain types (cell positions, organism
// ids, genome ids, physics settings) that travel over the wire unchanged,
// but has no dependency on sockets or any particular transport.
//
// Module overview:
// - `types.rs`:    `CorrelationId` — the one identifier the protocol itself invents.
// - `message.rs`:  `Command`/`CommandResult`/`DirtError`, and the `Request`/`Response` envelope.
// - `framing.rs`:  Length-delimited framing over any `Read`/`Write` stream:
//                  4-byte big-endian length prefix, then JSON payload.
//
// Design decisions:
// - **Request/response, not broadcast.** Every `Command` gets exactly one
//   `Response` bearing the same `correlation_id` — there is no fire-and-forget
//   or multi-subscriber broadcast at this layer. A caller who wants a stream
//   of status updates polls `StatusGet`/`PerfStatsGet`.
// - **JSON serialization.** Readable and diffable; matches the rest of the
//   workspace's serde_json usage. Binary framing can be swapped in later if
//   bandwidth matters.
// - **Typed errors.** `DirtError` has a fixed set of variants rather than a
//   free-text string, so a client can branch on `NoWorld` vs `Timeout`
//   without string matching.

pub mod framing;
pub mod message;
pub mod types;

pub use framing::{MAX_MESSAGE_SIZE, read_message, write_message};
pub use message::{
    CellSnapshot, Command, CommandResult, DirtError, EvolutionProgressReport, PointerEvent,
    RenderFormat, Request, Response,
};
pub use types::CorrelationId;

#[cfg(test)]
mod tests {
    use super::*;
    use dirtsim_core::types::{CellPos, Material};
    use std::io::Cursor;

    fn request_roundtrip(req: &Request) {
        let json = serde_json::to_vec(req).unwrap();
        let mut wire = Vec::new();
        write_message(&mut wire, &json).unwrap();

        let mut cursor = Cursor::new(&wire);
        let recovered_json = read_message(&mut cursor).unwrap();
        let recovered: Request = serde_json::from_slice(&recovered_json).unwrap();
        assert_eq!(&recovered, req);
    }

    fn response_roundtrip(resp: &Response) {
        let json = serde_json::to_vec(resp).unwrap();
        let mut wire = Vec::new();
        write_message(&mut wire, &json).unwrap();

        let mut cursor = Cursor::new(&wire);
        let recovered_json = read_message(&mut cursor).unwrap();
        let recovered: Response = serde_json::from_slice(&recovered_json).unwrap();
        assert_eq!(&recovered, resp);
    }

    #[test]
    fn roundtrip_cell_get_request() {
        request_roundtrip(&Request {
            correlation_id: CorrelationId(1),
            command: Command::CellGet { pos: CellPos::new(4, 5) },
        });
    }

    #[test]
    fn roundtrip_cell_set_request() {
        request_roundtrip(&Request {
            correlation_id: CorrelationId(2),
            command: Command::CellSet { pos: CellPos::new(1, 1), material: Material::Sand, fill_ratio: 0.5 },
        });
    }

    #[test]
    fn roundtrip_sim_run_and_stop() {
        request_roundtrip(&Request { correlation_id: CorrelationId(3), command: Command::SimRun });
        request_roundtrip(&Request { correlation_id: CorrelationId(4), command: Command::SimStop });
    }

    #[test]
    fn roundtrip_exit_request() {
        request_roundtrip(&Request { correlation_id: CorrelationId(5), command: Command::Exit });
    }

    #[test]
    fn roundtrip_ack_response() {
        response_roundtrip(&Response { correlation_id: CorrelationId(1), result: Ok(CommandResult::Ack) });
    }

    #[test]
    fn roundtrip_error_response_no_world() {
        response_roundtrip(&Response { correlation_id: CorrelationId(1), result: Err(DirtError::NoWorld) });
    }

    #[test]
    fn roundtrip_error_response_spawn_occupied() {
        response_roundtrip(&Response {
            correlation_id: CorrelationId(9),
            result: Err(DirtError::SpawnOccupied { pos: CellPos::new(2, 2) }),
        });
    }

    #[test]
    fn roundtrip_scenario_list_response() {
        response_roundtrip(&Response {
            correlation_id: CorrelationId(10),
            result: Ok(CommandResult::ScenarioList { ids: vec!["forest_clearing".into(), "evolution_arena".into()] }),
        });
    }

    #[test]
    fn roundtrip_timeout_error_carries_the_original_correlation_id() {
        response_roundtrip(&Response {
            correlation_id: CorrelationId(11),
            result: Err(DirtError::Timeout { correlation_id: CorrelationId(11) }),
        });
    }
}
