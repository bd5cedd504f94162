// Core ID types for the request/response wire protocol.
//
// `CorrelationId` is the only identifier the protocol itself invents: every
// other value on the wire (organism ids, genome ids, cell positions) is a
// `dirtsim_core` type, re-serialized as-is rather than shadowed by a
// protocol-local newtype.

use serde::{Deserialize, Serialize};

/// Caller-assigned token correlating a `Request` with its eventual
/// `Response`. The caller picks this value; the server never generates one
/// itself, so a client can pipeline several requests without waiting for
/// replies in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CorrelationId(pub u64);
