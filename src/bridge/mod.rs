//! The HTTP bridge embedded in the CAD host process.
//!
//! The bridge is the only doorway into the CAD host's scripting surface. It
//! has three parts:
//!
//! - [`protocol`] — the wire contract (envelopes, route table, fixed port)
//!   shared with the relay client
//! - [`guard`] — the single-flight guard serialising mutating operations
//! - [`server`] — the axum listener that routes requests into a [`crate::host::CadHost`]

pub mod guard;
pub mod protocol;
pub mod server;

pub use guard::{FlightPermit, SingleFlightGuard};
pub use protocol::{RequestEnvelope, ResponseEnvelope, BRIDGE_PORT};
pub use server::BridgeServer;
