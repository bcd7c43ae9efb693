//! Gateway Protocol - JSON frames over a single WebSocket
//!
//! ## Message Types
//!
//! - `req`: Client-initiated requests, correlated by `id`
//! - `res`: Server responses (`ok` + `payload` or `error`)
//! - `event`: Server-pushed events, including the `connect.challenge`
//!   that opens every session
//!
//! Frames that carry a `method` but are not responses are treated as
//! notifications.

pub mod schema;
pub mod types;

pub use schema::{
    ErrorShape, EventFrame, GatewayFrame, InboundFrame, ProtocolVersion, RequestFrame,
    ResponseFrame, PROTOCOL_VERSION,
};
pub use types::*;
