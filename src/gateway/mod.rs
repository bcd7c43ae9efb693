//! Gateway module - client for the OpenClaw agent runtime
//!
//! One persistent WebSocket carries every call the dashboard makes to the
//! gateway. The client authenticates when the server sends its challenge,
//! multiplexes requests over the socket by correlation id, and re-emits
//! server notifications as events.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  ┌──────────────┐  ┌──────────────┐
//! │ HTTP handler │  │ HTTP handler │  │ server action│
//! └──────┬───────┘  └──────┬───────┘  └──────┬───────┘
//!        └─────────────────┼─────────────────┘
//!                          ▼
//!                 ┌─────────────────┐
//!                 │  GatewayClient  │  one socket, many calls
//!                 └────────┬────────┘
//!                          │ ws://127.0.0.1:18789
//!                          ▼
//!                 ┌─────────────────┐
//!                 │ OpenClaw gateway│
//!                 └─────────────────┘
//! ```

pub mod client;
pub mod events;
pub mod http;
pub mod protocol;
pub mod sessions;
pub mod transport;

use std::sync::OnceLock;

pub use client::{
    ClientOptions, ConnectionState, GatewayClient, DEFAULT_CONNECT_TIMEOUT, DEFAULT_GATEWAY_URL,
    DEFAULT_HISTORY_LIMIT, DEFAULT_REQUEST_TIMEOUT,
};
pub use events::{EventBus, GatewayEvent};
pub use http::GatewayHttpClient;
pub use protocol::{
    events as event_names, methods, ChatMessage, GatewayFrame, ProtocolVersion, Role, SessionInfo,
    SpawnSessionParams, SpawnSessionResponse, PROTOCOL_VERSION,
};
pub use transport::{Connector, WsConnector};

static DEFAULT_CLIENT: OnceLock<GatewayClient> = OnceLock::new();

/// Process-wide client built from the loaded configuration.
///
/// For callers that do not have a client injected. The first successful
/// call fixes the configuration for the rest of the process.
pub fn default_client() -> crate::Result<GatewayClient> {
    if let Some(client) = DEFAULT_CLIENT.get() {
        return Ok(client.clone());
    }

    let config = crate::config::load_config()?;
    let client = GatewayClient::new(ClientOptions::from_config(&config.gateway))?;
    Ok(DEFAULT_CLIENT.get_or_init(|| client).clone())
}
