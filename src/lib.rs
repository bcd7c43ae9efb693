//! # Agency Gateway
//!
//! Client for the OpenClaw gateway, the agent runtime behind the agency
//! dashboard.
//!
//! ## Features
//!
//! - **Single persistent connection:** one authenticated WebSocket shared by every caller
//! - **Request correlation:** concurrent RPC calls resolved by id, each with its own timeout
//! - **Session operations:** list, history, send, spawn and status
//! - **Event dispatch:** connection lifecycle and server notifications as a broadcast stream
//! - **HTTP tool invocation:** `/tools/invoke` for callers that do not hold a socket

pub mod config;
pub mod error;
pub mod gateway;

pub use config::Config;
pub use error::{ConnectError, Error, Result};
pub use gateway::{default_client, GatewayClient, GatewayEvent};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");
