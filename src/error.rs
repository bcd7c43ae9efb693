//! Error types for the gateway client

use std::time::Duration;
use thiserror::Error;

/// Result type alias using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection setup failed (shared by every caller awaiting the same attempt)
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// An RPC was issued before the handshake completed
    #[error("Not connected to gateway")]
    NotConnected,

    /// A request did not get a response in time
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The gateway answered with `ok: false`
    #[error("{message}")]
    Rpc {
        /// Server-supplied message
        message: String,
        /// Server-supplied error code, if any
        code: Option<String>,
    },

    /// The transport closed while the request was in flight
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Socket-level failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid endpoint URL
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Why a `connect()` attempt failed.
///
/// Cloneable so one handshake outcome can be handed to every caller that
/// joined the attempt while it was in flight.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// Handshake did not complete within the connect timeout
    #[error("Connection timeout: handshake not completed within {0:?}")]
    Timeout(Duration),

    /// Gateway rejected the `connect` request
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Socket could not be opened or failed mid-handshake
    #[error("Connection error: {0}")]
    Transport(String),

    /// Socket closed, or the client disconnected, before authentication
    #[error("Connection closed: {0}")]
    Closed(String),
}

impl Error {
    /// Build an RPC error from a server message
    pub fn rpc(message: impl Into<String>) -> Self {
        Error::Rpc {
            message: message.into(),
            code: None,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Http(_)
                | Error::Timeout(_)
                | Error::ConnectionClosed(_)
                | Error::Transport(_)
                | Error::Connect(ConnectError::Timeout(_))
                | Error::Connect(ConnectError::Transport(_))
                | Error::Connect(ConnectError::Closed(_))
        )
    }

    /// The gateway could not be reached or the session was lost.
    ///
    /// HTTP callers usually map these to `503 Service Unavailable`.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Error::Connect(_) | Error::NotConnected | Error::ConnectionClosed(_) | Error::Transport(_)
        )
    }

    /// The gateway was reached but the call itself failed.
    ///
    /// HTTP callers usually map these to `502 Bad Gateway`.
    pub fn is_upstream_error(&self) -> bool {
        matches!(self, Error::Rpc { .. } | Error::Timeout(_))
    }

    /// Check if error is a client error (caller's fault)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::InvalidInput(_) | Error::Config(_) | Error::Url(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_message() {
        let err = Error::from(ConnectError::Authentication("bad token".to_string()));
        assert_eq!(err.to_string(), "Authentication failed: bad token");
        assert!(err.is_connection_error());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_rpc_error_displays_server_message() {
        let err = Error::rpc("bad token");
        assert_eq!(err.to_string(), "bad token");
        assert!(err.is_upstream_error());
        assert!(!err.is_connection_error());
    }

    #[test]
    fn test_timeout_classification() {
        let err = Error::Timeout("Request timeout: status".to_string());
        assert!(err.is_retryable());
        assert!(err.is_upstream_error());
        assert!(Error::NotConnected.is_connection_error());
    }
}
