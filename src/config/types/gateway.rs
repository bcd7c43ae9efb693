//! Gateway connection configuration

use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::gateway::protocol::ClientInfo;
use crate::gateway::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_GATEWAY_URL, DEFAULT_HISTORY_LIMIT, DEFAULT_REQUEST_TIMEOUT,
};

/// Gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// WebSocket endpoint
    #[serde(default = "default_url")]
    pub url: String,
    /// Auth token
    #[serde(skip_serializing, default = "default_secret")]
    pub token: SecretString,
    /// Handshake deadline
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    /// Per-request deadline
    #[serde(with = "humantime_serde", default = "default_request_timeout")]
    pub request_timeout: Duration,
    /// Messages fetched by `chat.history`
    #[serde(default = "default_history_limit")]
    pub history_limit: u32,
    /// Identity reported during the handshake
    #[serde(default)]
    pub client: ClientInfo,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            url: default_url(),
            token: default_secret(),
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
            history_limit: default_history_limit(),
            client: ClientInfo::default(),
        }
    }
}

fn default_url() -> String {
    DEFAULT_GATEWAY_URL.to_string()
}

fn default_secret() -> SecretString {
    SecretString::from(String::new())
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

fn default_history_limit() -> u32 {
    DEFAULT_HISTORY_LIMIT
}
