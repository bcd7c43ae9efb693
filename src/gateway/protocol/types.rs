//! Gateway protocol types
//!
//! Request/response types for gateway methods.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::schema::ProtocolVersion;

// ============================================================================
// Method and event names
// ============================================================================

/// RPC method names
pub mod methods {
    /// Authentication handshake
    pub const CONNECT: &str = "connect";
    /// List sessions
    pub const SESSIONS_LIST: &str = "sessions.list";
    /// Spawn a session
    pub const SESSIONS_SPAWN: &str = "sessions.spawn";
    /// Session transcript
    pub const CHAT_HISTORY: &str = "chat.history";
    /// Send a message into a session
    pub const CHAT_SEND: &str = "chat.send";
    /// Gateway status
    pub const STATUS: &str = "status";
}

/// Event names
pub mod events {
    /// Server asks the client to authenticate
    pub const CONNECT_CHALLENGE: &str = "connect.challenge";
    /// Handshake completed
    pub const CONNECTED: &str = "connected";
    /// Transport closed after authentication
    pub const DISCONNECTED: &str = "disconnected";
    /// Transport or handshake failure
    pub const ERROR: &str = "error";
    /// Any server notification
    pub const NOTIFICATION: &str = "notification";
}

// ============================================================================
// Handshake
// ============================================================================

/// Identity reported to the gateway during the handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientInfo {
    /// Client identifier
    pub id: String,
    /// Client version
    pub version: String,
    /// Platform name
    pub platform: String,
    /// Client mode
    pub mode: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        ClientInfo {
            id: "gateway-client".to_string(),
            version: "1.0.0".to_string(),
            platform: "node".to_string(),
            mode: "backend".to_string(),
        }
    }
}

/// Credentials sent in the `connect` request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthParams {
    /// Bearer token (may be empty)
    pub token: String,
}

/// Params of the `connect` request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    /// Accepted protocol range
    #[serde(flatten)]
    pub protocol: ProtocolVersion,
    /// Client identity
    pub client: ClientInfo,
    /// Credentials
    pub auth: AuthParams,
}

// ============================================================================
// Sessions
// ============================================================================

/// Session info as reported by `sessions.list`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Opaque session key
    #[serde(alias = "sessionKey")]
    pub key: String,
    /// Session kind (direct, group, ...)
    #[serde(default)]
    pub kind: Option<String>,
    /// Model identifier
    #[serde(default)]
    pub model: Option<String>,
    /// Channel the session lives on
    #[serde(default)]
    pub channel: Option<String>,
    /// Human label
    #[serde(default)]
    pub label: Option<String>,
    /// Display name
    #[serde(default)]
    pub display_name: Option<String>,
    /// Input tokens used
    #[serde(default)]
    pub input_tokens: Option<u64>,
    /// Output tokens used
    #[serde(default)]
    pub output_tokens: Option<u64>,
    /// Total tokens used
    #[serde(default)]
    pub total_tokens: Option<u64>,
    /// Last activity (epoch milliseconds)
    #[serde(default)]
    pub updated_at: Option<i64>,
    /// Fields this client does not model
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SessionInfo {
    /// Last activity as a timestamp
    pub fn last_activity(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.updated_at
            .and_then(chrono::DateTime::from_timestamp_millis)
    }
}

/// `sessions.list` payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionsListResponse {
    /// Sessions
    #[serde(default, deserialize_with = "lenient_list")]
    pub sessions: Vec<SessionInfo>,
}

/// Params of `sessions.spawn`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnSessionParams {
    /// Task description for the new session
    pub task: String,
    /// Human label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Model override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Agent identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Limit for the spawned run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_timeout_seconds: Option<u64>,
    /// How long the gateway waits before answering
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

impl SpawnSessionParams {
    /// Spawn params for a task
    pub fn new(task: impl Into<String>) -> Self {
        SpawnSessionParams {
            task: task.into(),
            ..Default::default()
        }
    }

    /// Set the label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the agent identity
    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Set the run timeout
    pub fn with_run_timeout(mut self, seconds: u64) -> Self {
        self.run_timeout_seconds = Some(seconds);
        self
    }
}

/// `sessions.spawn` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnSessionResponse {
    /// Key of the spawned session
    #[serde(alias = "childSessionKey")]
    pub session_key: String,
    /// Run identifier
    #[serde(default)]
    pub run_id: Option<String>,
}

// ============================================================================
// Chat
// ============================================================================

/// Message author
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Human side
    User,
    /// Agent side
    Assistant,
    /// System prompt or notice
    System,
    /// Tool output
    Tool,
    /// Anything else the gateway reports, or no role at all
    #[default]
    #[serde(other)]
    Unknown,
}

/// One transcript entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author
    #[serde(default)]
    pub role: Role,
    /// Plain text or structured content blocks
    #[serde(default)]
    pub content: Value,
    /// Epoch milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl ChatMessage {
    /// Text content, joining `text` blocks when the content is structured
    pub fn text(&self) -> Option<String> {
        match &self.content {
            Value::String(s) => Some(s.clone()),
            Value::Array(blocks) => {
                let parts: Vec<&str> = blocks
                    .iter()
                    .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                    .filter_map(|b| b.get("text").and_then(Value::as_str))
                    .collect();
                if parts.is_empty() {
                    None
                } else {
                    Some(parts.join(""))
                }
            }
            _ => None,
        }
    }
}

/// Params of `chat.history`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistoryRequest {
    /// Session to read
    pub session_key: String,
    /// Maximum messages returned
    pub limit: u32,
}

/// `chat.history` payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatHistoryResponse {
    /// Messages, oldest first
    #[serde(default, deserialize_with = "lenient_list")]
    pub messages: Vec<ChatMessage>,
}

/// Params of `chat.send`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSendRequest {
    /// Target session
    pub session_key: String,
    /// Message text
    pub message: String,
    /// Fresh per call so the server can drop duplicates
    pub idempotency_key: String,
}

/// Decode the entries of a list payload one by one.
///
/// Entries that do not decode are skipped, so one odd record from the
/// gateway does not hide the rest.
pub(crate) fn decode_entries<T: DeserializeOwned>(entries: Vec<Value>) -> Vec<T> {
    entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value(entry) {
            Ok(item) => Some(item),
            Err(e) => {
                debug!(error = %e, "Skipping malformed list entry");
                None
            }
        })
        .collect()
}

/// `null` decodes like an absent list
fn lenient_list<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let entries: Option<Vec<Value>> = Option::deserialize(deserializer)?;
    Ok(decode_entries(entries.unwrap_or_default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_connect_params_wire_shape() {
        let params = ConnectParams {
            protocol: ProtocolVersion::default(),
            client: ClientInfo::default(),
            auth: AuthParams {
                token: "secret".to_string(),
            },
        };
        assert_eq!(
            serde_json::to_value(&params).unwrap(),
            json!({
                "minProtocol": 3,
                "maxProtocol": 3,
                "client": {"id": "gateway-client", "version": "1.0.0", "platform": "node", "mode": "backend"},
                "auth": {"token": "secret"}
            })
        );
    }

    #[test]
    fn test_session_info_keeps_unknown_fields() {
        let info: SessionInfo = serde_json::from_value(json!({
            "key": "agent:main:main",
            "model": "claude-sonnet-4",
            "totalTokens": 1200,
            "updatedAt": 1_700_000_000_000i64,
            "abortedLastRun": false
        }))
        .unwrap();
        assert_eq!(info.key, "agent:main:main");
        assert_eq!(info.total_tokens, Some(1200));
        assert!(info.last_activity().is_some());
        assert_eq!(info.extra["abortedLastRun"], json!(false));
    }

    #[test]
    fn test_spawn_params_skip_unset() {
        let params = SpawnSessionParams::new("write report").with_label("report");
        assert_eq!(
            serde_json::to_value(&params).unwrap(),
            json!({"task": "write report", "label": "report"})
        );
    }

    #[test]
    fn test_spawn_response_accepts_child_key() {
        let res: SpawnSessionResponse =
            serde_json::from_value(json!({"childSessionKey": "agent:main:sub:1", "runId": "r1"}))
                .unwrap();
        assert_eq!(res.session_key, "agent:main:sub:1");
        assert_eq!(res.run_id.as_deref(), Some("r1"));
    }

    #[test]
    fn test_message_text_from_blocks() {
        let msg: ChatMessage = serde_json::from_value(json!({
            "role": "assistant",
            "content": [{"type": "text", "text": "hel"}, {"type": "image"}, {"type": "text", "text": "lo"}]
        }))
        .unwrap();
        assert_eq!(msg.text().as_deref(), Some("hello"));

        let odd: ChatMessage =
            serde_json::from_value(json!({"role": "toolResult", "content": "x"})).unwrap();
        assert_eq!(odd.role, Role::Unknown);
    }
}
