//! Session operations
//!
//! Typed wrappers over [`GatewayClient::call`]. They inherit its
//! precondition (the client must be authenticated) and its timeout and error
//! behavior; nothing here retries or caches.

use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use super::client::GatewayClient;
use super::protocol::{
    methods, ChatHistoryRequest, ChatHistoryResponse, ChatMessage, ChatSendRequest, SessionInfo,
    SessionsListResponse, SpawnSessionParams, SpawnSessionResponse,
};
use crate::error::{Error, Result};

impl GatewayClient {
    /// List the gateway's sessions; empty when the payload has none
    pub async fn list_sessions(&self) -> Result<Vec<SessionInfo>> {
        let payload: Value = self.call(methods::SESSIONS_LIST, None).await?;
        let list: SessionsListResponse = decode_or_default(payload)?;
        Ok(list.sessions)
    }

    /// Most recent messages of a session, oldest first
    pub async fn get_session_history(&self, session_key: &str) -> Result<Vec<ChatMessage>> {
        require_key(session_key)?;
        let params = serde_json::to_value(ChatHistoryRequest {
            session_key: session_key.to_string(),
            limit: self.options().history_limit,
        })?;

        let payload: Value = self.call(methods::CHAT_HISTORY, Some(params)).await?;
        let history: ChatHistoryResponse = decode_or_default(payload)?;
        Ok(history.messages)
    }

    /// Send a message into a session.
    ///
    /// Each call carries a fresh idempotency key.
    pub async fn send_message(&self, session_key: &str, message: &str) -> Result<()> {
        require_key(session_key)?;
        let params = serde_json::to_value(ChatSendRequest {
            session_key: session_key.to_string(),
            message: message.to_string(),
            idempotency_key: Uuid::new_v4().to_string(),
        })?;

        let _: Value = self.call(methods::CHAT_SEND, Some(params)).await?;
        Ok(())
    }

    /// Spawn a new session running `params.task`
    pub async fn spawn_session(&self, params: SpawnSessionParams) -> Result<SpawnSessionResponse> {
        if params.task.trim().is_empty() {
            return Err(Error::InvalidInput("Task description is required".to_string()));
        }
        let params = serde_json::to_value(params)?;
        self.call(methods::SESSIONS_SPAWN, Some(params)).await
    }

    /// Gateway status, as reported
    pub async fn get_status(&self) -> Result<Value> {
        self.call(methods::STATUS, None).await
    }
}

fn require_key(session_key: &str) -> Result<()> {
    if session_key.is_empty() {
        return Err(Error::InvalidInput("Session key is required".to_string()));
    }
    Ok(())
}

/// A missing payload decodes to the default
fn decode_or_default<T: DeserializeOwned + Default>(payload: Value) -> Result<T> {
    if payload.is_null() {
        return Ok(T::default());
    }
    Ok(serde_json::from_value(payload)?)
}
