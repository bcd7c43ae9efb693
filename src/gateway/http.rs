//! HTTP tool-invocation client
//!
//! Some callers reach the gateway over its REST-style `/tools/invoke`
//! endpoint instead of the WebSocket RPC path, mostly to post into a session
//! without holding a connection open.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use super::client::ClientOptions;
use super::protocol::types::decode_entries;
use super::protocol::{ErrorShape, SessionInfo};
use crate::error::{Error, Result};

#[derive(Debug, Serialize)]
struct ToolInvokeRequest<'a> {
    tool: &'a str,
    args: Value,
}

#[derive(Debug, Deserialize)]
struct ToolInvokeResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ErrorShape>,
}

/// Client for the gateway's HTTP endpoints
#[derive(Debug, Clone)]
pub struct GatewayHttpClient {
    http: reqwest::Client,
    base_url: Url,
    token: SecretString,
}

impl GatewayHttpClient {
    /// Create a client for `base_url` (http:// or https://)
    pub fn new(base_url: Url, token: SecretString, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(GatewayHttpClient {
            http,
            base_url,
            token,
        })
    }

    /// Create a client for the same gateway a WebSocket client talks to
    pub fn from_options(options: &ClientOptions) -> Result<Self> {
        let base_url = http_base_url(&options.url)?;
        Self::new(base_url, options.token.clone(), options.request_timeout)
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Invoke a gateway tool and return its result
    pub async fn invoke_tool(&self, tool: &str, args: Value) -> Result<Value> {
        let url = self.base_url.join("tools/invoke")?;
        debug!(tool, url = %url, "Invoking gateway tool over HTTP");

        let mut request = self.http.post(url).json(&ToolInvokeRequest { tool, args });
        let token = self.token.expose_secret();
        if !token.is_empty() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        let parsed: Option<ToolInvokeResponse> = serde_json::from_slice(&body).ok();
        match parsed {
            Some(res) if status.is_success() && res.ok => Ok(res.result.unwrap_or(Value::Null)),
            Some(res) => Err(Error::Rpc {
                message: res
                    .error
                    .and_then(|e| e.message)
                    .unwrap_or_else(|| format!("Tool {} failed with HTTP {}", tool, status)),
                code: Some(status.as_u16().to_string()),
            }),
            None => Err(Error::Rpc {
                message: format!("Tool {} failed with HTTP {}", tool, status),
                code: Some(status.as_u16().to_string()),
            }),
        }
    }

    /// Post a message into a session
    pub async fn send_session_message(&self, session_key: &str, message: &str) -> Result<Value> {
        self.invoke_tool(
            "sessions_send",
            json!({ "sessionKey": session_key, "message": message }),
        )
        .await
    }

    /// List sessions through the tool endpoint
    pub async fn list_sessions(&self) -> Result<Vec<SessionInfo>> {
        let result = self.invoke_tool("sessions_list", json!({})).await?;
        let sessions = result
            .get("sessions")
            .or_else(|| result.get("details").and_then(|d| d.get("sessions")))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(decode_entries(sessions))
    }
}

/// HTTP base for a WebSocket gateway URL: same host and port, ws→http, wss→https
pub fn http_base_url(ws_url: &str) -> Result<Url> {
    let mut url = Url::parse(ws_url)?;
    let scheme = match url.scheme() {
        "ws" | "http" => "http",
        "wss" | "https" => "https",
        other => {
            return Err(Error::Config(format!(
                "Unsupported gateway URL scheme: {}",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| Error::Config(format!("Cannot derive HTTP URL from {}", ws_url)))?;
    url.set_query(None);
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, token: &str) -> GatewayHttpClient {
        GatewayHttpClient::new(
            Url::parse(&server.uri()).unwrap(),
            SecretString::from(token.to_string()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_http_base_url() {
        assert_eq!(
            http_base_url("ws://127.0.0.1:18789").unwrap().as_str(),
            "http://127.0.0.1:18789/"
        );
        assert_eq!(
            http_base_url("wss://gw.example.com/openclaw?token=x").unwrap().as_str(),
            "https://gw.example.com/openclaw/"
        );
        assert!(http_base_url("ftp://example.com").is_err());
    }

    #[tokio::test]
    async fn test_send_session_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tools/invoke"))
            .and(header("authorization", "Bearer secret"))
            .and(body_json(json!({
                "tool": "sessions_send",
                "args": {"sessionKey": "agent:main:main", "message": "hello"}
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": {"runId": "r1"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let result = client(&server, "secret")
            .send_session_message("agent:main:main", "hello")
            .await
            .unwrap();
        assert_eq!(result["runId"], "r1");
    }

    #[tokio::test]
    async fn test_tool_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tools/invoke"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(json!({"ok": false, "error": {"message": "Tool not available"}})),
            )
            .mount(&server)
            .await;

        let err = client(&server, "").invoke_tool("nope", json!({})).await.unwrap_err();
        match err {
            Error::Rpc { message, code } => {
                assert_eq!(message, "Tool not available");
                assert_eq!(code.as_deref(), Some("404"));
            }
            other => panic!("expected rpc error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_json_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let err = client(&server, "").invoke_tool("sessions_list", json!({})).await.unwrap_err();
        assert!(err.to_string().contains("HTTP 502"));
    }

    #[tokio::test]
    async fn test_list_sessions_from_details() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tools/invoke"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"details": {"sessions": [{"key": "agent:main:main"}]}}
            })))
            .mount(&server)
            .await;

        let sessions = client(&server, "").list_sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].key, "agent:main:main");
    }
}
