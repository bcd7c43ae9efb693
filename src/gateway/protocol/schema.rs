//! Gateway protocol schema
//!
//! Defines the wire format for gateway messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version spoken by this client
pub const PROTOCOL_VERSION: u32 = 3;

/// Protocol range advertised in the `connect` request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolVersion {
    /// Lowest protocol accepted
    pub min_protocol: u32,
    /// Highest protocol accepted
    pub max_protocol: u32,
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        ProtocolVersion {
            min_protocol: PROTOCOL_VERSION,
            max_protocol: PROTOCOL_VERSION,
        }
    }
}

/// Gateway frame - Top-level message envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GatewayFrame {
    /// Request from client
    #[serde(rename = "req")]
    Request(RequestFrame),
    /// Response from server
    #[serde(rename = "res")]
    Response(ResponseFrame),
    /// Event pushed by server
    #[serde(rename = "event")]
    Event(EventFrame),
}

/// Request frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFrame {
    /// Correlation ID
    pub id: String,
    /// Method name
    pub method: String,
    /// Parameters
    #[serde(default)]
    pub params: Value,
}

/// Response frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFrame {
    /// ID of the request this answers
    pub id: String,
    /// Whether the call succeeded
    #[serde(default)]
    pub ok: bool,
    /// Result (success)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Error (failure)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorShape>,
}

impl ResponseFrame {
    /// Successful response
    pub fn success(id: impl Into<String>, payload: Value) -> Self {
        ResponseFrame {
            id: id.into(),
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    /// Failed response
    pub fn failure(id: impl Into<String>, message: impl Into<String>) -> Self {
        ResponseFrame {
            id: id.into(),
            ok: false,
            payload: None,
            error: Some(ErrorShape {
                message: Some(message.into()),
                code: None,
                details: None,
            }),
        }
    }

    /// Message to report when `ok` is false
    pub fn error_message(&self) -> String {
        self.error
            .as_ref()
            .and_then(|e| e.message.clone())
            .unwrap_or_else(|| "Unknown error".to_string())
    }

    /// Error code as a string, when the server sent one
    pub fn error_code(&self) -> Option<String> {
        self.error.as_ref().and_then(|e| match &e.code {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        })
    }
}

/// Error body of a failed response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorShape {
    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Machine-readable code (string or number depending on the server)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<Value>,
    /// Extra details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Event frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    /// Event name
    pub event: String,
    /// Event payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Sequence number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

/// An inbound frame, classified for dispatch
#[derive(Debug, Clone)]
pub enum InboundFrame {
    /// Answer to a pending request
    Response(ResponseFrame),
    /// Server asks the client to authenticate
    Challenge(Option<Value>),
    /// Unsolicited message; `frame` is the raw JSON as received
    Notification {
        /// Method (or event) name
        method: String,
        /// Params (or event payload)
        params: Value,
        /// Whole frame
        frame: Value,
    },
    /// Valid JSON with no recognizable shape
    Unrecognized(Value),
}

impl InboundFrame {
    /// Classify a raw text frame.
    ///
    /// Frames that do not fit the typed envelope but still carry a `method`
    /// are treated as notifications.
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        let value: Value = serde_json::from_str(text)?;

        let frame = match serde_json::from_value::<GatewayFrame>(value.clone()) {
            Ok(GatewayFrame::Response(res)) => InboundFrame::Response(res),
            Ok(GatewayFrame::Event(ev)) if ev.event == super::events::CONNECT_CHALLENGE => {
                InboundFrame::Challenge(ev.payload)
            }
            Ok(GatewayFrame::Event(ev)) => InboundFrame::Notification {
                method: ev.event,
                params: ev.payload.unwrap_or(Value::Null),
                frame: value,
            },
            Ok(GatewayFrame::Request(req)) => InboundFrame::Notification {
                method: req.method,
                params: req.params,
                frame: value,
            },
            Err(_) => match value.get("method").and_then(Value::as_str) {
                Some(method) => InboundFrame::Notification {
                    method: method.to_string(),
                    params: value.get("params").cloned().unwrap_or(Value::Null),
                    frame: value,
                },
                None => InboundFrame::Unrecognized(value),
            },
        };

        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_frame_wire_shape() {
        let frame = GatewayFrame::Request(RequestFrame {
            id: "abc".to_string(),
            method: "status".to_string(),
            params: json!({}),
        });
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            value,
            json!({"type": "req", "id": "abc", "method": "status", "params": {}})
        );
    }

    #[test]
    fn test_parse_challenge() {
        let frame = InboundFrame::parse(r#"{"type":"event","event":"connect.challenge"}"#).unwrap();
        assert!(matches!(frame, InboundFrame::Challenge(None)));
    }

    #[test]
    fn test_parse_error_response() {
        let frame = InboundFrame::parse(
            r#"{"type":"res","id":"X","ok":false,"error":{"message":"bad token","code":401}}"#,
        )
        .unwrap();
        match frame {
            InboundFrame::Response(res) => {
                assert!(!res.ok);
                assert_eq!(res.error_message(), "bad token");
                assert_eq!(res.error_code().as_deref(), Some("401"));
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_parse_method_notification() {
        let frame =
            InboundFrame::parse(r#"{"method":"session.updated","params":{"key":"main"}}"#).unwrap();
        match frame {
            InboundFrame::Notification { method, params, .. } => {
                assert_eq!(method, "session.updated");
                assert_eq!(params, json!({"key": "main"}));
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_parse_event_as_notification() {
        let frame =
            InboundFrame::parse(r#"{"type":"event","event":"agent","payload":{"runId":"r1"},"seq":4}"#)
                .unwrap();
        match frame {
            InboundFrame::Notification { method, params, frame } => {
                assert_eq!(method, "agent");
                assert_eq!(params["runId"], "r1");
                assert_eq!(frame["seq"], 4);
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_parse_unrecognized_and_invalid() {
        assert!(matches!(
            InboundFrame::parse(r#"{"hello":"world"}"#).unwrap(),
            InboundFrame::Unrecognized(_)
        ));
        assert!(InboundFrame::parse("not json").is_err());
    }

    #[test]
    fn test_error_message_fallback() {
        let res: ResponseFrame = serde_json::from_value(json!({"id": "1", "ok": false})).unwrap();
        assert_eq!(res.error_message(), "Unknown error");
        assert!(res.error_code().is_none());
    }
}
