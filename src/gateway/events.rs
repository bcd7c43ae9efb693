//! Client events
//!
//! Every listener sees every event through a broadcast channel. Narrow
//! subscribers use [`EventBus::subscribe_method`] to get only the params of
//! one notification method.

use futures::Stream;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use super::protocol::events;

/// Capacity of the broadcast channel; slow listeners skip older events
const EVENT_CAPACITY: usize = 256;

/// Something the client emits
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    /// Handshake completed
    Connected,
    /// Transport closed after authentication
    Disconnected {
        /// Close reason
        reason: String,
    },
    /// Transport or handshake failure
    Error {
        /// Failure description
        message: String,
    },
    /// Any server notification, carrying the whole frame
    Notification(Value),
    /// Method-named notification, carrying just the params
    Method {
        /// Notification method
        method: String,
        /// Params
        params: Value,
    },
}

impl GatewayEvent {
    /// Event name as a listener would register for it
    pub fn name(&self) -> &str {
        match self {
            GatewayEvent::Connected => events::CONNECTED,
            GatewayEvent::Disconnected { .. } => events::DISCONNECTED,
            GatewayEvent::Error { .. } => events::ERROR,
            GatewayEvent::Notification(_) => events::NOTIFICATION,
            GatewayEvent::Method { method, .. } => method,
        }
    }
}

/// Fan-out of client events
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<GatewayEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create an event bus with no listeners
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        EventBus { tx }
    }

    /// Emit an event; dropped when nobody listens
    pub fn emit(&self, event: GatewayEvent) {
        if self.tx.send(event).is_err() {
            debug!("No event listeners");
        }
    }

    /// Emit a server notification twice: broad, then method-named
    pub fn emit_notification(&self, method: String, params: Value, frame: Value) {
        self.emit(GatewayEvent::Notification(frame));
        self.emit(GatewayEvent::Method { method, params });
    }

    /// Receive every event
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.tx.subscribe()
    }

    /// Receive the params of one notification method
    pub fn subscribe_method(&self, method: impl Into<String>) -> impl Stream<Item = Value> + Send {
        let method = method.into();
        let rx = self.tx.subscribe();

        futures::stream::unfold((rx, method), |(mut rx, method)| async move {
            loop {
                match rx.recv().await {
                    Ok(GatewayEvent::Method { method: m, params }) if m == method => {
                        return Some((params, (rx, method)));
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(method = %method, skipped, "Event listener lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
    }

    /// Number of active listeners
    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    #[tokio::test]
    async fn test_notification_is_emitted_twice() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        let frame = json!({"method": "session.updated", "params": {"key": "a"}});
        bus.emit_notification("session.updated".to_string(), json!({"key": "a"}), frame.clone());

        let first = rx.recv().await.unwrap();
        assert_eq!(first, GatewayEvent::Notification(frame));
        assert_eq!(first.name(), "notification");

        let second = rx.recv().await.unwrap();
        assert_eq!(second.name(), "session.updated");
        assert_eq!(
            second,
            GatewayEvent::Method {
                method: "session.updated".to_string(),
                params: json!({"key": "a"})
            }
        );
    }

    #[tokio::test]
    async fn test_subscribe_method_filters() {
        let bus = EventBus::new();
        let stream = bus.subscribe_method("chat");
        futures::pin_mut!(stream);

        bus.emit(GatewayEvent::Connected);
        bus.emit_notification("agent".to_string(), json!(1), json!({}));
        bus.emit_notification("chat".to_string(), json!({"state": "final"}), json!({}));

        assert_eq!(stream.next().await, Some(json!({"state": "final"})));
    }

    #[test]
    fn test_emit_without_listeners() {
        let bus = EventBus::new();
        bus.emit(GatewayEvent::Connected);
        assert_eq!(bus.listener_count(), 0);
    }
}
