//! WebSocket transport
//!
//! The client only sees text frames: a sink for outbound JSON and a stream
//! of inbound JSON. `Connector` opens one such pair per connection attempt,
//! which lets tests swap the socket for an in-memory pipe.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{future, Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

/// Outbound half of a connection
pub type FrameSink = Pin<Box<dyn Sink<String, Error = Error> + Send>>;

/// Inbound half of a connection; ends when the peer closes
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Opens transports to the gateway
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a new connection to `url`
    async fn connect(&self, url: &Url) -> Result<(FrameSink, FrameStream)>;
}

/// `tokio-tungstenite` connector (ws:// and wss://)
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &Url) -> Result<(FrameSink, FrameStream)> {
        debug!(host = ?url.host_str(), "Opening gateway WebSocket");

        let (ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| Error::Transport(format!("WebSocket connect failed: {}", e)))?;

        let (ws_tx, ws_rx) = ws.split();

        let sink = ws_tx
            .sink_map_err(|e| Error::Transport(format!("Failed to send: {}", e)))
            .with(|text: String| future::ready(Ok::<_, Error>(Message::Text(text.into()))));

        let stream = ws_rx.filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => Some(Ok(text)),
                    Err(_) => {
                        debug!("Dropping non-UTF-8 binary frame");
                        None
                    }
                },
                // Ping/pong are answered by tungstenite; close is followed by end of stream
                Ok(_) => None,
                Err(e) => Some(Err(Error::Transport(format!("WebSocket error: {}", e)))),
            })
        });

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}

/// In-memory transport for tests
#[cfg(test)]
pub(crate) mod fake {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use futures::channel::mpsc;
    use parking_lot::Mutex;

    use super::*;

    /// Server side of one fake connection
    pub(crate) struct FakePeer {
        /// Frames the client sent
        pub(crate) from_client: mpsc::UnboundedReceiver<String>,
        /// Feed frames to the client; dropping it closes the connection
        pub(crate) to_client: mpsc::UnboundedSender<Result<String>>,
        /// URL the client dialed
        pub(crate) url: Url,
    }

    impl FakePeer {
        pub(crate) fn send(&self, value: serde_json::Value) {
            let _ = self.to_client.unbounded_send(Ok(value.to_string()));
        }

        pub(crate) fn send_raw(&self, text: &str) {
            let _ = self.to_client.unbounded_send(Ok(text.to_string()));
        }

        pub(crate) fn fail(&self, message: &str) {
            let _ = self
                .to_client
                .unbounded_send(Err(Error::Transport(message.to_string())));
        }

        /// Next frame the client sent, parsed
        pub(crate) async fn recv(&mut self) -> Option<serde_json::Value> {
            let text = self.from_client.next().await?;
            serde_json::from_str(&text).ok()
        }
    }

    /// Hands each new connection's peer to the test
    #[derive(Clone, Default)]
    pub(crate) struct FakeConnector {
        pub(crate) opened: Arc<AtomicUsize>,
        peers: Arc<Mutex<Vec<FakePeer>>>,
        refuse: Arc<Mutex<Option<String>>>,
        notify: Arc<tokio::sync::Notify>,
    }

    impl FakeConnector {
        pub(crate) fn refuse_with(&self, message: &str) {
            *self.refuse.lock() = Some(message.to_string());
        }

        pub(crate) fn connections(&self) -> usize {
            self.opened.load(Ordering::SeqCst)
        }

        /// Wait for the client to open the next connection
        pub(crate) async fn accept(&self) -> FakePeer {
            loop {
                let notified = self.notify.notified();
                let next = {
                    let mut peers = self.peers.lock();
                    (!peers.is_empty()).then(|| peers.remove(0))
                };
                if let Some(peer) = next {
                    return peer;
                }
                notified.await;
            }
        }
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn connect(&self, url: &Url) -> Result<(FrameSink, FrameStream)> {
            if let Some(message) = self.refuse.lock().clone() {
                return Err(Error::Transport(message));
            }
            self.opened.fetch_add(1, Ordering::SeqCst);

            let (client_tx, from_client) = mpsc::unbounded::<String>();
            let (to_client, client_rx) = mpsc::unbounded::<Result<String>>();

            self.peers.lock().push(FakePeer {
                from_client,
                to_client,
                url: url.clone(),
            });
            self.notify.notify_waiters();

            let sink = client_tx.sink_map_err(|e| Error::Transport(e.to_string()));
            Ok((Box::pin(sink), Box::pin(client_rx)))
        }
    }
}
