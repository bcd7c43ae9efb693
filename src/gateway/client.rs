//! Gateway client
//!
//! One authenticated WebSocket to the gateway, shared by every caller in the
//! process. The server opens the handshake with a `connect.challenge` event;
//! the client answers with a `connect` request and is usable once that
//! request succeeds. All later calls are `req` frames correlated to their
//! `res` frames by a random id, so responses may arrive in any order.
//!
//! ```rust,no_run
//! use agency_gateway::gateway::{ClientOptions, GatewayClient};
//!
//! # async fn example() -> agency_gateway::Result<()> {
//! let client = GatewayClient::new(ClientOptions::new("ws://127.0.0.1:18789", "token"))?;
//! client.connect().await?;
//! let sessions = client.list_sessions().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use futures::{SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use super::events::{EventBus, GatewayEvent};
use super::protocol::{
    methods, AuthParams, ClientInfo, ConnectParams, GatewayFrame, InboundFrame, ProtocolVersion,
    RequestFrame, ResponseFrame,
};
use super::transport::{Connector, FrameSink, FrameStream, WsConnector};
use crate::config::GatewayConfig;
use crate::error::{ConnectError, Error, Result};

/// Default gateway endpoint
pub const DEFAULT_GATEWAY_URL: &str = "ws://127.0.0.1:18789";

/// Time allowed for the socket to open and the handshake to finish
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Time allowed for any single RPC
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Messages requested by `chat.history`
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

/// Settings for one client instance
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// WebSocket endpoint
    pub url: String,
    /// Auth token, sent as `?token=` and in the `connect` request
    pub token: SecretString,
    /// Handshake deadline
    pub connect_timeout: Duration,
    /// Per-request deadline
    pub request_timeout: Duration,
    /// `chat.history` limit
    pub history_limit: u32,
    /// Identity reported in the handshake
    pub client: ClientInfo,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            url: DEFAULT_GATEWAY_URL.to_string(),
            token: SecretString::from(String::new()),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            history_limit: DEFAULT_HISTORY_LIMIT,
            client: ClientInfo::default(),
        }
    }
}

impl ClientOptions {
    /// Options for an endpoint and token, defaults elsewhere
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        ClientOptions {
            url: url.into(),
            token: SecretString::from(token.into()),
            ..Default::default()
        }
    }

    /// Options from the `gateway` configuration section
    pub fn from_config(config: &GatewayConfig) -> Self {
        ClientOptions {
            url: config.url.clone(),
            token: config.token.clone(),
            connect_timeout: config.connect_timeout,
            request_timeout: config.request_timeout,
            history_limit: config.history_limit,
            client: config.client.clone(),
        }
    }

    /// Set both timeouts
    pub fn with_timeouts(mut self, connect: Duration, request: Duration) -> Self {
        self.connect_timeout = connect;
        self.request_timeout = request;
        self
    }

    /// The URL actually dialed: `url` plus the token query parameter
    pub fn endpoint(&self) -> Result<Url> {
        let mut url = Url::parse(&self.url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::Config(format!(
                "Gateway URL must use ws:// or wss://, got {}",
                url.scheme()
            )));
        }
        let token = self.token.expose_secret();
        if !token.is_empty() {
            url.query_pairs_mut().append_pair("token", token);
        }
        Ok(url)
    }
}

/// Where the connection is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No usable transport
    Disconnected,
    /// Transport opening or handshake pending
    Connecting,
    /// Handshake completed; RPCs allowed
    Authenticated,
}

type ConnectOutcome = std::result::Result<(), ConnectError>;
type SharedConnect = Shared<BoxFuture<'static, ConnectOutcome>>;

/// One in-flight RPC
struct PendingRequest {
    method: String,
    responder: oneshot::Sender<Result<Value>>,
}

/// Connection a request belongs to; checked after the request is registered
#[derive(Debug, Clone, Copy)]
struct Registration {
    generation: u64,
    state: ConnectionState,
}

/// An open transport and the tasks pumping it
struct Link {
    outbound: mpsc::UnboundedSender<String>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Link {
    fn is_open(&self) -> bool {
        !self.outbound.is_closed()
    }

    /// Stop reading first so the socket can no longer report back, then let
    /// the writer flush and close. The returned handle finishes once the
    /// transport is closed.
    fn close(self) -> JoinHandle<()> {
        self.reader.abort();
        drop(self.outbound);
        self.writer
    }
}

struct ConnectionSlot {
    state: ConnectionState,
    /// Bumped for every new transport and on `disconnect()`; callbacks
    /// carrying an older generation are ignored.
    generation: u64,
    link: Option<Link>,
    connecting: Option<SharedConnect>,
    handshake: Option<oneshot::Sender<ConnectOutcome>>,
    challenge_answered: bool,
}

struct Inner {
    options: ClientOptions,
    endpoint: Url,
    connector: Arc<dyn Connector>,
    slot: Mutex<ConnectionSlot>,
    pending: Mutex<HashMap<String, PendingRequest>>,
    events: EventBus,
}

/// Client for the gateway's WebSocket RPC interface.
///
/// Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct GatewayClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("url", &self.inner.options.url)
            .field("state", &self.state())
            .finish()
    }
}

impl GatewayClient {
    /// Client using the WebSocket transport
    pub fn new(options: ClientOptions) -> Result<Self> {
        Self::with_connector(options, Arc::new(WsConnector))
    }

    /// Client using a custom transport
    pub fn with_connector(options: ClientOptions, connector: Arc<dyn Connector>) -> Result<Self> {
        let endpoint = options.endpoint()?;
        Ok(GatewayClient {
            inner: Arc::new(Inner {
                options,
                endpoint,
                connector,
                slot: Mutex::new(ConnectionSlot {
                    state: ConnectionState::Disconnected,
                    generation: 0,
                    link: None,
                    connecting: None,
                    handshake: None,
                    challenge_answered: false,
                }),
                pending: Mutex::new(HashMap::new()),
                events: EventBus::new(),
            }),
        })
    }

    /// Options this client was built with
    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    /// Connect and authenticate.
    ///
    /// Returns at once when already authenticated. Callers arriving while an
    /// attempt is in flight wait for that attempt and share its outcome.
    pub async fn connect(&self) -> Result<()> {
        let attempt = {
            let mut slot = self.inner.slot.lock();
            if slot.state == ConnectionState::Authenticated
                && slot.link.as_ref().is_some_and(Link::is_open)
            {
                return Ok(());
            }
            if let Some(attempt) = slot.connecting.clone() {
                debug!("Joining in-flight gateway connect");
                attempt
            } else {
                Arc::clone(&self.inner).start_connect(&mut slot)
            }
        };

        attempt.await.map_err(Error::from)
    }

    /// Close the connection.
    ///
    /// Takes effect immediately and emits no `disconnected` event. Pending
    /// calls and any in-flight `connect()` fail with a closed-connection
    /// error. Safe to call when already disconnected.
    pub fn disconnect(&self) {
        self.detach();
    }

    /// Like [`disconnect`](Self::disconnect), then wait until the transport
    /// has written its close frame, at most the connect timeout.
    pub async fn close(&self) {
        let Some(writer) = self.detach() else { return };
        if tokio::time::timeout(self.inner.options.connect_timeout, writer)
            .await
            .is_err()
        {
            debug!("Gateway transport did not close in time");
        }
    }

    fn detach(&self) -> Option<JoinHandle<()>> {
        let link = {
            let mut slot = self.inner.slot.lock();
            slot.generation += 1;
            slot.state = ConnectionState::Disconnected;
            slot.connecting = None;
            slot.handshake = None;
            slot.challenge_answered = false;
            slot.link.take()
        };

        let writer = link.map(|link| {
            info!("Disconnected from gateway");
            link.close()
        });
        self.inner.fail_pending("client disconnected");
        writer
    }

    /// Authenticated with an open transport
    pub fn is_connected(&self) -> bool {
        let slot = self.inner.slot.lock();
        slot.state == ConnectionState::Authenticated && slot.link.as_ref().is_some_and(Link::is_open)
    }

    /// A connect attempt is in flight
    pub fn is_connecting(&self) -> bool {
        self.inner.slot.lock().connecting.is_some()
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.inner.slot.lock().state
    }

    /// Number of requests awaiting a response
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Call a gateway method.
    ///
    /// Fails with [`Error::NotConnected`] without sending anything unless the
    /// client is authenticated. `params` defaults to `{}`.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Option<Value>) -> Result<T> {
        let (outbound, generation) = self.inner.authenticated_outbound()?;
        let payload = self
            .inner
            .send_request(
                &outbound,
                Registration {
                    generation,
                    state: ConnectionState::Authenticated,
                },
                method,
                params.unwrap_or_else(|| json!({})),
                self.inner.options.request_timeout,
            )
            .await?;
        Ok(serde_json::from_value(payload)?)
    }

    /// Receive every client event
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.events.subscribe()
    }

    /// Receive the params of one notification method
    pub fn subscribe_method(&self, method: impl Into<String>) -> impl Stream<Item = Value> + Send {
        self.inner.events.subscribe_method(method)
    }
}

impl Inner {
    fn start_connect(self: Arc<Self>, slot: &mut ConnectionSlot) -> SharedConnect {
        if let Some(stale) = slot.link.take() {
            debug!("Tearing down stale gateway transport");
            stale.close();
            self.fail_pending("connection replaced");
        }

        slot.generation += 1;
        slot.state = ConnectionState::Connecting;
        slot.challenge_answered = false;
        let generation = slot.generation;

        let (handshake_tx, handshake_rx) = oneshot::channel();
        slot.handshake = Some(handshake_tx);

        info!(url = %self.options.url, "Connecting to gateway");
        let task = tokio::spawn(self.establish(generation, handshake_rx));
        let attempt = async move {
            task.await
                .unwrap_or_else(|e| Err(ConnectError::Transport(format!("connect task failed: {}", e))))
        }
        .boxed()
        .shared();

        slot.connecting = Some(attempt.clone());
        attempt
    }

    async fn establish(
        self: Arc<Self>,
        generation: u64,
        handshake_rx: oneshot::Receiver<ConnectOutcome>,
    ) -> ConnectOutcome {
        let deadline = self.options.connect_timeout;
        let outcome = match tokio::time::timeout(
            deadline,
            Arc::clone(&self).open_and_authenticate(generation, handshake_rx),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(ConnectError::Timeout(deadline)),
        };
        self.finish_connect(generation, outcome)
    }

    async fn open_and_authenticate(
        self: Arc<Self>,
        generation: u64,
        handshake_rx: oneshot::Receiver<ConnectOutcome>,
    ) -> ConnectOutcome {
        let (sink, stream) = self
            .connector
            .connect(&self.endpoint)
            .await
            .map_err(|e| match e {
                Error::Transport(message) => ConnectError::Transport(message),
                other => ConnectError::Transport(other.to_string()),
            })?;

        let link = Arc::clone(&self).spawn_link(generation, sink, stream);
        {
            let mut slot = self.slot.lock();
            if slot.generation != generation {
                link.close();
                return Err(ConnectError::Closed("connection attempt superseded".to_string()));
            }
            slot.link = Some(link);
        }
        debug!("Gateway transport open, waiting for challenge");

        handshake_rx
            .await
            .unwrap_or_else(|_| Err(ConnectError::Closed("handshake abandoned".to_string())))
    }

    fn finish_connect(&self, generation: u64, outcome: ConnectOutcome) -> ConnectOutcome {
        let mut slot = self.slot.lock();
        if slot.generation != generation {
            return outcome.and(Err(ConnectError::Closed(
                "disconnected during handshake".to_string(),
            )));
        }

        slot.connecting = None;
        slot.handshake = None;

        let outcome = outcome.and_then(|()| {
            if slot.link.as_ref().is_some_and(Link::is_open) {
                Ok(())
            } else {
                Err(ConnectError::Closed("transport closed after handshake".to_string()))
            }
        });

        match outcome {
            Ok(()) => {
                slot.state = ConnectionState::Authenticated;
                drop(slot);
                info!("Connected to gateway");
                self.events.emit(GatewayEvent::Connected);
                Ok(())
            }
            Err(err) => {
                slot.state = ConnectionState::Disconnected;
                let link = slot.link.take();
                drop(slot);
                if let Some(link) = link {
                    link.close();
                }
                self.fail_pending("handshake failed");
                warn!(error = %err, "Gateway connect failed");
                self.events.emit(GatewayEvent::Error {
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    fn spawn_link(self: Arc<Self>, generation: u64, mut sink: FrameSink, mut stream: FrameStream) -> Link {
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();

        let writer = tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(e) = sink.send(text).await {
                    warn!(error = %e, "Failed to write gateway frame");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let weak: Weak<Inner> = Arc::downgrade(&self);
        let reply = outbound.clone();
        drop(self);

        let reader = tokio::spawn(async move {
            let (reason, failed) = loop {
                match stream.next().await {
                    Some(Ok(text)) => {
                        let Some(inner) = weak.upgrade() else { return };
                        inner.handle_frame(generation, &text, &reply);
                    }
                    Some(Err(e)) => break (e.to_string(), true),
                    None => break ("connection closed by gateway".to_string(), false),
                }
            };
            drop(reply);
            if let Some(inner) = weak.upgrade() {
                inner.on_transport_closed(generation, reason, failed);
            }
        });

        Link {
            outbound,
            reader,
            writer,
        }
    }

    fn handle_frame(
        self: &Arc<Self>,
        generation: u64,
        text: &str,
        reply: &mpsc::UnboundedSender<String>,
    ) {
        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Dropping malformed gateway frame");
                return;
            }
        };

        match frame {
            InboundFrame::Response(res) => self.resolve(res),
            InboundFrame::Challenge(_) => self.answer_challenge(generation, reply.clone()),
            InboundFrame::Notification { method, params, frame } => {
                debug!(method = %method, "Gateway notification");
                self.events.emit_notification(method, params, frame);
            }
            InboundFrame::Unrecognized(_) => debug!("Ignoring unrecognized gateway frame"),
        }
    }

    fn answer_challenge(self: &Arc<Self>, generation: u64, outbound: mpsc::UnboundedSender<String>) {
        {
            let mut slot = self.slot.lock();
            if slot.generation != generation
                || slot.state != ConnectionState::Connecting
                || slot.handshake.is_none()
                || slot.challenge_answered
            {
                debug!("Ignoring challenge outside of a handshake");
                return;
            }
            slot.challenge_answered = true;
        }

        let params = ConnectParams {
            protocol: ProtocolVersion::default(),
            client: self.options.client.clone(),
            auth: AuthParams {
                token: self.options.token.expose_secret().to_string(),
            },
        };

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let params = match serde_json::to_value(&params) {
                Ok(params) => params,
                Err(e) => {
                    inner.complete_handshake(generation, Err(ConnectError::Transport(e.to_string())));
                    return;
                }
            };
            debug!("Answering gateway challenge");

            let deadline = inner.options.connect_timeout;
            let outcome = match inner
                .send_request(
                    &outbound,
                    Registration {
                        generation,
                        state: ConnectionState::Connecting,
                    },
                    methods::CONNECT,
                    params,
                    deadline,
                )
                .await
            {
                Ok(_) => Ok(()),
                Err(Error::Rpc { message, .. }) => Err(ConnectError::Authentication(message)),
                Err(Error::Timeout(_)) => Err(ConnectError::Timeout(deadline)),
                Err(Error::ConnectionClosed(reason)) => Err(ConnectError::Closed(reason)),
                Err(other) => Err(ConnectError::Transport(other.to_string())),
            };
            inner.complete_handshake(generation, outcome);
        });
    }

    fn complete_handshake(&self, generation: u64, outcome: ConnectOutcome) {
        let handshake = {
            let mut slot = self.slot.lock();
            if slot.generation == generation {
                slot.handshake.take()
            } else {
                None
            }
        };
        if let Some(tx) = handshake {
            let _ = tx.send(outcome);
        }
    }

    fn authenticated_outbound(&self) -> Result<(mpsc::UnboundedSender<String>, u64)> {
        let slot = self.slot.lock();
        if slot.state != ConnectionState::Authenticated {
            return Err(Error::NotConnected);
        }
        match &slot.link {
            Some(link) if link.is_open() => Ok((link.outbound.clone(), slot.generation)),
            _ => Err(Error::NotConnected),
        }
    }

    async fn send_request(
        &self,
        outbound: &mpsc::UnboundedSender<String>,
        registration: Registration,
        method: &str,
        params: Value,
        deadline: Duration,
    ) -> Result<Value> {
        let id = Uuid::new_v4().to_string();
        let text = serde_json::to_string(&GatewayFrame::Request(RequestFrame {
            id: id.clone(),
            method: method.to_string(),
            params,
        }))?;

        let (responder, mut rx) = oneshot::channel();
        self.pending.lock().insert(
            id.clone(),
            PendingRequest {
                method: method.to_string(),
                responder,
            },
        );

        // A close that drained `pending` before the insert above has already
        // moved the slot on; fail here instead of waiting out the deadline.
        let current = {
            let slot = self.slot.lock();
            slot.generation == registration.generation && slot.state == registration.state
        };
        if !current {
            self.pending.lock().remove(&id);
            return Err(Error::ConnectionClosed(format!("{} not sent: connection closed", method)));
        }

        debug!(method, id = %id, "Sending gateway request");
        if outbound.send(text).is_err() {
            self.pending.lock().remove(&id);
            return Err(Error::ConnectionClosed("transport is not writable".to_string()));
        }

        match tokio::time::timeout(deadline, &mut rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed(format!("{} abandoned", method))),
            Err(_) => {
                if self.pending.lock().remove(&id).is_some() {
                    warn!(method, id = %id, "Gateway request timed out");
                    Err(Error::Timeout(format!("Request timeout: {}", method)))
                } else {
                    // Settled between the deadline and the removal
                    rx.try_recv()
                        .unwrap_or_else(|_| Err(Error::Timeout(format!("Request timeout: {}", method))))
                }
            }
        }
    }

    fn resolve(&self, res: ResponseFrame) {
        let entry = self.pending.lock().remove(&res.id);
        let Some(entry) = entry else {
            debug!(id = %res.id, "Dropping response with no pending request");
            return;
        };

        let result = if res.ok {
            Ok(res.payload.unwrap_or(Value::Null))
        } else {
            Err(Error::Rpc {
                message: res.error_message(),
                code: res.error_code(),
            })
        };

        if entry.responder.send(result).is_err() {
            debug!(method = %entry.method, "Caller stopped waiting for response");
        }
    }

    fn fail_pending(&self, reason: &str) -> usize {
        let drained: Vec<PendingRequest> = self.pending.lock().drain().map(|(_, p)| p).collect();
        let count = drained.len();
        for entry in drained {
            debug!(method = %entry.method, "Failing pending request");
            let _ = entry
                .responder
                .send(Err(Error::ConnectionClosed(reason.to_string())));
        }
        count
    }

    fn on_transport_closed(&self, generation: u64, reason: String, failed: bool) {
        let (previous, handshake) = {
            let mut slot = self.slot.lock();
            if slot.generation != generation {
                return;
            }
            slot.link = None;
            let previous = slot.state;
            if previous == ConnectionState::Authenticated {
                slot.state = ConnectionState::Disconnected;
            }
            (previous, slot.handshake.take())
        };

        if let Some(tx) = handshake {
            let err = if failed {
                ConnectError::Transport(reason.clone())
            } else {
                ConnectError::Closed(reason.clone())
            };
            let _ = tx.send(Err(err));
        }

        let failed_calls = self.fail_pending(&reason);

        if previous == ConnectionState::Authenticated {
            info!(reason = %reason, failed_calls, "Gateway connection lost");
            if failed {
                self.events.emit(GatewayEvent::Error {
                    message: reason.clone(),
                });
            }
            self.events.emit(GatewayEvent::Disconnected { reason });
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(link) = self.slot.get_mut().link.take() {
            link.close();
        }
    }
}
