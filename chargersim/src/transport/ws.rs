//! Persistent socket transport.
//!
//! One long-lived WebSocket connection to `<endpoint>/<identity>`, speaking
//! the `ocpp1.6` subprotocol. Outbound calls are multiplexed over the
//! connection and correlated by message id; inbound calls dispatch through
//! the protocol bridge. The connection reconnects automatically with
//! exponential backoff, and a keepalive timer tears it down when no
//! liveness signal arrives within the configured timeout.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        handshake::client::Request,
        http::{header, Uri},
        Message,
    },
};
use tracing::{debug, error, info, warn};

use crate::bridge::ProtocolBridge;
use crate::ocpp::{Action, Frame, RpcErrorCode};
use crate::transport::{CallFailure, Direction, RpcChannel, TransportError};

/// Protocol-version marker sent during the WebSocket handshake.
pub const SUBPROTOCOL: &str = "ocpp1.6";

#[derive(Debug, Clone)]
pub struct WsSettings {
    /// Central system base URL, without the charge point identity.
    pub endpoint: String,
    /// Charge point identity, appended to the URL path.
    pub identity: String,
    /// Initial reconnect delay.
    pub reconnect_delay: Duration,
    /// Backoff cap.
    pub max_reconnect_delay: Duration,
    /// Bound on each outbound call awaiting its reply.
    pub request_timeout: Duration,
    /// Liveness window; `None` disables keepalive pings entirely.
    pub keepalive_timeout: Option<Duration>,
}

impl WsSettings {
    pub fn url(&self) -> String {
        format!("{}/{}", self.endpoint.trim_end_matches('/'), self.identity)
    }
}

type PendingReply = oneshot::Sender<Result<Value, CallFailure>>;

struct Shared {
    settings: WsSettings,
    bridge: Arc<ProtocolBridge>,
    outgoing: mpsc::Sender<Frame>,
    pending: Mutex<HashMap<String, PendingReply>>,
}

/// Handle to the socket channel. Cheap to clone; the connection itself
/// lives in a background task owned by this handle.
#[derive(Clone)]
pub struct WsChannel {
    shared: Arc<Shared>,
    run_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl WsChannel {
    /// Spawn the connection loop. Calls made before the connection is up
    /// are buffered and flushed once it is.
    pub fn connect(settings: WsSettings, bridge: Arc<ProtocolBridge>) -> Self {
        let (outgoing_tx, outgoing_rx) = mpsc::channel(64);
        let shared = Arc::new(Shared {
            settings,
            bridge,
            outgoing: outgoing_tx,
            pending: Mutex::new(HashMap::new()),
        });
        let run_task = tokio::spawn(run(shared.clone(), outgoing_rx));
        Self {
            shared,
            run_task: Arc::new(Mutex::new(Some(run_task))),
        }
    }

    /// Tear the channel down. Pending calls fail with `ConnectionClosed`.
    pub fn close(&self) {
        if let Some(task) = self.run_task.lock().take() {
            task.abort();
        }
        drain_pending(&self.shared);
    }
}

#[async_trait::async_trait]
impl RpcChannel for WsChannel {
    async fn call(&self, action: Action, payload: Value) -> Result<Value, CallFailure> {
        let frame = Frame::call(action, payload);
        let message_id = frame.message_id().to_string();

        let (reply_tx, reply_rx) = oneshot::channel();
        self.shared
            .pending
            .lock()
            .insert(message_id.clone(), reply_tx);

        if self.shared.outgoing.send(frame).await.is_err() {
            self.shared.pending.lock().remove(&message_id);
            return Err(CallFailure::ConnectionClosed);
        }

        match tokio::time::timeout(self.shared.settings.request_timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CallFailure::ConnectionClosed),
            Err(_) => {
                self.shared.pending.lock().remove(&message_id);
                Err(CallFailure::Timeout)
            }
        }
    }
}

enum LoopExit {
    /// All channel handles dropped or `close()` called.
    Shutdown,
    /// Central system closed the connection.
    Closed,
}

async fn run(shared: Arc<Shared>, mut outgoing_rx: mpsc::Receiver<Frame>) {
    let mut delay = shared.settings.reconnect_delay;

    loop {
        info!(url = %shared.settings.url(), "connecting to central system");

        match connect_and_run(&shared, &mut outgoing_rx).await {
            Ok(LoopExit::Shutdown) => break,
            Ok(LoopExit::Closed) => info!("connection closed by central system"),
            Err(error) => error!(%error, "connection lost"),
        }

        drain_pending(&shared);

        debug!(?delay, "reconnecting");
        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(shared.settings.max_reconnect_delay);
    }
}

async fn connect_and_run(
    shared: &Arc<Shared>,
    outgoing_rx: &mut mpsc::Receiver<Frame>,
) -> Result<LoopExit, TransportError> {
    let url = shared.settings.url();
    let uri: Uri = url
        .parse()
        .map_err(|_| TransportError::Endpoint(url.clone()))?;

    let request = Request::builder()
        .uri(url.as_str())
        .header(header::SEC_WEBSOCKET_PROTOCOL, SUBPROTOCOL)
        .header(header::HOST, uri.host().unwrap_or("localhost"))
        .body(())
        .map_err(|_| TransportError::Endpoint(url.clone()))?;

    let (ws_stream, response) = connect_async(request).await?;

    let accepted = response
        .headers()
        .get(header::SEC_WEBSOCKET_PROTOCOL)
        .and_then(|value| value.to_str().ok());
    if accepted != Some(SUBPROTOCOL) {
        warn!(?accepted, "central system did not accept the {SUBPROTOCOL} subprotocol");
    }

    info!(%url, "connected");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let mut last_seen = Instant::now();
    let mut keepalive = tokio::time::interval(keepalive_period(&shared.settings));
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            frame = outgoing_rx.recv() => match frame {
                Some(frame) => {
                    let text = match frame.encode() {
                        Ok(text) => text,
                        Err(error) => {
                            error!(%error, "failed to encode frame");
                            continue;
                        }
                    };
                    shared.bridge.traffic(Direction::Outbound, &text);
                    ws_tx.send(Message::Text(text)).await?;
                }
                None => return Ok(LoopExit::Shutdown),
            },

            message = ws_rx.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    last_seen = Instant::now();
                    shared.bridge.traffic(Direction::Inbound, &text);
                    handle_frame(shared, &text);
                }
                Some(Ok(Message::Ping(payload))) => {
                    last_seen = Instant::now();
                    ws_tx.send(Message::Pong(payload)).await?;
                }
                Some(Ok(Message::Pong(_))) => {
                    last_seen = Instant::now();
                }
                Some(Ok(Message::Close(_))) | None => return Ok(LoopExit::Closed),
                Some(Ok(_)) => {}
                Some(Err(error)) => return Err(error.into()),
            },

            _ = keepalive.tick() => {
                if let Some(timeout) = shared.settings.keepalive_timeout {
                    if last_seen.elapsed() > timeout {
                        return Err(TransportError::KeepAliveTimeout);
                    }
                    ws_tx.send(Message::Ping(Vec::new())).await?;
                }
            }
        }
    }
}

/// Inbound frames never block the connection loop: calls are dispatched on
/// their own task and the reply funnels back through the outgoing queue.
fn handle_frame(shared: &Arc<Shared>, text: &str) {
    match Frame::parse(text) {
        Ok(Frame::Call {
            message_id,
            action,
            payload,
        }) => {
            let shared = Arc::clone(shared);
            tokio::spawn(async move {
                let reply = match shared.bridge.dispatch(action, payload).await {
                    Ok(payload) => Frame::result(message_id, payload),
                    Err(fault) => {
                        Frame::error(message_id, RpcErrorCode::InternalError, fault.reason)
                    }
                };
                if shared.outgoing.send(reply).await.is_err() {
                    warn!("channel closed before reply could be sent");
                }
            });
        }
        Ok(Frame::CallResult {
            message_id,
            payload,
        }) => {
            match shared.pending.lock().remove(&message_id) {
                Some(reply_tx) => {
                    let _ = reply_tx.send(Ok(payload));
                }
                None => warn!(%message_id, "reply for unknown call"),
            }
        }
        Ok(Frame::CallError {
            message_id,
            code,
            description,
            ..
        }) => {
            if let Some(reply_tx) = shared.pending.lock().remove(&message_id) {
                let _ = reply_tx.send(Err(CallFailure::Rpc {
                    code: format!("{code:?}"),
                    description,
                }));
            }
        }
        Err(error) => warn!(%error, "unparseable frame"),
    }
}

fn drain_pending(shared: &Shared) {
    let mut pending = shared.pending.lock();
    for (_, reply_tx) in pending.drain() {
        let _ = reply_tx.send(Err(CallFailure::ConnectionClosed));
    }
}

fn keepalive_period(settings: &WsSettings) -> Duration {
    match settings.keepalive_timeout {
        Some(timeout) => (timeout / 2).max(Duration::from_millis(1)),
        // Keepalive disabled: tick rarely, do nothing on tick.
        None => Duration::from_secs(3600),
    }
}
