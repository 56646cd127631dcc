//! Transport adapters.
//!
//! Two interchangeable channels to the central system:
//!
//! - [`ws`]: one persistent socket, calls multiplexed by message id,
//!   automatic reconnect and keepalive.
//! - [`soap`]: a local listening endpoint for inbound document calls plus a
//!   correlated per-request client for outbound ones.
//!
//! Both expose the same seam: [`RpcChannel`] carries `(action, payload)`
//! pairs, and [`RemoteCentralSystem`] turns a channel into the typed
//! [`CentralSystem`](crate::service::CentralSystem) surface.

pub mod soap;
pub mod ws;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::bridge::ProtocolBridge;
use crate::ocpp::{
    Action, AuthorizeRequest, AuthorizeResponse, BootNotificationRequest,
    BootNotificationResponse, DataTransferRequest, DataTransferResponse, HeartbeatRequest,
    HeartbeatResponse, MeterValuesRequest, MeterValuesResponse, StartTransactionRequest,
    StartTransactionResponse, StatusNotificationRequest, StatusNotificationResponse,
    StopTransactionRequest, StopTransactionResponse,
};
use crate::service::{CentralSystem, Fault};

/// Failure of a single outbound call.
#[derive(Debug, Error)]
pub enum CallFailure {
    #[error("connection closed")]
    ConnectionClosed,

    #[error("timed out waiting for reply")]
    Timeout,

    #[error("codec: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("remote fault: {0}")]
    Fault(Fault),

    #[error("remote error {code}: {description}")]
    Rpc { code: String, description: String },

    #[error("transport: {0}")]
    Transport(String),
}

/// Failure to establish or keep a channel.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid endpoint: {0}")]
    Endpoint(String),

    #[error("websocket: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("no liveness signal within the keepalive timeout")]
    KeepAliveTimeout,
}

/// Direction of an envelope as seen from the charge point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Inbound => "in",
            Direction::Outbound => "out",
        })
    }
}

/// Receives every envelope crossing a transport, both directions.
pub trait TrafficSink: Send + Sync {
    fn record(&self, direction: Direction, peer: &str, envelope: &str);
}

/// Default sink: structured log records, or nothing when disabled.
pub struct LogSink {
    enabled: bool,
}

impl LogSink {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl TrafficSink for LogSink {
    fn record(&self, direction: Direction, peer: &str, envelope: &str) {
        if self.enabled {
            debug!(%direction, peer, envelope, "traffic");
        }
    }
}

/// Uniform calling seam over both transports.
#[async_trait]
pub trait RpcChannel: Send + Sync {
    async fn call(&self, action: Action, payload: Value) -> Result<Value, CallFailure>;
}

/// Typed proxy turning an [`RpcChannel`] into the full remote-call surface.
/// Date conversion happens here, on both the request and the reply, so the
/// channels only ever see wire-shaped payloads.
pub struct RemoteCentralSystem<C> {
    channel: C,
    bridge: Arc<ProtocolBridge>,
}

impl<C: RpcChannel> RemoteCentralSystem<C> {
    pub fn new(channel: C, bridge: Arc<ProtocolBridge>) -> Self {
        Self { channel, bridge }
    }

    async fn call_typed<Req, Resp>(&self, action: Action, request: &Req) -> Result<Resp, CallFailure>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let mut payload = serde_json::to_value(request)?;
        self.bridge.encode_outbound(&mut payload);
        let mut reply = self.channel.call(action, payload).await?;
        self.bridge.decode_inbound(&mut reply);
        Ok(serde_json::from_value(reply)?)
    }
}

#[async_trait]
impl<C: RpcChannel> CentralSystem for RemoteCentralSystem<C> {
    async fn boot_notification(
        &self,
        request: BootNotificationRequest,
    ) -> Result<BootNotificationResponse, CallFailure> {
        self.call_typed(Action::BootNotification, &request).await
    }

    async fn heartbeat(&self) -> Result<HeartbeatResponse, CallFailure> {
        self.call_typed(Action::Heartbeat, &HeartbeatRequest {})
            .await
    }

    async fn status_notification(
        &self,
        request: StatusNotificationRequest,
    ) -> Result<StatusNotificationResponse, CallFailure> {
        self.call_typed(Action::StatusNotification, &request).await
    }

    async fn authorize(
        &self,
        request: AuthorizeRequest,
    ) -> Result<AuthorizeResponse, CallFailure> {
        self.call_typed(Action::Authorize, &request).await
    }

    async fn start_transaction(
        &self,
        request: StartTransactionRequest,
    ) -> Result<StartTransactionResponse, CallFailure> {
        self.call_typed(Action::StartTransaction, &request).await
    }

    async fn stop_transaction(
        &self,
        request: StopTransactionRequest,
    ) -> Result<StopTransactionResponse, CallFailure> {
        self.call_typed(Action::StopTransaction, &request).await
    }

    async fn meter_values(
        &self,
        request: MeterValuesRequest,
    ) -> Result<MeterValuesResponse, CallFailure> {
        self.call_typed(Action::MeterValues, &request).await
    }

    async fn data_transfer(
        &self,
        request: DataTransferRequest,
    ) -> Result<DataTransferResponse, CallFailure> {
        self.call_typed(Action::DataTransfer, &request).await
    }
}
