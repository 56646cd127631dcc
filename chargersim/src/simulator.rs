//! Simulator wiring.
//!
//! Selects and establishes the transport, connects the protocol bridge to
//! the charge point's handler set, and exposes the driver surface the CLI
//! uses. The transport handle lives in the instance, never in a global, so
//! several simulators can coexist in one process.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::bridge::ProtocolBridge;
use crate::charge_point::ChargePoint;
use crate::config::SimulatorConfig;
use crate::ocpp::{BootNotificationRequest, CommandStatus};
use crate::service::CentralSystem;
use crate::transport::soap::{DocumentClient, DocumentServer};
use crate::transport::ws::{WsChannel, WsSettings};
use crate::transport::{LogSink, RemoteCentralSystem, TransportError};

#[derive(Debug, Error)]
pub enum SimulatorError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("simulator already started")]
    AlreadyStarted,

    #[error("simulator not started")]
    NotStarted,
}

enum ActiveChannel {
    Socket(WsChannel),
    Document(DocumentServer),
}

/// One simulated charge point wired to one central system.
pub struct ChargerSimulator {
    config: SimulatorConfig,
    charge_point: ChargePoint,
    central_system: Option<Arc<dyn CentralSystem>>,
    channel: Option<ActiveChannel>,
}

impl ChargerSimulator {
    pub fn new(config: SimulatorConfig) -> Self {
        let charge_point = ChargePoint::new(config.clone());
        Self {
            config,
            charge_point,
            central_system: None,
            channel: None,
        }
    }

    pub fn charge_point(&self) -> &ChargePoint {
        &self.charge_point
    }

    /// The remote-call surface, for ad hoc driver calls. Available after
    /// [`start`](Self::start).
    pub fn central_system(&self) -> Result<Arc<dyn CentralSystem>, SimulatorError> {
        self.central_system
            .clone()
            .ok_or(SimulatorError::NotStarted)
    }

    /// Establish the transport, register the handler set and begin the
    /// heartbeat. A configured local listening port selects the document
    /// transport; otherwise the socket transport is used.
    pub async fn start(&mut self) -> Result<(), SimulatorError> {
        if self.channel.is_some() {
            return Err(SimulatorError::AlreadyStarted);
        }

        let sink = Arc::new(LogSink::new(self.config.log_traffic));
        let bridge = Arc::new(ProtocolBridge::new(
            Arc::new(self.charge_point.clone()),
            sink,
            self.config.identity.clone(),
        ));

        let central_system: Arc<dyn CentralSystem> = match self.config.local_port {
            Some(port) => {
                let server =
                    DocumentServer::bind(port, &self.config.local_path, bridge.clone()).await?;
                let client = DocumentClient::new(
                    self.config.endpoint.as_str(),
                    self.config.identity.as_str(),
                    server.local_url.as_str(),
                    bridge.clone(),
                    self.config.request_timeout,
                )?;
                info!(endpoint = %self.config.endpoint, listener = %server.local_url,
                    "document transport established");
                self.channel = Some(ActiveChannel::Document(server));
                Arc::new(RemoteCentralSystem::new(client, bridge))
            }
            None => {
                let settings = WsSettings {
                    endpoint: self.config.endpoint.clone(),
                    identity: self.config.identity.clone(),
                    reconnect_delay: self.config.reconnect_delay,
                    max_reconnect_delay: self.config.max_reconnect_delay,
                    request_timeout: self.config.request_timeout,
                    keepalive_timeout: self.config.keepalive_timeout,
                };
                let channel = WsChannel::connect(settings, bridge.clone());
                self.channel = Some(ActiveChannel::Socket(channel.clone()));
                Arc::new(RemoteCentralSystem::new(channel, bridge))
            }
        };

        self.charge_point
            .attach_central_system(central_system.clone());
        self.central_system = Some(central_system.clone());

        if self.config.boot_on_start {
            let request = BootNotificationRequest {
                charge_point_vendor: self.config.vendor.clone(),
                charge_point_model: self.config.model.clone(),
            };
            match central_system.boot_notification(request).await {
                Ok(reply) => info!(status = ?reply.status, interval = reply.interval,
                    "boot notification acknowledged"),
                Err(error) => warn!(%error, "BootNotification failed"),
            }
        }

        // Runs for the lifetime of the process; deliberately detached.
        let _ = self.charge_point.start_heartbeat();

        Ok(())
    }

    /// Driver surface: start a transaction locally, optionally honoring the
    /// configured start delay.
    pub fn start_transaction(
        &self,
        connector_id: i32,
        id_tag: &str,
        apply_delay: bool,
    ) -> CommandStatus {
        self.charge_point
            .begin_transaction(connector_id, id_tag, apply_delay)
    }

    /// Driver surface: stop the live transaction.
    pub fn stop_transaction(&self, apply_delay: bool) -> CommandStatus {
        self.charge_point.end_transaction(None, apply_delay)
    }

    /// Tear down the active channel.
    pub fn disconnect(&mut self) {
        match self.channel.take() {
            Some(ActiveChannel::Socket(channel)) => channel.close(),
            Some(ActiveChannel::Document(server)) => server.shutdown(),
            None => {}
        }
    }

    /// URL of the local document listener, when that transport is active.
    /// This is the address the central system posts inbound calls to.
    pub fn local_listener_url(&self) -> Option<&str> {
        match &self.channel {
            Some(ActiveChannel::Document(server)) => Some(server.local_url.as_str()),
            _ => None,
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }
}

impl Drop for ChargerSimulator {
    fn drop(&mut self) {
        self.disconnect();
    }
}
