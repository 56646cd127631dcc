//! # chargersim
//!
//! Simulates the charge-point end of the OCPP protocol: a single-connector
//! charging station that connects to a central system, runs the transaction
//! lifecycle (remote start, periodic metering, remote stop) and answers the
//! central system's configuration and command operations.
//!
//! ## Architecture
//!
//! ```text
//! Central System
//!   │ WebSocket RPC (ocpp1.6)        │ SOAP document exchange
//!   ▼                                ▼
//! ┌──────────────────────────────────────────────┐
//! │ transport: WsChannel       │ DocumentServer/ │
//! │ (persistent, multiplexed)  │ DocumentClient  │
//! ├──────────────────────────────────────────────┤
//! │ bridge: date codec, dispatch, fault synthesis│
//! ├──────────────────────────────────────────────┤
//! │ charge_point: phases, timers, configuration  │
//! └──────────────────────────────────────────────┘
//!   ▲ driver surface (CLI): start/stop, ad hoc calls
//! ```
//!
//! Both transports expose the same two seams: the
//! [`CentralSystem`](service::CentralSystem) remote-call surface for
//! outbound operations, and the
//! [`ChargePointService`](service::ChargePointService) handler set for
//! inbound ones. The [`bridge`] sits between the transports and those
//! seams: it converts wire dates in both directions and collapses every
//! inbound processing failure into a fixed fault reply.
//!
//! ## Usage
//!
//! ```no_run
//! use chargersim::{ChargerSimulator, SimulatorConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SimulatorConfig::new("ws://localhost:8080/ocpp", "CP-1");
//!     let mut simulator = ChargerSimulator::new(config);
//!     simulator.start().await?;
//!
//!     simulator.start_transaction(1, "123456", false);
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod charge_point;
pub mod config;
pub mod configuration;
pub mod dates;
pub mod ocpp;
pub mod service;
pub mod simulator;
pub mod transport;

#[cfg(test)]
pub(crate) mod testutil;

pub use charge_point::{ChargePoint, Phase};
pub use config::SimulatorConfig;
pub use configuration::{ConfigurationKey, ConfigurationStore};
pub use ocpp::{Action, ChargePointErrorCode, ChargePointStatus, CommandStatus};
pub use service::{CentralSystem, ChargePointService, Fault, HandlerError};
pub use simulator::{ChargerSimulator, SimulatorError};
pub use transport::{CallFailure, Direction, LogSink, TrafficSink, TransportError};
