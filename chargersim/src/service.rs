//! Operation surfaces on both sides of the bridge.
//!
//! [`CentralSystem`] is the outbound remote-call surface: one method per
//! operation the charge point can issue, implemented by a typed proxy over
//! whichever transport is active. [`ChargePointService`] is the inbound
//! handler set the central system calls into, implemented by the charge
//! point state machine and registered with the protocol bridge.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::ocpp::{
    AuthorizeRequest, AuthorizeResponse, BootNotificationRequest, BootNotificationResponse,
    ChangeConfigurationRequest, CommandResponse, DataTransferRequest, DataTransferResponse,
    GetConfigurationResponse, HeartbeatResponse, MeterValuesRequest, MeterValuesResponse,
    RemoteStartTransactionRequest, RemoteStopTransactionRequest, StartTransactionRequest,
    StartTransactionResponse, StatusNotificationRequest, StatusNotificationResponse,
    StopTransactionRequest, StopTransactionResponse,
};
use crate::transport::CallFailure;

/// Remote-call surface towards the central system.
#[async_trait]
pub trait CentralSystem: Send + Sync {
    async fn boot_notification(
        &self,
        request: BootNotificationRequest,
    ) -> Result<BootNotificationResponse, CallFailure>;

    async fn heartbeat(&self) -> Result<HeartbeatResponse, CallFailure>;

    async fn status_notification(
        &self,
        request: StatusNotificationRequest,
    ) -> Result<StatusNotificationResponse, CallFailure>;

    async fn authorize(&self, request: AuthorizeRequest) -> Result<AuthorizeResponse, CallFailure>;

    async fn start_transaction(
        &self,
        request: StartTransactionRequest,
    ) -> Result<StartTransactionResponse, CallFailure>;

    async fn stop_transaction(
        &self,
        request: StopTransactionRequest,
    ) -> Result<StopTransactionResponse, CallFailure>;

    async fn meter_values(
        &self,
        request: MeterValuesRequest,
    ) -> Result<MeterValuesResponse, CallFailure>;

    async fn data_transfer(
        &self,
        request: DataTransferRequest,
    ) -> Result<DataTransferResponse, CallFailure>;
}

/// Failure of an inbound handler. The bridge converts any of these into a
/// [`Fault`] reply; they never escape to the transport as a panic.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("{0}")]
    Failed(String),
}

/// Inbound handler set the central system calls.
#[async_trait]
pub trait ChargePointService: Send + Sync {
    async fn remote_start_transaction(
        &self,
        request: RemoteStartTransactionRequest,
    ) -> Result<CommandResponse, HandlerError>;

    async fn remote_stop_transaction(
        &self,
        request: RemoteStopTransactionRequest,
    ) -> Result<CommandResponse, HandlerError>;

    async fn get_configuration(&self) -> Result<GetConfigurationResponse, HandlerError>;

    async fn change_configuration(
        &self,
        request: ChangeConfigurationRequest,
    ) -> Result<CommandResponse, HandlerError>;

    // Contract-surface stubs: acknowledged, no state effect.
    async fn reserve_now(&self, request: Value) -> Result<CommandResponse, HandlerError>;
    async fn cancel_reservation(&self, request: Value) -> Result<CommandResponse, HandlerError>;
    async fn reset(&self, request: Value) -> Result<CommandResponse, HandlerError>;
    async fn trigger_message(&self, request: Value) -> Result<CommandResponse, HandlerError>;
    async fn update_firmware(&self, request: Value) -> Result<CommandResponse, HandlerError>;
}

/// Fault reply delivered in place of a normal response when bridging fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub code: String,
    pub subcode: String,
    pub reason: String,
}

impl Fault {
    /// The fixed shape every bridging failure collapses to.
    pub fn processing_error() -> Self {
        Self {
            code: "soap:Sender".to_string(),
            subcode: "rpc:BadArguments".to_string(),
            reason: "Processing Error".to_string(),
        }
    }

    pub fn new(
        code: impl Into<String>,
        subcode: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            subcode: subcode.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.code, self.subcode, self.reason)
    }
}
