//! Shared stubs for unit tests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use crate::ocpp::{
    Action, AuthorizeRequest, AuthorizeResponse, BootNotificationRequest,
    BootNotificationResponse, ChangeConfigurationRequest, CommandResponse, DataTransferRequest,
    DataTransferResponse, GetConfigurationResponse, HeartbeatResponse, IdTagInfo,
    MeterValuesRequest, MeterValuesResponse, RegistrationStatus, RemoteStartTransactionRequest,
    RemoteStopTransactionRequest, StartTransactionRequest, StartTransactionResponse,
    StatusNotificationRequest, StatusNotificationResponse, StopTransactionRequest,
    StopTransactionResponse,
};
use crate::service::{CentralSystem, ChargePointService, HandlerError};
use crate::transport::CallFailure;

/// Handler set acknowledging everything; state-free.
pub struct AcceptAllService;

#[async_trait]
impl ChargePointService for AcceptAllService {
    async fn remote_start_transaction(
        &self,
        _request: RemoteStartTransactionRequest,
    ) -> Result<CommandResponse, HandlerError> {
        Ok(CommandResponse::accepted())
    }

    async fn remote_stop_transaction(
        &self,
        _request: RemoteStopTransactionRequest,
    ) -> Result<CommandResponse, HandlerError> {
        Ok(CommandResponse::accepted())
    }

    async fn get_configuration(&self) -> Result<GetConfigurationResponse, HandlerError> {
        Ok(GetConfigurationResponse {
            configuration_key: vec![],
        })
    }

    async fn change_configuration(
        &self,
        _request: ChangeConfigurationRequest,
    ) -> Result<CommandResponse, HandlerError> {
        Ok(CommandResponse::accepted())
    }

    async fn reserve_now(&self, _request: Value) -> Result<CommandResponse, HandlerError> {
        Ok(CommandResponse::accepted())
    }

    async fn cancel_reservation(&self, _request: Value) -> Result<CommandResponse, HandlerError> {
        Ok(CommandResponse::accepted())
    }

    async fn reset(&self, _request: Value) -> Result<CommandResponse, HandlerError> {
        Ok(CommandResponse::accepted())
    }

    async fn trigger_message(&self, _request: Value) -> Result<CommandResponse, HandlerError> {
        Ok(CommandResponse::accepted())
    }

    async fn update_firmware(&self, _request: Value) -> Result<CommandResponse, HandlerError> {
        Ok(CommandResponse::accepted())
    }
}

/// Central system double: records every outbound call and answers with
/// canned replies.
pub struct RecordingCentralSystem {
    calls: Mutex<Vec<(Action, Value)>>,
    transaction_id: i32,
    fail_start: bool,
}

impl RecordingCentralSystem {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            transaction_id: 42,
            fail_start: false,
        })
    }

    pub fn failing_start() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            transaction_id: 42,
            fail_start: true,
        })
    }

    fn record<R: Serialize>(&self, action: Action, request: &R) {
        let payload = serde_json::to_value(request).unwrap_or(Value::Null);
        self.calls.lock().push((action, payload));
    }

    pub fn calls_of(&self, action: Action) -> Vec<Value> {
        self.calls
            .lock()
            .iter()
            .filter(|(recorded, _)| *recorded == action)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub fn count(&self, action: Action) -> usize {
        self.calls_of(action).len()
    }
}

#[async_trait]
impl CentralSystem for RecordingCentralSystem {
    async fn boot_notification(
        &self,
        request: BootNotificationRequest,
    ) -> Result<BootNotificationResponse, CallFailure> {
        self.record(Action::BootNotification, &request);
        Ok(BootNotificationResponse {
            status: RegistrationStatus::Accepted,
            current_time: Utc::now(),
            interval: 300,
        })
    }

    async fn heartbeat(&self) -> Result<HeartbeatResponse, CallFailure> {
        self.record(Action::Heartbeat, &serde_json::json!({}));
        Ok(HeartbeatResponse {
            current_time: Utc::now(),
        })
    }

    async fn status_notification(
        &self,
        request: StatusNotificationRequest,
    ) -> Result<StatusNotificationResponse, CallFailure> {
        self.record(Action::StatusNotification, &request);
        Ok(StatusNotificationResponse {})
    }

    async fn authorize(&self, request: AuthorizeRequest) -> Result<AuthorizeResponse, CallFailure> {
        self.record(Action::Authorize, &request);
        Ok(AuthorizeResponse {
            id_tag_info: Some(IdTagInfo {
                status: "Accepted".into(),
            }),
        })
    }

    async fn start_transaction(
        &self,
        request: StartTransactionRequest,
    ) -> Result<StartTransactionResponse, CallFailure> {
        self.record(Action::StartTransaction, &request);
        if self.fail_start {
            return Err(CallFailure::Timeout);
        }
        Ok(StartTransactionResponse {
            transaction_id: self.transaction_id,
        })
    }

    async fn stop_transaction(
        &self,
        request: StopTransactionRequest,
    ) -> Result<StopTransactionResponse, CallFailure> {
        self.record(Action::StopTransaction, &request);
        Ok(StopTransactionResponse {})
    }

    async fn meter_values(
        &self,
        request: MeterValuesRequest,
    ) -> Result<MeterValuesResponse, CallFailure> {
        self.record(Action::MeterValues, &request);
        Ok(MeterValuesResponse {})
    }

    async fn data_transfer(
        &self,
        request: DataTransferRequest,
    ) -> Result<DataTransferResponse, CallFailure> {
        self.record(Action::DataTransfer, &request);
        Ok(DataTransferResponse {
            status: "Accepted".into(),
            data: None,
        })
    }
}
