//! Protocol bridge.
//!
//! Adapts the promise-style handler set to whatever the active transport
//! speaks: decodes wire dates, deserializes the typed request, invokes the
//! handler, and re-encodes the reply. Any failure on that path collapses to
//! a fixed [`Fault`] delivered as a normal reply; nothing on the inbound
//! path can take the process down.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::dates;
use crate::ocpp::Action;
use crate::service::{ChargePointService, Fault, HandlerError};
use crate::transport::{Direction, TrafficSink};

pub struct ProtocolBridge {
    handlers: Arc<dyn ChargePointService>,
    sink: Arc<dyn TrafficSink>,
    peer: String,
}

impl ProtocolBridge {
    pub fn new(
        handlers: Arc<dyn ChargePointService>,
        sink: Arc<dyn TrafficSink>,
        peer: impl Into<String>,
    ) -> Self {
        Self {
            handlers,
            sink,
            peer: peer.into(),
        }
    }

    /// Dispatch one inbound call to its handler. The returned payload is
    /// wire-ready; the transport only wraps it in its own envelope.
    pub async fn dispatch(&self, action: Action, payload: Value) -> Result<Value, Fault> {
        let mut payload = if payload.is_null() { json!({}) } else { payload };
        dates::from_wire(&mut payload);

        match self.invoke(action, payload).await {
            Ok(mut reply) => {
                dates::to_wire(&mut reply);
                Ok(reply)
            }
            Err(error) => {
                warn!(%action, %error, "inbound call failed");
                Err(Fault::processing_error())
            }
        }
    }

    async fn invoke(&self, action: Action, payload: Value) -> Result<Value, HandlerError> {
        match action {
            Action::RemoteStartTransaction => reply(
                self.handlers
                    .remote_start_transaction(serde_json::from_value(payload)?)
                    .await?,
            ),
            Action::RemoteStopTransaction => reply(
                self.handlers
                    .remote_stop_transaction(serde_json::from_value(payload)?)
                    .await?,
            ),
            Action::GetConfiguration => reply(self.handlers.get_configuration().await?),
            Action::ChangeConfiguration => reply(
                self.handlers
                    .change_configuration(serde_json::from_value(payload)?)
                    .await?,
            ),
            Action::ReserveNow => reply(self.handlers.reserve_now(payload).await?),
            Action::CancelReservation => reply(self.handlers.cancel_reservation(payload).await?),
            Action::Reset => reply(self.handlers.reset(payload).await?),
            Action::TriggerMessage => reply(self.handlers.trigger_message(payload).await?),
            Action::UpdateFirmware => reply(self.handlers.update_firmware(payload).await?),
            other => Err(HandlerError::Failed(format!(
                "{other} is not an inbound operation"
            ))),
        }
    }

    /// Outbound half of the date codec, applied before transmission.
    pub fn encode_outbound(&self, payload: &mut Value) {
        dates::to_wire(payload);
    }

    /// Inbound half, applied to every received reply.
    pub fn decode_inbound(&self, payload: &mut Value) {
        dates::from_wire(payload);
    }

    /// Hand an envelope to the diagnostics sink.
    pub fn traffic(&self, direction: Direction, envelope: &str) {
        self.sink.record(direction, &self.peer, envelope);
    }
}

fn reply<T: Serialize>(value: T) -> Result<Value, HandlerError> {
    Ok(serde_json::to_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    use crate::ocpp::{
        ChangeConfigurationRequest, CommandResponse, GetConfigurationResponse,
        RemoteStartTransactionRequest, RemoteStopTransactionRequest,
    };
    use crate::transport::LogSink;

    /// Handler set that records nothing and optionally fails everything.
    struct StubService {
        failing: bool,
    }

    #[async_trait]
    impl ChargePointService for StubService {
        async fn remote_start_transaction(
            &self,
            request: RemoteStartTransactionRequest,
        ) -> Result<CommandResponse, HandlerError> {
            if self.failing {
                return Err(HandlerError::Failed("induced".into()));
            }
            assert_eq!(request.connector_id, 1);
            Ok(CommandResponse::accepted())
        }

        async fn remote_stop_transaction(
            &self,
            _request: RemoteStopTransactionRequest,
        ) -> Result<CommandResponse, HandlerError> {
            Ok(CommandResponse::rejected())
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

        async fn cancel_reservation(
            &self,
            _request: Value,
        ) -> Result<CommandResponse, HandlerError> {
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

    fn bridge(failing: bool) -> ProtocolBridge {
        ProtocolBridge::new(
            Arc::new(StubService { failing }),
            Arc::new(LogSink::new(false)),
            "test",
        )
    }

    #[tokio::test]
    async fn dispatches_typed_request() {
        let reply = bridge(false)
            .dispatch(
                Action::RemoteStartTransaction,
                json!({"connectorId": 1, "idTag": "123456"}),
            )
            .await
            .unwrap();
        assert_eq!(reply, json!({"status": "Accepted"}));
    }

    #[tokio::test]
    async fn null_payload_reads_as_empty_request() {
        let reply = bridge(false)
            .dispatch(Action::GetConfiguration, Value::Null)
            .await
            .unwrap();
        assert_eq!(reply, json!({"configurationKey": []}));
    }

    #[tokio::test]
    async fn malformed_payload_becomes_fault() {
        let fault = bridge(false)
            .dispatch(
                Action::RemoteStartTransaction,
                json!({"connectorId": "not-a-number"}),
            )
            .await
            .unwrap_err();
        assert_eq!(fault, Fault::processing_error());
        assert_eq!(fault.code, "soap:Sender");
        assert_eq!(fault.subcode, "rpc:BadArguments");
        assert_eq!(fault.reason, "Processing Error");
    }

    #[tokio::test]
    async fn handler_failure_becomes_fault() {
        let fault = bridge(true)
            .dispatch(
                Action::RemoteStartTransaction,
                json!({"connectorId": 1, "idTag": "123456"}),
            )
            .await
            .unwrap_err();
        assert_eq!(fault, Fault::processing_error());
    }

    #[tokio::test]
    async fn outbound_operation_inbound_is_fault() {
        let fault = bridge(false)
            .dispatch(Action::StartTransaction, json!({}))
            .await
            .unwrap_err();
        assert_eq!(fault, Fault::processing_error());
    }

    #[tokio::test]
    async fn inbound_dates_are_canonicalized_before_typing() {
        // ReserveNow takes the raw payload, so the canonicalized timestamp
        // is visible in what the handler would have seen.
        let reply = bridge(false)
            .dispatch(Action::ReserveNow, json!({"expiryDate": "2026-03-01T10:00:00Z"}))
            .await
            .unwrap();
        assert_eq!(reply, json!({"status": "Accepted"}));
    }
}
