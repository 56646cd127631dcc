//! Correlated client for outbound document calls.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header;
use serde_json::Value;

use super::envelope::{self, AddressingHeaders, CENTRAL_SYSTEM_NS, CONTENT_TYPE};
use super::SoapError;
use crate::bridge::ProtocolBridge;
use crate::ocpp::Action;
use crate::transport::{CallFailure, Direction, RpcChannel, TransportError};

/// One stateless HTTP exchange per call; correlation lives entirely in the
/// per-request addressing headers.
pub struct DocumentClient {
    http: reqwest::Client,
    endpoint: String,
    identity: String,
    local_url: String,
    bridge: Arc<ProtocolBridge>,
}

impl DocumentClient {
    pub fn new(
        endpoint: impl Into<String>,
        identity: impl Into<String>,
        local_url: impl Into<String>,
        bridge: Arc<ProtocolBridge>,
        request_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            identity: identity.into(),
            local_url: local_url.into(),
            bridge,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl RpcChannel for DocumentClient {
    async fn call(&self, action: Action, payload: Value) -> Result<Value, CallFailure> {
        let headers =
            AddressingHeaders::fresh(action, &self.identity, &self.local_url, &self.endpoint);
        let request = envelope::request_envelope(action, &headers, &payload, CENTRAL_SYSTEM_NS);

        self.bridge.traffic(Direction::Outbound, &request);

        let response = self
            .http
            .post(&self.endpoint)
            .header(header::CONTENT_TYPE, CONTENT_TYPE)
            .body(request)
            .send()
            .await
            .map_err(to_call_failure)?;

        let body = response.text().await.map_err(to_call_failure)?;
        self.bridge.traffic(Direction::Inbound, &body);

        match envelope::parse_reply_envelope(&body) {
            Ok(payload) => Ok(payload),
            Err(SoapError::Fault(fault)) => Err(CallFailure::Fault(fault)),
            Err(error) => Err(CallFailure::Transport(error.to_string())),
        }
    }
}

fn to_call_failure(error: reqwest::Error) -> CallFailure {
    if error.is_timeout() {
        CallFailure::Timeout
    } else {
        CallFailure::Transport(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::Router;
    use serde_json::json;

    use crate::service::Fault;
    use crate::testutil::AcceptAllService;
    use crate::transport::LogSink;

    fn test_bridge() -> Arc<ProtocolBridge> {
        Arc::new(ProtocolBridge::new(
            Arc::new(AcceptAllService),
            Arc::new(LogSink::new(false)),
            "test",
        ))
    }

    async fn central_system_stub(reply: &'static str) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}/", listener.local_addr().unwrap());
        let app = Router::new().route("/", post(move |body: String| async move {
            assert!(body.contains("<wsa:MessageID>urn:uuid:"));
            assert!(body.contains("chargeBoxIdentity"));
            reply
        }));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        endpoint
    }

    #[tokio::test]
    async fn outbound_call_unwraps_reply() {
        let endpoint = central_system_stub(
            r#"<?xml version="1.0" encoding="utf-8"?>
            <soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
              <soap:Body>
                <startTransactionResponse xmlns="urn://Ocpp/Cs/2012/06/">
                  <transactionId>42</transactionId>
                </startTransactionResponse>
              </soap:Body>
            </soap:Envelope>"#,
        )
        .await;

        let client = DocumentClient::new(
            &endpoint,
            "test",
            "http://localhost:12801/",
            test_bridge(),
            Duration::from_secs(2),
        )
        .unwrap();

        let reply = client
            .call(
                Action::StartTransaction,
                json!({"connectorId": 1, "idTag": "123456", "meterStart": 0,
                       "timestamp": "2026-03-01T10:00:00.000Z"}),
            )
            .await
            .unwrap();
        assert_eq!(reply, json!({"transactionId": 42}));
    }

    #[tokio::test]
    async fn fault_reply_rejects_the_call() {
        let endpoint = central_system_stub(
            r#"<?xml version="1.0" encoding="utf-8"?>
            <soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
              <soap:Body><soap:Fault>
                <soap:Code><soap:Value>soap:Receiver</soap:Value>
                  <soap:Subcode><soap:Value>rpc:InternalError</soap:Value></soap:Subcode>
                </soap:Code>
                <soap:Reason><soap:Text xml:lang="en">boom</soap:Text></soap:Reason>
              </soap:Fault></soap:Body>
            </soap:Envelope>"#,
        )
        .await;

        let client = DocumentClient::new(
            &endpoint,
            "test",
            "http://localhost:12801/",
            test_bridge(),
            Duration::from_secs(2),
        )
        .unwrap();

        match client.call(Action::Heartbeat, json!({})).await {
            Err(CallFailure::Fault(fault)) => {
                assert_eq!(fault, Fault::new("soap:Receiver", "rpc:InternalError", "boom"));
            }
            other => panic!("expected fault, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_failure() {
        let client = DocumentClient::new(
            "http://127.0.0.1:1/",
            "test",
            "http://localhost:12801/",
            test_bridge(),
            Duration::from_millis(200),
        )
        .unwrap();

        match client.call(Action::Heartbeat, json!({})).await {
            Err(CallFailure::Transport(_)) | Err(CallFailure::Timeout) => {}
            other => panic!("expected transport failure, got {other:?}"),
        }
    }
}
