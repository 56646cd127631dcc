//! Local listening endpoint for inbound document calls.
//!
//! Stateless: each POST is parsed, dispatched through the bridge and
//! answered in the same HTTP exchange. Failures of any kind are answered
//! with a well-formed fault envelope, never a bare error.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::envelope::{self, CHARGE_POINT_NS, CONTENT_TYPE};
use crate::bridge::ProtocolBridge;
use crate::service::Fault;
use crate::transport::{Direction, TransportError};

#[derive(Clone)]
struct ServerState {
    bridge: Arc<ProtocolBridge>,
}

/// Running document server. Aborting the handle stops it.
pub struct DocumentServer {
    /// URL the central system should address replies and calls to.
    pub local_url: String,
    serve_task: JoinHandle<()>,
}

impl DocumentServer {
    /// Bind the listener and start serving. Port 0 picks a free port; the
    /// resolved one is reflected in `local_url`.
    pub async fn bind(
        port: u16,
        path: &str,
        bridge: Arc<ProtocolBridge>,
    ) -> Result<Self, TransportError> {
        let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
        let local_port = listener.local_addr()?.port();
        let local_url = format!("http://localhost:{local_port}{path}");

        let app = Router::new()
            .route(path, post(handle_call))
            .with_state(ServerState { bridge });

        let serve_task = tokio::spawn(async move {
            if let Err(error) = axum::serve(listener, app).await {
                error!(%error, "document server stopped");
            }
        });

        info!(%local_url, "charge point service listening");

        Ok(Self {
            local_url,
            serve_task,
        })
    }

    pub fn shutdown(&self) {
        self.serve_task.abort();
    }
}

async fn handle_call(State(state): State<ServerState>, body: String) -> Response {
    state.bridge.traffic(Direction::Inbound, &body);

    let (status, reply) = match envelope::parse_request_envelope(&body) {
        Ok(request) => match state.bridge.dispatch(request.action, request.payload).await {
            Ok(payload) => (
                StatusCode::OK,
                envelope::response_envelope(request.action, &payload, CHARGE_POINT_NS),
            ),
            Err(fault) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                envelope::fault_envelope(&fault),
            ),
        },
        Err(error) => {
            warn!(%error, "unparseable inbound envelope");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                envelope::fault_envelope(&Fault::processing_error()),
            )
        }
    };

    state.bridge.traffic(Direction::Outbound, &reply);

    (status, [(header::CONTENT_TYPE, CONTENT_TYPE)], reply).into_response()
}
