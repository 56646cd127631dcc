//! Document transport.
//!
//! Each exchange is an independent SOAP 1.2 request/response pair. The
//! charge point listens on a local HTTP endpoint for inbound operations and
//! posts outbound operations to the central system endpoint, attaching
//! fresh WS-Addressing correlation headers to every call.

pub mod client;
pub mod envelope;
pub mod server;

pub use client::DocumentClient;
pub use server::DocumentServer;

use thiserror::Error;

use crate::service::Fault;

#[derive(Debug, Error)]
pub enum SoapError {
    #[error("xml: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("malformed envelope: {0}")]
    Malformed(String),

    #[error("unsupported operation: {0}")]
    UnknownOperation(String),

    #[error("fault: {0}")]
    Fault(Fault),
}
