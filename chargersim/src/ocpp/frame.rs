//! Socket wire framing.
//!
//! The persistent transport multiplexes calls over one connection using
//! JSON arrays tagged by message type:
//!
//! - request:  `[2, messageId, action, payload]`
//! - reply:    `[3, messageId, payload]`
//! - error:    `[4, messageId, errorCode, errorDescription, errorDetails]`

use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use super::Action;

const CALL: i64 = 2;
const CALL_RESULT: i64 = 3;
const CALL_ERROR: i64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RpcErrorCode {
    FormatViolation,
    GenericError,
    InternalError,
    NotImplemented,
}

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed frame")]
    Malformed,

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("unknown message type: {0}")]
    UnknownMessageType(i64),
}

/// One frame on the socket, either direction.
#[derive(Debug, Clone)]
pub enum Frame {
    Call {
        message_id: String,
        action: Action,
        payload: Value,
    },
    CallResult {
        message_id: String,
        payload: Value,
    },
    CallError {
        message_id: String,
        code: RpcErrorCode,
        description: String,
        details: Value,
    },
}

impl Frame {
    /// New request frame with a fresh message id.
    pub fn call(action: Action, payload: Value) -> Self {
        Frame::Call {
            message_id: Uuid::new_v4().to_string(),
            action,
            payload,
        }
    }

    pub fn result(message_id: impl Into<String>, payload: Value) -> Self {
        Frame::CallResult {
            message_id: message_id.into(),
            payload,
        }
    }

    pub fn error(
        message_id: impl Into<String>,
        code: RpcErrorCode,
        description: impl Into<String>,
    ) -> Self {
        Frame::CallError {
            message_id: message_id.into(),
            code,
            description: description.into(),
            details: json!({}),
        }
    }

    pub fn message_id(&self) -> &str {
        match self {
            Frame::Call { message_id, .. }
            | Frame::CallResult { message_id, .. }
            | Frame::CallError { message_id, .. } => message_id,
        }
    }

    pub fn encode(&self) -> Result<String, RpcError> {
        let array = match self {
            Frame::Call {
                message_id,
                action,
                payload,
            } => json!([CALL, message_id, action.as_str(), payload]),
            Frame::CallResult {
                message_id,
                payload,
            } => json!([CALL_RESULT, message_id, payload]),
            Frame::CallError {
                message_id,
                code,
                description,
                details,
            } => json!([CALL_ERROR, message_id, code, description, details]),
        };
        Ok(serde_json::to_string(&array)?)
    }

    pub fn parse(text: &str) -> Result<Self, RpcError> {
        let array: Vec<Value> = serde_json::from_str(text)?;
        let kind = array
            .first()
            .and_then(Value::as_i64)
            .ok_or(RpcError::Malformed)?;

        let message_id = array
            .get(1)
            .and_then(Value::as_str)
            .ok_or(RpcError::Malformed)?
            .to_string();

        match kind {
            CALL => {
                if array.len() != 4 {
                    return Err(RpcError::Malformed);
                }
                let action = array[2]
                    .as_str()
                    .ok_or(RpcError::Malformed)?
                    .parse::<Action>()?;
                Ok(Frame::Call {
                    message_id,
                    action,
                    payload: array[3].clone(),
                })
            }
            CALL_RESULT => {
                if array.len() != 3 {
                    return Err(RpcError::Malformed);
                }
                Ok(Frame::CallResult {
                    message_id,
                    payload: array[2].clone(),
                })
            }
            CALL_ERROR => {
                if array.len() != 5 {
                    return Err(RpcError::Malformed);
                }
                let code = serde_json::from_value(array[2].clone())
                    .unwrap_or(RpcErrorCode::GenericError);
                Ok(Frame::CallError {
                    message_id,
                    code,
                    description: array[3].as_str().unwrap_or_default().to_string(),
                    details: array[4].clone(),
                })
            }
            other => Err(RpcError::UnknownMessageType(other)),
        }
    }
}
