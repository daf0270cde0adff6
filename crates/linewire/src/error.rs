//! Error types and JSON-RPC error codes for the wire layer.

use std::time::Duration;

use serde_json::Value;

use crate::message::{JsonRpcError, JsonRpcErrorObject, RequestId, JSONRPC_VERSION};

/// Standard JSON-RPC 2.0 error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    /// MCP: request cancelled or timed out on the client side.
    pub const REQUEST_TIMEOUT: i32 = -32001;
}

/// All errors that can occur while framing or correlating messages.
#[derive(thiserror::Error, Debug)]
pub enum WireError {
    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Unsupported JSON-RPC version: {0}")]
    ProtocolVersion(String),

    #[error("Line too long: {len} bytes exceeds {max} bytes")]
    LineTooLong { len: usize, max: usize },

    #[error("Write error: {0}")]
    Write(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Request {id} timed out after {after:?}")]
    Timeout { id: RequestId, after: Duration },

    #[error("Unexpected response for id {0}")]
    UnexpectedResponse(RequestId),

    #[error("Request id {0} is already pending")]
    DuplicateRequestId(RequestId),

    #[error("Remote error {code}: {message}")]
    Remote {
        code: i32,
        message: String,
        data: Option<Value>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WireError {
    pub fn code(&self) -> i32 {
        use error_codes::*;
        match self {
            WireError::MalformedMessage(_) | WireError::LineTooLong { .. } => PARSE_ERROR,
            WireError::ProtocolVersion(_)
            | WireError::UnexpectedResponse(_)
            | WireError::DuplicateRequestId(_) => INVALID_REQUEST,
            WireError::Timeout { .. } => REQUEST_TIMEOUT,
            WireError::Remote { code, .. } => *code,
            WireError::Encoding(_)
            | WireError::Write(_)
            | WireError::ConnectionClosed
            | WireError::Io(_) => INTERNAL_ERROR,
        }
    }

    /// Local decode failures that leave the connection usable.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            WireError::Encoding(_)
                | WireError::MalformedMessage(_)
                | WireError::ProtocolVersion(_)
                | WireError::LineTooLong { .. }
                | WireError::Timeout { .. }
                | WireError::UnexpectedResponse(_)
                | WireError::DuplicateRequestId(_)
                | WireError::Remote { .. }
        )
    }

    pub fn to_json_rpc_error(&self, id: RequestId) -> JsonRpcError {
        let data = match self {
            WireError::Remote { data, .. } => data.clone(),
            _ => None,
        };
        JsonRpcError {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            error: JsonRpcErrorObject {
                code: self.code(),
                message: self.to_string(),
                data,
            },
        }
    }
}

impl From<JsonRpcErrorObject> for WireError {
    fn from(e: JsonRpcErrorObject) -> Self {
        WireError::Remote {
            code: e.code,
            message: e.message,
            data: e.data,
        }
    }
}

pub type WireResult<T> = Result<T, WireError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_json_rpc() {
        assert_eq!(WireError::MalformedMessage("x".into()).code(), -32700);
        assert_eq!(WireError::ProtocolVersion("1.0".into()).code(), -32600);
        assert_eq!(WireError::ConnectionClosed.code(), -32603);
        let remote = WireError::Remote {
            code: -32803,
            message: "Tool not found".into(),
            data: None,
        };
        assert_eq!(remote.code(), -32803);
    }

    #[test]
    fn stream_errors_are_not_recoverable() {
        assert!(!WireError::ConnectionClosed.is_recoverable());
        assert!(!WireError::Write("broken pipe".into()).is_recoverable());
        assert!(WireError::UnexpectedResponse(RequestId::Number(9)).is_recoverable());
        assert!(WireError::DuplicateRequestId(RequestId::Number(9)).is_recoverable());
    }

    #[test]
    fn remote_error_keeps_data() {
        let err: WireError = JsonRpcErrorObject {
            code: -32602,
            message: "bad".into(),
            data: Some(serde_json::json!({"field": "name"})),
        }
        .into();
        let rpc = err.to_json_rpc_error(RequestId::Number(4));
        assert_eq!(rpc.error.code, -32602);
        assert_eq!(rpc.error.data, Some(serde_json::json!({"field": "name"})));
    }
}
