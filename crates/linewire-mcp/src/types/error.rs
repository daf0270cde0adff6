//! Error types for the MCP client and its harness.

use linewire::{error_codes, WireError};

/// Codes for failures that never reach the wire.
pub mod client_error_codes {
    pub const NOT_INITIALIZED: i32 = -32002;
    pub const PROCESS_ERROR: i32 = -32003;
    pub const STEP_FAILED: i32 = -32004;
}

/// All errors the client, the server launcher and the smoke run can produce.
#[derive(thiserror::Error, Debug)]
pub enum McpError {
    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Session not initialized; call initialize first")]
    NotInitialized,

    #[error("Server process error: {0}")]
    Process(String),

    #[error("Step {step} failed: {reason}")]
    StepFailed { step: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl McpError {
    pub fn code(&self) -> i32 {
        use client_error_codes::*;
        match self {
            McpError::Wire(e) => e.code(),
            McpError::InvalidParams(_) => error_codes::INVALID_PARAMS,
            McpError::NotInitialized => NOT_INITIALIZED,
            McpError::Process(_) => PROCESS_ERROR,
            McpError::StepFailed { .. } => STEP_FAILED,
            McpError::Io(_) => error_codes::INTERNAL_ERROR,
            McpError::Json(_) => error_codes::PARSE_ERROR,
        }
    }

    /// True for errors the server itself returned, as opposed to transport
    /// or local failures.
    pub fn is_remote(&self) -> bool {
        matches!(self, McpError::Wire(WireError::Remote { .. }))
    }
}

pub type McpResult<T> = Result<T, McpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_errors_keep_their_code() {
        let err: McpError = WireError::Remote {
            code: -32601,
            message: "Method not found".into(),
            data: None,
        }
        .into();
        assert_eq!(err.code(), -32601);
        assert!(err.is_remote());
        assert_eq!(err.to_string(), "Remote error -32601: Method not found");
    }

    #[test]
    fn local_errors_map_to_client_codes() {
        assert_eq!(McpError::NotInitialized.code(), client_error_codes::NOT_INITIALIZED);
        assert_eq!(
            McpError::InvalidParams("x".into()).code(),
            error_codes::INVALID_PARAMS
        );
        assert!(!McpError::Process("gone".into()).is_remote());
    }
}
