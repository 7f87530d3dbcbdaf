//! MCP error types

use busram_protocol::{JsonRpcError, ProtocolError};

use super::machine::ProtocolState;

/// Protocol-level failures
///
/// Recovered at the gateway or the session loop and turned into an HTTP
/// status or an error event; never fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    /// Requested session id is bound to a live stream
    #[error("Session already connected: {0}")]
    SessionConflict(String),

    /// Message for an unknown or closed session
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Message illegal in the session's current state
    #[error("Cannot handle '{method}' in state {state}")]
    InvalidTransition { state: ProtocolState, method: String },

    /// Method not found
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Invalid parameters
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Body could not be decoded
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl McpError {
    /// Stable label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionConflict(_) => "session_conflict",
            Self::SessionNotFound(_) => "session_not_found",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::MethodNotFound(_) => "method_not_found",
            Self::InvalidParams(_) => "invalid_params",
            Self::Protocol(_) => "malformed_message",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<McpError> for JsonRpcError {
    fn from(err: McpError) -> Self {
        match err {
            McpError::MethodNotFound(method) => JsonRpcError::new(
                JsonRpcError::METHOD_NOT_FOUND,
                format!("Method not found: {}", method),
            ),
            McpError::InvalidParams(msg) => JsonRpcError::new(JsonRpcError::INVALID_PARAMS, msg),
            McpError::InvalidTransition { state, method } => JsonRpcError::with_data(
                JsonRpcError::INVALID_REQUEST,
                format!("Cannot handle '{}' in state {}", method, state),
                serde_json::json!({"state": state.as_str(), "method": method}),
            ),
            McpError::Protocol(err) => err.into(),
            err @ (McpError::SessionConflict(_) | McpError::SessionNotFound(_)) => {
                JsonRpcError::new(JsonRpcError::INVALID_REQUEST, err.to_string())
            }
            McpError::Internal(msg) => JsonRpcError::new(JsonRpcError::INTERNAL_ERROR, msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_maps_to_invalid_request() {
        let err = McpError::InvalidTransition {
            state: ProtocolState::Connected,
            method: "tools/list".into(),
        };
        assert_eq!(err.kind(), "invalid_transition");

        let rpc: JsonRpcError = err.into();
        assert_eq!(rpc.code, JsonRpcError::INVALID_REQUEST);
        assert_eq!(rpc.data.unwrap()["state"], "connected");
    }

    #[test]
    fn test_method_not_found_code() {
        let rpc: JsonRpcError = McpError::MethodNotFound("resources/list".into()).into();
        assert_eq!(rpc.code, JsonRpcError::METHOD_NOT_FOUND);
        assert!(rpc.message.contains("resources/list"));
    }

    #[test]
    fn test_session_not_found_display() {
        let err = McpError::SessionNotFound("abc".into());
        assert_eq!(err.to_string(), "Session not found: abc");
    }
}
