//! Typed inbound and outbound messages
//!
//! The server never works with raw JSON-RPC past the HTTP edge: a POST body
//! is decoded into an [`InboundMessage`], and everything written to a
//! session's stream is an [`OutboundEvent`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION};

/// Opaque session correlation token
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Mint a fresh identifier (hex UUIDv4, no dashes)
    pub fn mint() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Wrap a caller-supplied identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw token
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Errors decoding an inbound protocol message
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid JSON-RPC version: {0}")]
    InvalidVersion(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
}

impl From<ProtocolError> for JsonRpcError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Json(e) => JsonRpcError::new(JsonRpcError::PARSE_ERROR, e.to_string()),
            ProtocolError::InvalidVersion(got) => JsonRpcError::with_data(
                JsonRpcError::INVALID_REQUEST,
                "Invalid JSON-RPC version",
                serde_json::json!({"expected": "2.0", "got": got}),
            ),
            ProtocolError::InvalidParams(msg) => {
                JsonRpcError::new(JsonRpcError::INVALID_PARAMS, msg)
            }
        }
    }
}

/// A decoded protocol message
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolMessage {
    /// `initialize` handshake request
    Initialize {
        protocol_version: Option<String>,
        client_name: Option<String>,
    },
    /// `notifications/initialized`
    Initialized,
    /// `tools/list`
    ListTools,
    /// `tools/call`
    CallTool {
        tool_name: String,
        arguments: serde_json::Map<String, serde_json::Value>,
    },
    /// `ping`
    Ping,
    /// Anything else
    Unknown { method: String },
}

impl ProtocolMessage {
    /// Decode the method and params of a JSON-RPC request
    pub fn from_request(request: &JsonRpcRequest) -> Result<Self, ProtocolError> {
        let params = &request.params;
        let message = match request.method.as_str() {
            "initialize" => Self::Initialize {
                protocol_version: params["protocolVersion"].as_str().map(String::from),
                client_name: params["clientInfo"]["name"].as_str().map(String::from),
            },
            "notifications/initialized" => Self::Initialized,
            "tools/list" => Self::ListTools,
            "tools/call" => {
                let tool_name = params["name"]
                    .as_str()
                    .ok_or_else(|| ProtocolError::InvalidParams("Missing 'name' parameter".into()))?
                    .to_string();

                let arguments = match &params["arguments"] {
                    serde_json::Value::Null => serde_json::Map::new(),
                    serde_json::Value::Object(map) => map.clone(),
                    other => {
                        return Err(ProtocolError::InvalidParams(format!(
                            "'arguments' must be an object, got {}",
                            other
                        )))
                    }
                };

                Self::CallTool { tool_name, arguments }
            }
            "ping" => Self::Ping,
            other => Self::Unknown {
                method: other.to_string(),
            },
        };
        Ok(message)
    }

    /// JSON-RPC method name
    pub fn method(&self) -> &str {
        match self {
            Self::Initialize { .. } => "initialize",
            Self::Initialized => "notifications/initialized",
            Self::ListTools => "tools/list",
            Self::CallTool { .. } => "tools/call",
            Self::Ping => "ping",
            Self::Unknown { method } => method,
        }
    }
}

/// One unit submitted by a client for a session
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Session the message was posted to
    pub session_id: SessionId,
    /// JSON-RPC id of the request; `None` for notifications
    pub correlation_id: Option<serde_json::Value>,
    /// Decoded message
    pub payload: ProtocolMessage,
    /// Arrival time at the gateway
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    /// Decode a POST body for a session
    pub fn decode(session_id: SessionId, body: &[u8]) -> Result<Self, ProtocolError> {
        let request: JsonRpcRequest = serde_json::from_slice(body)?;
        Self::from_request(session_id, request)
    }

    /// Build from an already-parsed JSON-RPC request
    pub fn from_request(session_id: SessionId, request: JsonRpcRequest) -> Result<Self, ProtocolError> {
        if request.jsonrpc != JSONRPC_VERSION {
            return Err(ProtocolError::InvalidVersion(request.jsonrpc));
        }

        let payload = ProtocolMessage::from_request(&request)?;
        Ok(Self {
            session_id,
            correlation_id: request.id,
            payload,
            received_at: Utc::now(),
        })
    }

    /// Whether the sender expects no reply
    pub fn is_notification(&self) -> bool {
        self.correlation_id.is_none()
    }
}

/// Kind of an event written to a session stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// First event on a stream: where to POST messages
    Endpoint,
    /// Reply to `initialize`
    HandshakeAck,
    /// Reply to `tools/list`
    ToolListResponse,
    /// Reply to `tools/call`
    ToolCallResponse,
    /// Reply to `ping`
    Pong,
    /// Protocol-level fault
    Error,
    /// Comment frame keeping idle connections open
    KeepAlive,
}

impl EventKind {
    /// SSE `event:` field, `None` for comment frames
    pub fn sse_name(&self) -> Option<&'static str> {
        match self {
            Self::Endpoint => Some("endpoint"),
            Self::KeepAlive => None,
            _ => Some("message"),
        }
    }

    /// Stable label for logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Endpoint => "endpoint",
            Self::HandshakeAck => "handshake_ack",
            Self::ToolListResponse => "tool_list_response",
            Self::ToolCallResponse => "tool_call_response",
            Self::Pong => "pong",
            Self::Error => "error",
            Self::KeepAlive => "keep_alive",
        }
    }
}

/// One unit delivered over a session stream
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundEvent {
    pub kind: EventKind,
    /// Id of the request that triggered this event, when there was one
    pub correlation_id: Option<serde_json::Value>,
    /// Rendered event data
    pub body: String,
}

impl OutboundEvent {
    /// Endpoint announcement carrying the POST URL for the session
    pub fn endpoint(post_url: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Endpoint,
            correlation_id: None,
            body: post_url.into(),
        }
    }

    /// Keep-alive comment
    pub fn keep_alive() -> Self {
        Self {
            kind: EventKind::KeepAlive,
            correlation_id: None,
            body: String::new(),
        }
    }

    /// Wrap a successful JSON-RPC result
    pub fn result(
        kind: EventKind,
        correlation_id: serde_json::Value,
        result: serde_json::Value,
    ) -> Self {
        let response = JsonRpcResponse::success(correlation_id.clone(), result);
        Self::from_response(kind, Some(correlation_id), &response)
    }

    /// Wrap a JSON-RPC error; `correlation_id` is `None` when the trigger
    /// was a notification or could not be parsed
    pub fn error(correlation_id: Option<serde_json::Value>, error: JsonRpcError) -> Self {
        let id = correlation_id.clone().unwrap_or(serde_json::Value::Null);
        let response = JsonRpcResponse::error(id, error);
        Self::from_response(EventKind::Error, correlation_id, &response)
    }

    fn from_response(
        kind: EventKind,
        correlation_id: Option<serde_json::Value>,
        response: &JsonRpcResponse,
    ) -> Self {
        // JsonRpcResponse holds only strings, numbers and Values
        let body = serde_json::to_string(response).unwrap_or_else(|e| {
            format!(
                r#"{{"jsonrpc":"2.0","id":null,"error":{{"code":{},"message":"{}"}}}}"#,
                JsonRpcError::INTERNAL_ERROR,
                e
            )
        });
        Self {
            kind,
            correlation_id,
            body,
        }
    }

    /// Parse the body back into a JSON-RPC response (message events only)
    pub fn response(&self) -> Option<JsonRpcResponse> {
        match self.kind {
            EventKind::Endpoint | EventKind::KeepAlive => None,
            _ => serde_json::from_str(&self.body).ok(),
        }
    }
}
