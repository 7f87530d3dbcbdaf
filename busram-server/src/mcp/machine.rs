//! Per-session protocol state machine
//!
//! Pure transition logic: given the current state and an inbound message,
//! decide the next state and what to emit. Tool execution is handed back to
//! the caller as [`Action::CallTool`] so the async part stays in the runner.

use std::sync::Arc;

use busram_protocol::{
    negotiate_version, EventKind, InboundMessage, InitializeResult, OutboundEvent,
    ProtocolMessage, ServerInfo, ToolsListResult,
};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::error::McpError;
use crate::observability::Metrics;
use crate::tools::{ToolAdapter, ToolError};

/// Usage hint returned with the handshake
const INSTRUCTIONS: &str = "Use search_station to find a stop ID by name, \
then check_arrival with that ID to see upcoming buses.";

/// Lifecycle of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    /// Stream open, no handshake yet
    Connected,
    /// Handshake acknowledged
    Initialized,
    /// Terminal
    Closed,
}

impl ProtocolState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Initialized => "initialized",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for ProtocolState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the runner must do after a transition
#[derive(Debug)]
pub enum Action {
    /// Enqueue this event on the stream
    Reply(OutboundEvent),
    /// Nothing to emit (notifications)
    Silent,
    /// Execute a tool, then emit [`ProtocolMachine::tool_call_event`]
    CallTool {
        correlation_id: Option<Value>,
        tool_name: String,
        arguments: Map<String, Value>,
    },
}

/// Protocol state machine for one session
pub struct ProtocolMachine {
    state: ProtocolState,
    tools: Arc<ToolAdapter>,
}

impl ProtocolMachine {
    /// Create a machine in `Connected`
    pub fn new(tools: Arc<ToolAdapter>) -> Self {
        Self {
            state: ProtocolState::Connected,
            tools,
        }
    }

    pub fn state(&self) -> ProtocolState {
        self.state
    }

    /// Tool adapter used for `tools/call`
    pub fn tools(&self) -> &Arc<ToolAdapter> {
        &self.tools
    }

    /// Move to `Closed`; every later message is rejected
    pub fn close(&mut self) {
        self.state = ProtocolState::Closed;
    }

    /// Apply one inbound message
    pub fn handle(&mut self, message: &InboundMessage) -> Action {
        let id = message.correlation_id.clone();

        match (self.state, &message.payload) {
            (
                ProtocolState::Connected,
                ProtocolMessage::Initialize {
                    protocol_version,
                    client_name,
                },
            ) => {
                self.state = ProtocolState::Initialized;
                info!(
                    session = %message.session_id,
                    client = client_name.as_deref().unwrap_or("unknown"),
                    "session initialized"
                );

                let result = InitializeResult {
                    protocol_version: negotiate_version(protocol_version.as_deref()).into(),
                    capabilities: self.tools.capabilities(),
                    server_info: ServerInfo::default(),
                    instructions: Some(INSTRUCTIONS.into()),
                };
                self.reply(id, EventKind::HandshakeAck, &result)
            }

            (ProtocolState::Initialized, ProtocolMessage::Initialized) => Action::Silent,

            (ProtocolState::Initialized, ProtocolMessage::ListTools) => {
                let result = ToolsListResult {
                    tools: self.tools.descriptors(),
                };
                self.reply(id, EventKind::ToolListResponse, &result)
            }

            (
                ProtocolState::Initialized,
                ProtocolMessage::CallTool {
                    tool_name,
                    arguments,
                },
            ) => {
                debug!(session = %message.session_id, tool = %tool_name, "tool call");
                Action::CallTool {
                    correlation_id: id,
                    tool_name: tool_name.clone(),
                    arguments: arguments.clone(),
                }
            }

            (ProtocolState::Initialized, ProtocolMessage::Ping) => {
                self.reply(id, EventKind::Pong, &serde_json::json!({}))
            }

            (ProtocolState::Initialized, ProtocolMessage::Unknown { method }) => {
                self.reject(id, McpError::MethodNotFound(method.clone()))
            }

            // Connected + anything but the handshake, a second handshake,
            // or anything after close
            (state, payload) => self.reject(
                id,
                McpError::InvalidTransition {
                    state,
                    method: payload.method().to_string(),
                },
            ),
        }
    }

    /// Event for a finished tool call
    ///
    /// Tool failures stay inside a successful response with `isError` set,
    /// so the agent can show the text to its user.
    pub fn tool_call_event(
        correlation_id: Value,
        tool_name: &str,
        outcome: Result<String, ToolError>,
    ) -> OutboundEvent {
        if let Err(e) = &outcome {
            warn!(tool = %tool_name, kind = e.kind(), "tool call failed: {}", e);
            Metrics::global().record_error(e.kind());
        }

        let result = ToolAdapter::into_tool_result(outcome);
        match serde_json::to_value(result) {
            Ok(value) => OutboundEvent::result(EventKind::ToolCallResponse, correlation_id, value),
            Err(e) => OutboundEvent::error(
                Some(correlation_id),
                McpError::Internal(e.to_string()).into(),
            ),
        }
    }

    fn reply<T: serde::Serialize>(&self, id: Option<Value>, kind: EventKind, result: &T) -> Action {
        let Some(id) = id else {
            // A notification never gets a reply
            return Action::Silent;
        };

        match serde_json::to_value(result) {
            Ok(value) => Action::Reply(OutboundEvent::result(kind, id, value)),
            Err(e) => Action::Reply(OutboundEvent::error(
                Some(id),
                McpError::Internal(e.to_string()).into(),
            )),
        }
    }

    fn reject(&self, id: Option<Value>, err: McpError) -> Action {
        warn!(state = %self.state, kind = err.kind(), "rejecting message: {}", err);
        Metrics::global().record_error(err.kind());
        Action::Reply(OutboundEvent::error(id, err.into()))
    }
}
