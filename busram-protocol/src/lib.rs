//! busram-protocol: Wire definitions for the busram gateway
//!
//! This crate defines the JSON-RPC 2.0 envelopes, the MCP payloads carried
//! inside them, the typed inbound/outbound message model used by the
//! server's session machinery, and the Server-Sent-Events framing used on
//! the long-lived stream.

pub mod codec;
pub mod jsonrpc;
pub mod mcp;
pub mod messages;

// Re-export main types at crate root
pub use codec::{CodecError, SseDecoder, SseEncoder, SseFrame};
pub use jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use mcp::{
    InitializeResult, ServerCapabilities, ServerInfo, Tool, ToolContent, ToolResult,
    ToolsCapability, ToolsListResult,
};
pub use messages::{
    EventKind, InboundMessage, OutboundEvent, ProtocolError, ProtocolMessage, SessionId,
};

/// Protocol version answered when the client asks for one we don't know
pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

/// Protocol versions the handshake will echo back to a client
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2024-11-05", "2025-03-26", "2025-06-18"];

/// Pick the protocol version to answer a handshake with
pub fn negotiate_version(requested: Option<&str>) -> &'static str {
    requested
        .and_then(|v| SUPPORTED_PROTOCOL_VERSIONS.iter().find(|s| **s == v))
        .copied()
        .unwrap_or(DEFAULT_PROTOCOL_VERSION)
}
