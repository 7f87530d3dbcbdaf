//! MCP result payloads
//!
//! These ride in the `result` member of a [`crate::JsonRpcResponse`]. Field
//! names follow the MCP wire casing (`inputSchema`, `isError`, ...).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry of a `tools/list` answer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub name: String,
    pub description: String,
    /// JSON Schema object describing the accepted arguments
    pub input_schema: Value,
}

/// Payload of a `tools/call` answer
///
/// Failures inside a tool are still sent as a successful JSON-RPC response
/// with `isError` set, so the agent sees the message text verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub content: Vec<ToolContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl ToolResult {
    fn single(text: String, is_error: Option<bool>) -> Self {
        Self {
            content: vec![ToolContent::Text { text }],
            is_error,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::single(text.into(), None)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::single(message.into(), Some(true))
    }

    pub fn first_text(&self) -> Option<&str> {
        self.content.first().map(|block| match block {
            ToolContent::Text { text } => text.as_str(),
        })
    }
}

/// Content block. Tools here only ever answer with text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    Text { text: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self {
            tools: Some(ToolsCapability::default()),
        }
    }
}

/// `listChanged` stays false: tools are registered once at startup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {
    pub list_changed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: "BusRam".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Answer to `initialize`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    pub server_info: ServerInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl Default for InitializeResult {
    fn default() -> Self {
        Self {
            protocol_version: crate::DEFAULT_PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities::default(),
            server_info: ServerInfo::default(),
            instructions: None,
        }
    }
}

/// Answer to `tools/list`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsListResult {
    pub tools: Vec<Tool>,
}
