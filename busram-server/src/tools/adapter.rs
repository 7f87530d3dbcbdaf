//! Executes named tools against caller-supplied arguments

use std::time::Instant;

use busram_protocol::{ServerCapabilities, Tool, ToolResult, ToolsCapability};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::error::ToolError;
use super::registry::ToolRegistry;
use crate::observability::Metrics;

/// Boundary between the protocol machine and the tool handlers
///
/// Nothing escapes `execute` except a `ToolError`.
#[derive(Debug)]
pub struct ToolAdapter {
    registry: ToolRegistry,
}

impl ToolAdapter {
    pub fn new(registry: ToolRegistry) -> Self {
        debug!(tools = ?registry.names().collect::<Vec<_>>(), "tool registry ready");
        Self { registry }
    }

    pub fn descriptors(&self) -> Vec<Tool> {
        self.registry.descriptors()
    }

    /// Capability summary sent with the handshake ack
    pub fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            tools: Some(ToolsCapability {
                list_changed: false,
            }),
        }
    }

    /// Look up, bind and run a tool
    pub async fn execute(
        &self,
        tool_name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<String, ToolError> {
        let contract = self
            .registry
            .get(tool_name)
            .ok_or_else(|| ToolError::UnknownTool(tool_name.to_string()))?;

        let bound = contract.bind(arguments)?;

        let start = Instant::now();
        let outcome = contract.handler.call(bound).await;
        let elapsed = start.elapsed().as_millis() as u64;

        Metrics::global().record_tool_call(tool_name, elapsed);
        match &outcome {
            Err(e) if e.is_upstream() => {
                warn!(tool = tool_name, elapsed_ms = elapsed, error = %e, "upstream failed");
            }
            _ => debug!(tool = tool_name, elapsed_ms = elapsed, ok = outcome.is_ok(), "tool finished"),
        }
        outcome
    }

    /// Render an outcome as an MCP tool result
    ///
    /// Failures become `isError` text rather than protocol errors.
    pub fn into_tool_result(outcome: Result<String, ToolError>) -> ToolResult {
        match outcome {
            Ok(text) => ToolResult::text(text),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}
