//! Tool failure kinds
//!
//! The `Display` text of each variant is what the agent sees, so it is
//! written for a person rather than a log.

/// Failures raised while executing a tool
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Network failure or timeout talking to the transit API
    #[error("Transit API is unreachable: {0}")]
    UpstreamUnavailable(String),

    /// Response did not have the expected shape
    #[error("Transit API returned an unexpected response: {0}")]
    UpstreamMalformed(String),

    /// The transit API answered with a non-success result code
    #[error("Transit API error (code {code}): {message}")]
    UpstreamReportedError { code: String, message: String },
}

impl ToolError {
    /// Stable label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownTool(_) => "unknown_tool",
            Self::InvalidArguments(_) => "invalid_arguments",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::UpstreamMalformed(_) => "upstream_malformed",
            Self::UpstreamReportedError { .. } => "upstream_reported_error",
        }
    }

    /// Whether the failure came from the transit API rather than the caller
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::UpstreamUnavailable(_)
                | Self::UpstreamMalformed(_)
                | Self::UpstreamReportedError { .. }
        )
    }
}

impl From<reqwest::Error> for ToolError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::UpstreamUnavailable("request timed out".into())
        } else {
            Self::UpstreamUnavailable(err.to_string())
        }
    }
}
