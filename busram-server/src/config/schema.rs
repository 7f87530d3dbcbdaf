//! Configuration schema structs

use busram_utils::LogOutput;
use serde::{Deserialize, Serialize};

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub gateway: GatewayConfig,
    pub upstream: UpstreamConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to bind (default: 0.0.0.0:8000)
    pub listen_addr: String,
    /// Path shared by the stream (GET) and message (POST) endpoints
    pub base_path: String,
    /// Seconds between keep-alive comments on idle streams
    pub keepalive_secs: u64,
    /// Value of Access-Control-Allow-Origin on every response
    pub cors_allow_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8000".into(),
            base_path: "/mcp".into(),
            keepalive_secs: 15,
            cors_allow_origin: "*".into(),
        }
    }
}

/// What to do with a POST that carries no session token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenlessPost {
    /// Answer as a liveness probe; never enters the protocol pipeline
    #[default]
    Probe,
    /// Compatibility mode: route to the well-known default session
    DefaultSession,
}

/// Gateway routing policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub tokenless_post: TokenlessPost,
    /// Session id used by `TokenlessPost::DefaultSession`
    pub default_session_id: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            tokenless_post: TokenlessPost::Probe,
            default_session_id: "default".into(),
        }
    }
}

/// Transit open-data API settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    /// Decoded service key; percent-encoded keys are decoded on load
    pub service_key: String,
    pub timeout_secs: u64,
    /// Rows requested for station search
    pub station_rows: u32,
    /// Rows requested for arrival lookup
    pub arrival_rows: u32,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://apis.data.go.kr/1613000".into(),
            service_key: String::new(),
            timeout_secs: 10,
            station_rows: 5,
            arrival_rows: 10,
        }
    }
}

impl std::fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("base_url", &self.base_url)
            .field(
                "service_key",
                &if self.service_key.is_empty() { "<unset>" } else { "<redacted>" },
            )
            .field("timeout_secs", &self.timeout_secs)
            .field("station_rows", &self.station_rows)
            .field("arrival_rows", &self.arrival_rows)
            .finish()
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// EnvFilter directive; `BUSRAM_LOG` overrides it
    pub filter: String,
    pub output: LogOutput,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".into(),
            output: LogOutput::Stderr,
        }
    }
}
