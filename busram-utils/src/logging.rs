//! Tracing subscriber setup
//!
//! One `EnvFilter` in front of up to two fmt layers: stderr for container
//! platforms and an append-only file under the XDG state directory.

use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{paths, BusramError, Result};

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "BUSRAM_LOG";

/// Where log lines go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    Stderr,
    File,
    Both,
}

impl LogOutput {
    pub fn writes_stderr(self) -> bool {
        matches!(self, Self::Stderr | Self::Both)
    }

    pub fn writes_file(self) -> bool {
        matches!(self, Self::File | Self::Both)
    }
}

/// Subscriber settings
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub output: LogOutput,
    /// `EnvFilter` directive, e.g. `busram_server=debug,hyper=warn`
    pub filter: String,
    /// Include source file and line
    pub file_line: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            output: LogOutput::Stderr,
            filter: "info".into(),
            file_line: false,
        }
    }
}

impl LogConfig {
    /// Settings for the gateway process; `BUSRAM_LOG` wins over `configured_filter`
    pub fn server(output: LogOutput, configured_filter: &str) -> Self {
        Self {
            output,
            filter: resolve_filter(std::env::var(LOG_ENV).ok(), configured_filter),
            file_line: true,
        }
    }
}

/// Pick the effective filter directive
fn resolve_filter(from_env: Option<String>, configured: &str) -> String {
    from_env
        .filter(|f| !f.trim().is_empty())
        .or_else(|| Some(configured.to_string()).filter(|f| !f.trim().is_empty()))
        .unwrap_or_else(|| "info".into())
}

/// Install the global subscriber with defaults
pub fn init_logging() -> Result<()> {
    init_logging_with_config(LogConfig::default())
}

/// Install the global subscriber
pub fn init_logging_with_config(config: LogConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.filter)
        .map_err(|e| BusramError::config(format!("Invalid log filter '{}': {}", config.filter, e)))?;

    let stderr_layer = config.output.writes_stderr().then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_file(config.file_line)
            .with_line_number(config.file_line)
    });

    let file_layer = if config.output.writes_file() {
        let file = open_log_file(paths::log_dir().join("busram.log"))?;
        Some(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(true),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| BusramError::internal(format!("Failed to init logging: {}", e)))
}

fn open_log_file(path: PathBuf) -> Result<std::fs::File> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| BusramError::FileWrite {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|source| BusramError::FileWrite { path, source })
}
