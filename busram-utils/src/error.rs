//! Process-level errors
//!
//! Startup, configuration and logging failures. Per-request failures have
//! their own types in the server crate and never surface here.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum BusramError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    /// Config file was found but could not be parsed
    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BusramError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, BusramError>;
