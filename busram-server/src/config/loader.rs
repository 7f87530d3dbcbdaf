//! Configuration loader

use std::path::Path;

use busram_utils::{config_file, BusramError, Result};
use tracing::debug;

use super::defaults::DEFAULT_CONFIG_TOML;
use super::AppConfig;

/// Environment variable carrying the listen port on hosting platforms
pub const PORT_ENV: &str = "PORT";

/// Environment variable carrying the upstream service key
pub const SERVICE_KEY_ENV: &str = "BUSRAM_SERVICE_KEY";

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from default location
    pub fn load() -> Result<AppConfig> {
        let path = config_file();
        if path.exists() {
            Self::load_from_path(&path)
        } else {
            debug!("No config file at {}, using defaults", path.display());
            Self::parse(DEFAULT_CONFIG_TOML, &path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<AppConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| BusramError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::parse(&content, path)
    }

    /// Parse configuration from string
    pub fn parse(content: &str, path: &Path) -> Result<AppConfig> {
        toml::from_str(content).map_err(|e| BusramError::ConfigInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Overlay environment values onto a loaded config
    ///
    /// `lookup` is `std::env::var` in production.
    pub fn apply_overrides<F>(config: &mut AppConfig, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup(PORT_ENV).filter(|p| !p.is_empty()) {
            let port: u16 = port
                .parse()
                .map_err(|_| BusramError::config(format!("{} is not a port: {}", PORT_ENV, port)))?;
            let host = config
                .server
                .listen_addr
                .rsplit_once(':')
                .map(|(host, _)| host.to_string())
                .unwrap_or_else(|| "0.0.0.0".into());
            config.server.listen_addr = format!("{}:{}", host, port);
        }

        if let Some(key) = lookup(SERVICE_KEY_ENV).filter(|k| !k.is_empty()) {
            config.upstream.service_key = key;
        }

        config.upstream.service_key = decode_service_key(&config.upstream.service_key);
        Ok(())
    }

    /// Validate configuration
    pub fn validate(config: &AppConfig) -> Result<()> {
        let base_path = &config.server.base_path;
        if !base_path.starts_with('/') || base_path == "/" {
            return Err(BusramError::config(
                "base_path must start with '/' and must not be the root path",
            ));
        }

        if config.server.keepalive_secs == 0 {
            return Err(BusramError::config("keepalive_secs must be at least 1"));
        }

        if !(1..=60).contains(&config.upstream.timeout_secs) {
            return Err(BusramError::config("timeout_secs must be between 1 and 60"));
        }

        for (name, rows) in [
            ("station_rows", config.upstream.station_rows),
            ("arrival_rows", config.upstream.arrival_rows),
        ] {
            if !(1..=100).contains(&rows) {
                return Err(BusramError::config(format!(
                    "{} must be between 1 and 100",
                    name
                )));
            }
        }

        if config.gateway.default_session_id.is_empty() {
            return Err(BusramError::config("default_session_id must not be empty"));
        }

        Ok(())
    }

    /// Load, apply environment overrides, and validate
    pub fn load_and_validate() -> Result<AppConfig> {
        let mut config = Self::load()?;
        Self::apply_overrides(&mut config, |key| std::env::var(key).ok())?;
        Self::validate(&config)?;
        Ok(config)
    }
}

/// Decode a service key that was pasted in its URL-encoded form
///
/// The portal hands out both an encoded and a decoded key; the HTTP client
/// encodes query values itself, so only the decoded form may be sent.
pub fn decode_service_key(raw: &str) -> String {
    if !raw.contains('%') {
        return raw.to_string();
    }
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}
