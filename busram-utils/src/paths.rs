//! XDG locations
//!
//! The gateway reads one config file and may append to one log file; it
//! keeps no other on-disk state.

use std::path::PathBuf;

use directories::ProjectDirs;

const APP_NAME: &str = "busram";

/// Environment variable that overrides the config file location
pub const CONFIG_ENV: &str = "BUSRAM_CONFIG";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APP_NAME)
}

/// `$HOME/<parts..>/busram`, for platforms `directories` can't resolve
fn under_home(parts: &[&str]) -> PathBuf {
    let mut path = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir);
    path.extend(parts);
    path.push(APP_NAME);
    path
}

/// `$XDG_CONFIG_HOME/busram`
pub fn config_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(|| under_home(&[".config"]))
}

/// Config file path: `$BUSRAM_CONFIG`, else `config.toml` in [`config_dir`]
pub fn config_file() -> PathBuf {
    config_file_from(std::env::var(CONFIG_ENV).ok())
}

fn config_file_from(override_path: Option<String>) -> PathBuf {
    match override_path {
        Some(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => config_dir().join("config.toml"),
    }
}

/// `$XDG_STATE_HOME/busram`
pub fn state_dir() -> PathBuf {
    project_dirs()
        .and_then(|p| p.state_dir().map(|d| d.to_path_buf()))
        .unwrap_or_else(|| under_home(&[".local", "state"]))
}

pub fn log_dir() -> PathBuf {
    state_dir().join("log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_are_namespaced() {
        assert!(config_dir().ends_with(APP_NAME));
        assert!(log_dir().starts_with(state_dir()));
    }

    #[test]
    fn test_config_override() {
        assert_eq!(
            config_file_from(Some("/etc/busram.toml".into())),
            PathBuf::from("/etc/busram.toml")
        );
        assert_eq!(
            config_file_from(Some(String::new())),
            config_dir().join("config.toml")
        );
        assert!(config_file_from(None).ends_with("config.toml"));
    }

    #[test]
    fn test_home_fallback_layout() {
        let path = under_home(&[".local", "state"]);
        assert!(path.ends_with(".local/state/busram"));
    }
}
