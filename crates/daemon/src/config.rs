//! Configuration management for the i3pm daemon.
//!
//! Configuration is loaded from TOML files in the following locations (in order):
//! 1. `~/.config/i3pm/config.toml`
//! 2. `./config.toml` (current directory, for development)

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for the daemon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Behavior configuration.
    pub behavior: BehaviorConfig,
    /// Storage path overrides, mainly for tests.
    pub paths: PathsConfig,
}

/// Behavior-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// How long a registered launch waits for its window before expiring,
    /// in milliseconds.
    #[serde(default = "default_launch_expiry")]
    pub launch_expiry_ms: u64,

    /// Upper bound on every window-manager IPC round trip, in milliseconds.
    #[serde(default = "default_wm_timeout")]
    pub wm_timeout_ms: u64,

    /// Workspace a restored window lands on when its tracked workspace is
    /// pinned to an output that is no longer connected.
    #[serde(default = "default_fallback_workspace")]
    pub fallback_workspace: i32,

    /// Cap for the reconnect backoff after losing the WM event stream,
    /// in milliseconds.
    #[serde(default = "default_max_backoff")]
    pub reconnect_max_backoff_ms: u64,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            launch_expiry_ms: default_launch_expiry(),
            wm_timeout_ms: default_wm_timeout(),
            fallback_workspace: default_fallback_workspace(),
            reconnect_max_backoff_ms: default_max_backoff(),
        }
    }
}

/// Optional overrides for the state and project file locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Window tracking map. Default: `<data_dir>/window-state.json`.
    pub state_file: Option<PathBuf>,
    /// Per-project JSON files. Default: `<data_dir>/projects`.
    pub projects_dir: Option<PathBuf>,
    /// Active-project pointer. Default: `<data_dir>/active-project.json`.
    pub active_file: Option<PathBuf>,
}

// Default value functions for serde
fn default_log_level() -> String {
    "info".to_string()
}

fn default_launch_expiry() -> u64 {
    5_000
}

fn default_wm_timeout() -> u64 {
    3_000
}

fn default_fallback_workspace() -> i32 {
    1
}

fn default_max_backoff() -> u64 {
    10_000
}

/// A warning produced while validating config values.
#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
}

impl Config {
    /// Load configuration from standard locations.
    ///
    /// Returns default config if no file is found.
    pub fn load() -> Result<Self> {
        for path in config_paths() {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::load_from_path(&path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific path.
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate and clamp config values, returning warnings for anything
    /// out of range.
    pub fn validate(&mut self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if !(500..=60_000).contains(&self.behavior.launch_expiry_ms) {
            warnings.push(ConfigWarning {
                field: "behavior.launch_expiry_ms".to_string(),
                message: format!(
                    "{} out of range [500, 60000], using default",
                    self.behavior.launch_expiry_ms
                ),
            });
            self.behavior.launch_expiry_ms = default_launch_expiry();
        }

        if !(500..=30_000).contains(&self.behavior.wm_timeout_ms) {
            warnings.push(ConfigWarning {
                field: "behavior.wm_timeout_ms".to_string(),
                message: format!(
                    "{} out of range [500, 30000], using default",
                    self.behavior.wm_timeout_ms
                ),
            });
            self.behavior.wm_timeout_ms = default_wm_timeout();
        }

        if self.behavior.fallback_workspace < 1 {
            warnings.push(ConfigWarning {
                field: "behavior.fallback_workspace".to_string(),
                message: format!(
                    "{} is not a valid workspace number, using {}",
                    self.behavior.fallback_workspace,
                    default_fallback_workspace()
                ),
            });
            self.behavior.fallback_workspace = default_fallback_workspace();
        }

        warnings
    }

    pub fn wm_timeout(&self) -> Duration {
        Duration::from_millis(self.behavior.wm_timeout_ms)
    }

    pub fn launch_ttl(&self) -> Duration {
        Duration::from_millis(self.behavior.launch_expiry_ms)
    }

    pub fn reconnect_max_backoff(&self) -> Duration {
        Duration::from_millis(self.behavior.reconnect_max_backoff_ms)
    }

    /// Path of the window tracking map.
    pub fn state_file(&self) -> PathBuf {
        self.paths
            .state_file
            .clone()
            .unwrap_or_else(|| data_dir().join("window-state.json"))
    }

    /// Directory holding the per-project JSON files.
    pub fn projects_dir(&self) -> PathBuf {
        self.paths
            .projects_dir
            .clone()
            .unwrap_or_else(|| data_dir().join("projects"))
    }

    /// Path of the active-project pointer file.
    pub fn active_file(&self) -> PathBuf {
        self.paths
            .active_file
            .clone()
            .unwrap_or_else(|| data_dir().join("active-project.json"))
    }
}

/// Get all possible config file paths in priority order.
pub fn config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Some(proj_dirs) = ProjectDirs::from("", "", "i3pm") {
        paths.push(proj_dirs.config_dir().join("config.toml"));
    }

    paths.push(PathBuf::from("config.toml"));

    paths
}

fn data_dir() -> PathBuf {
    ProjectDirs::from("", "", "i3pm")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.behavior.log_level, "info");
        assert_eq!(config.behavior.launch_expiry_ms, 5_000);
        assert_eq!(config.behavior.wm_timeout_ms, 3_000);
        assert_eq!(config.behavior.fallback_workspace, 1);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.behavior.launch_expiry_ms, config.behavior.launch_expiry_ms);
        assert_eq!(parsed.behavior.log_level, config.behavior.log_level);
    }

    #[test]
    fn test_config_partial_parse() {
        // Config with only some fields should use defaults for the rest
        let toml_str = r#"
            [behavior]
            fallback_workspace = 3
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.behavior.fallback_workspace, 3);
        assert_eq!(config.behavior.launch_expiry_ms, 5_000); // default
        assert!(config.paths.state_file.is_none());
    }

    #[test]
    fn test_validate_clamps_out_of_range_values() {
        let mut config = Config::default();
        config.behavior.launch_expiry_ms = 100;
        config.behavior.wm_timeout_ms = 600_000;
        config.behavior.fallback_workspace = 0;

        let warnings = config.validate();
        assert_eq!(warnings.len(), 3);
        assert_eq!(config.behavior.launch_expiry_ms, 5_000);
        assert_eq!(config.behavior.wm_timeout_ms, 3_000);
        assert_eq!(config.behavior.fallback_workspace, 1);
    }

    #[test]
    fn test_validate_accepts_defaults() {
        let mut config = Config::default();
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_config_paths_not_empty() {
        assert!(!config_paths().is_empty());
    }

    #[test]
    fn test_path_overrides_win() {
        let mut config = Config::default();
        config.paths.state_file = Some(PathBuf::from("/tmp/custom-state.json"));
        assert_eq!(config.state_file(), PathBuf::from("/tmp/custom-state.json"));
    }
}
