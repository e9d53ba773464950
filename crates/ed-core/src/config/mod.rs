//! Configuration loading for the emergency CLI.
//!
//! Settings live in a single TOML file. Resolution order (highest first):
//! 1. Explicit `--config <file>`
//! 2. `EMERGENCY_CONFIG` environment variable
//! 3. `$XDG_CONFIG_HOME/emergency/config.toml`
//! 4. Built-in defaults
//!
//! Explicit files (1, 2) must exist; the XDG file is optional.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::capture::tool_runner::{ToolConfig, DEFAULT_MAX_OUTPUT_BYTES};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "EMERGENCY_CONFIG";

/// XDG config directory name.
const CONFIG_DIR_NAME: &str = "emergency";

const CONFIG_FILE_NAME: &str = "config.toml";

/// Handoff target probed when no list is configured.
pub const DEFAULT_HANDOFF_TOOL: &str = "incident-analyzer";

/// Errors that can occur during config loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("I/O error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML in config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// All tunables, grouped by the component that consumes them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub capture: CaptureSettings,
    pub bundle: BundleSettings,
    pub backup: BackupSettings,
    pub handoff: HandoffSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CaptureSettings {
    /// Per-command timeout in seconds; 0 disables it.
    pub command_timeout_secs: u64,
    /// Output cap per command in bytes.
    pub max_output_bytes: usize,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            command_timeout_secs: 0,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

impl CaptureSettings {
    pub fn tool_config(&self) -> ToolConfig {
        ToolConfig {
            timeout: secs_to_timeout(self.command_timeout_secs),
            max_output_bytes: self.max_output_bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BundleSettings {
    /// Directory bundles are created under.
    pub base_dir: PathBuf,
}

impl Default for BundleSettings {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackupSettings {
    /// Directories to copy; empty disables backup.
    pub sources: Vec<PathBuf>,
    /// Backup destination; defaults to the bundle's base directory.
    pub dest: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HandoffSettings {
    /// Analysis tools probed on PATH, in preference order.
    pub tools: Vec<String>,
    /// 0 lets the tool run to completion.
    pub timeout_secs: u64,
}

impl Default for HandoffSettings {
    fn default() -> Self {
        Self {
            tools: vec![DEFAULT_HANDOFF_TOOL.to_string()],
            timeout_secs: 0,
        }
    }
}

impl HandoffSettings {
    pub fn tool_config(&self, max_output_bytes: usize) -> ToolConfig {
        ToolConfig {
            timeout: secs_to_timeout(self.timeout_secs),
            max_output_bytes,
        }
    }
}

fn secs_to_timeout(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Configuration resolution options.
#[derive(Debug, Default)]
pub struct ConfigOptions {
    /// Explicit config file (highest priority).
    pub config_path: Option<PathBuf>,
}

/// Settings plus the file they came from.
#[derive(Debug, Clone)]
pub struct LoadedSettings {
    pub settings: Settings,
    /// None when running on built-in defaults.
    pub path: Option<PathBuf>,
}

/// Load settings with the standard resolution order.
pub fn load_settings(options: &ConfigOptions) -> Result<LoadedSettings, ConfigError> {
    let env_path = std::env::var_os(CONFIG_ENV_VAR)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);
    let config_home = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(dirs::config_dir);

    match resolve_config_path(options.config_path.as_deref(), env_path, config_home) {
        Some(ConfigSource::Explicit(path)) => {
            let settings = load_settings_from_file(&path)?;
            Ok(LoadedSettings {
                settings,
                path: Some(path),
            })
        }
        Some(ConfigSource::Default(path)) if path.is_file() => {
            let settings = load_settings_from_file(&path)?;
            Ok(LoadedSettings {
                settings,
                path: Some(path),
            })
        }
        _ => {
            debug!("No config file found, using built-in defaults");
            Ok(LoadedSettings {
                settings: Settings::default(),
                path: None,
            })
        }
    }
}

#[derive(Debug, PartialEq)]
enum ConfigSource {
    /// Named by the user; must exist.
    Explicit(PathBuf),
    /// Conventional location; optional.
    Default(PathBuf),
}

fn resolve_config_path(
    cli: Option<&Path>,
    env: Option<PathBuf>,
    config_home: Option<PathBuf>,
) -> Option<ConfigSource> {
    if let Some(path) = cli {
        return Some(ConfigSource::Explicit(path.to_path_buf()));
    }
    if let Some(path) = env {
        return Some(ConfigSource::Explicit(path));
    }
    config_home.map(|home| ConfigSource::Default(home.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME)))
}

/// Load and parse one TOML settings file.
pub fn load_settings_from_file(path: &Path) -> Result<Settings, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })?;

    let settings: Settings = toml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;

    debug!(path = %path.display(), "Loaded config file");
    Ok(settings)
}
