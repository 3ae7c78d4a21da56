//! Configuration for pixelgraph
//!
//! A single TOML file holds the settings the host application would
//! otherwise hard-code:
//!
//! - `[queue]` - dispatch thread name and readiness timeout
//! - `[defaults]` - filter levels applied when the pipeline starts
//! - `[view]` - display fill mode and mirroring
//! - `[logging]` - tracing filter and optional log directory
//!
//! # Config Location
//!
//! - **Linux**: `~/.config/dev.pixpark.pixelgraph/pixelgraph.toml`
//! - **macOS**: `~/Library/Application Support/dev.pixpark.pixelgraph/pixelgraph.toml`
//! - **Windows**: `%APPDATA%\dev.pixpark.pixelgraph\pixelgraph.toml`
//!
//! # Example
//!
//! ```toml
//! [queue]
//! thread_name = "pixelgraph-gpu"
//! ready_timeout_ms = 1000
//!
//! [defaults]
//! smooth = 0.5
//! whiteness = 0.4
//!
//! [view]
//! fill_mode = "PreserveAspectRatio"
//! mirror = true
//! ```

use crate::error::{GraphError, Result};
use crate::native::FillMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for config directories
pub const APP_ID: &str = "dev.pixpark.pixelgraph";

/// Config filename
pub const CONFIG_FILE: &str = "pixelgraph.toml";

/// Default smooth level applied on pipeline start
pub const DEFAULT_SMOOTH_LEVEL: f32 = 0.5;

/// Default whiteness level applied on pipeline start
pub const DEFAULT_WHITE_LEVEL: f32 = 0.4;

/// Default time to wait for a node to become ready
pub const DEFAULT_READY_TIMEOUT_MS: u64 = 1000;

/// Get the path to the config file
pub fn config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID).join(CONFIG_FILE))
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GraphConfig {
    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub defaults: DefaultLevels,

    #[serde(default)]
    pub view: ViewConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Dispatch queue settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Name given to the GPU-bound thread
    #[serde(default = "default_thread_name")]
    pub thread_name: String,

    /// How long `wait_ready` callers block before giving up
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,
}

fn default_thread_name() -> String {
    "pixelgraph-gpu".to_string()
}

fn default_ready_timeout_ms() -> u64 {
    DEFAULT_READY_TIMEOUT_MS
}

impl QueueConfig {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            thread_name: default_thread_name(),
            ready_timeout_ms: DEFAULT_READY_TIMEOUT_MS,
        }
    }
}

/// Filter levels applied when the beauty pipeline starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultLevels {
    #[serde(default = "default_smooth")]
    pub smooth: f32,

    #[serde(default = "default_whiteness")]
    pub whiteness: f32,

    /// Rotation code applied to the camera source
    #[serde(default)]
    pub rotation: i32,
}

fn default_smooth() -> f32 {
    DEFAULT_SMOOTH_LEVEL
}

fn default_whiteness() -> f32 {
    DEFAULT_WHITE_LEVEL
}

impl Default for DefaultLevels {
    fn default() -> Self {
        Self {
            smooth: DEFAULT_SMOOTH_LEVEL,
            whiteness: DEFAULT_WHITE_LEVEL,
            rotation: 0,
        }
    }
}

/// Display surface settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewConfig {
    #[serde(default)]
    pub fill_mode: FillMode,

    /// Mirror the preview horizontally (front camera)
    #[serde(default = "default_true")]
    pub mirror: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            fill_mode: FillMode::default(),
            mirror: true,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    #[serde(default = "default_filter")]
    pub filter: String,

    /// Write a daily-rolling log file here in addition to stderr
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

fn default_filter() -> String {
    "info,pixelgraph=debug".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            directory: None,
        }
    }
}

impl GraphConfig {
    /// Load a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GraphError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        toml::from_str(&content).map_err(|e| {
            GraphError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })
    }

    /// Load from the platform config location, returning defaults on any error
    pub fn load_or_default() -> Self {
        let Some(path) = config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save config to disk as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                GraphError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| GraphError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| GraphError::Config(format!("Failed to write config file: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GraphConfig::default();
        assert_eq!(config.defaults.smooth, 0.5);
        assert_eq!(config.defaults.whiteness, 0.4);
        assert_eq!(config.queue.thread_name, "pixelgraph-gpu");
        assert!(config.view.mirror);
        assert_eq!(config.view.fill_mode, FillMode::PreserveAspectRatio);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let mut config = GraphConfig::default();
        config.defaults.smooth = 0.8;
        config.view.fill_mode = FillMode::Stretch;
        config.logging.directory = Some(dir.path().join("logs"));
        config.save(&path).unwrap();

        let loaded = GraphConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[defaults]\nsmooth = 0.9\n").unwrap();

        let loaded = GraphConfig::load(&path).unwrap();
        assert_eq!(loaded.defaults.smooth, 0.9);
        assert_eq!(loaded.defaults.whiteness, DEFAULT_WHITE_LEVEL);
        assert_eq!(loaded.queue, QueueConfig::default());
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[queue\nbroken").unwrap();

        let err = GraphConfig::load(&path).unwrap_err();
        assert!(matches!(err, GraphError::Config(_)));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = GraphConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }
}
