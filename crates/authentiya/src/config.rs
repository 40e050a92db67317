//! Configuration management for authentiya.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "authentiya";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "store.db";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `AUTHENTIYA_`, sections split by `__`)
/// 2. TOML config file at `~/.config/authentiya/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Session timer configuration.
    pub session: SessionConfig,
    /// Capture configuration.
    pub capture: CaptureConfig,
    /// Document surface detection.
    pub surfaces: SurfaceConfig,
    /// Courses and assignments.
    pub catalog: Catalog,
    /// Remote collaborators.
    pub remote: RemoteConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/authentiya/store.db`
    pub database_path: Option<PathBuf>,
    /// Directory that receives CSV reports.
    /// Defaults to the user's download directory.
    pub export_dir: Option<PathBuf>,
}

/// Session timer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Interval between elapsed-time ticks in milliseconds.
    pub tick_interval_ms: u64,
    /// Persist a snapshot every N elapsed seconds.
    pub snapshot_every_ticks: u64,
}

/// Capture-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Same-key keydown events inside this window are dropped.
    pub repeat_window_ms: u64,
    /// Capacity of the inbound message channel.
    pub channel_capacity: usize,
}

/// Regexes used to classify page URLs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    /// Patterns matching Google Docs documents.
    pub google_docs_patterns: Vec<String>,
    /// Patterns matching Canvas LMS pages.
    pub canvas_patterns: Vec<String>,
    /// Origins already verified as Canvas, e.g. `https://canvas.school.edu`.
    pub canvas_domains: Vec<String>,
}

/// Remote mirror and LMS configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Mirror records to the remote endpoint.
    pub enabled: bool,
    /// Base URL records are posted to (`<endpoint>/<collection>`).
    pub endpoint: Option<String>,
    /// Canvas instance used for course listing.
    pub canvas_base_url: Option<String>,
    /// Canvas API token.
    pub canvas_token: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            snapshot_every_ticks: 10,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            repeat_window_ms: 1000,
            channel_capacity: 256,
        }
    }
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            google_docs_patterns: vec![r"^https?://docs\.google\.com/document/d/".to_string()],
            canvas_patterns: vec![r"^https?://[^/]*\.instructure\.com(/|$)".to_string()],
            canvas_domains: Vec::new(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            canvas_base_url: None,
            canvas_token: None,
            timeout_secs: 10,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("AUTHENTIYA_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.session.tick_interval_ms == 0 {
            return Err(invalid("tick_interval_ms must be greater than 0"));
        }

        if self.session.snapshot_every_ticks == 0 {
            return Err(invalid("snapshot_every_ticks must be at least 1"));
        }

        if self.capture.repeat_window_ms == 0 {
            return Err(invalid("repeat_window_ms must be greater than 0"));
        }

        if self.capture.channel_capacity == 0 {
            return Err(invalid("channel_capacity must be greater than 0"));
        }

        for pattern in self
            .surfaces
            .google_docs_patterns
            .iter()
            .chain(&self.surfaces.canvas_patterns)
        {
            if regex::Regex::new(pattern).is_err() {
                return Err(invalid(format!("invalid regex pattern: {pattern}")));
            }
        }

        if self.remote.enabled && self.remote.endpoint.is_none() {
            return Err(invalid("remote.endpoint is required when remote.enabled is set"));
        }

        let mut seen = HashSet::new();
        for course in &self.catalog.courses {
            if course.value.trim().is_empty() {
                return Err(invalid("catalog courses need a non-empty value"));
            }
            if !seen.insert(course.value.as_str()) {
                return Err(invalid(format!("duplicate course value: {}", course.value)));
            }
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the export directory, resolving defaults if not set.
    #[must_use]
    pub fn export_dir(&self) -> PathBuf {
        self.storage.export_dir.clone().unwrap_or_else(|| {
            dirs::download_dir().unwrap_or_else(|| Self::default_data_dir().join("reports"))
        })
    }

    /// Get the tick interval as a Duration.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.session.tick_interval_ms)
    }

    /// Get the key-repeat window as a Duration.
    #[must_use]
    pub fn repeat_window(&self) -> Duration {
        Duration::from_millis(self.capture.repeat_window_ms)
    }

    /// Get the remote request timeout as a Duration.
    #[must_use]
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote.timeout_secs)
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::ConfigValidation {
        message: message.into(),
    }
}
