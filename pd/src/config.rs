//! plugdeps configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::DepsError;
use crate::runner::{RunOptions, default_n_threads};
use crate::spec::PluginDecl;

/// Main plugdeps configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum concurrent git processes
    #[serde(rename = "n-threads")]
    pub n_threads: usize,

    /// Per-process timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Suppress info notifications (warnings and errors are always shown)
    pub silent: bool,

    /// Log level for the diagnostic log file
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Filesystem locations
    pub path: PathConfig,

    /// Declarations registered before any command runs
    pub plugins: Vec<serde_yaml::Value>,

    /// Declarations registered after `plugins`, in a deferred round
    pub later: Vec<serde_yaml::Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            n_threads: default_n_threads(),
            timeout_ms: 30_000,
            silent: false,
            log_level: None,
            path: PathConfig::default(),
            plugins: Vec::new(),
            later: Vec::new(),
        }
    }
}

impl Config {
    /// Validate configuration before use
    pub fn validate(&self) -> Result<(), DepsError> {
        if self.n_threads == 0 {
            return Err(DepsError::invalid("n-threads", "positive integer"));
        }
        if self.timeout_ms == 0 {
            return Err(DepsError::invalid("timeout-ms", "positive integer"));
        }
        Ok(())
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            n_threads: self.n_threads,
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }

    /// Parse the `plugins` declarations
    pub fn plugin_decls(&self) -> Result<Vec<PluginDecl>, DepsError> {
        decls(&self.plugins, "plugins")
    }

    /// Parse the `later` declarations
    pub fn later_decls(&self) -> Result<Vec<PluginDecl>, DepsError> {
        decls(&self.later, "later")
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: ./plugdeps.yml
        let local_config = PathBuf::from("plugdeps.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/plugdeps/plugdeps.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("plugdeps").join("plugdeps.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Log level from whichever config file `load` would pick, if any
    ///
    /// Read before logging is set up, so failures are silently ignored.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::load(config_path).ok().and_then(|c| c.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate().context("Invalid config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

fn decls(values: &[serde_yaml::Value], key: &str) -> Result<Vec<PluginDecl>, DepsError> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| PluginDecl::from_value_at(v, &format!("{}[{}]", key, i)))
        .collect()
}

/// Filesystem locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Package root holding `pack/deps/{opt,start}`
    pub package: PathBuf,

    /// Default snapshot file for `snap save`/`snap load`
    pub snapshot: PathBuf,

    /// Append-only update log
    pub log: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        // Use XDG directories (~/.local/share/plugdeps, ~/.config/plugdeps on Linux)
        let data = dirs::data_local_dir()
            .map(|d| d.join("plugdeps"))
            .unwrap_or_else(|| PathBuf::from(".plugdeps"));
        let config = dirs::config_dir()
            .map(|d| d.join("plugdeps"))
            .unwrap_or_else(|| PathBuf::from(".plugdeps"));

        Self {
            package: data.join("site"),
            snapshot: config.join("snapshot.yml"),
            log: data.join("update.log"),
        }
    }
}
