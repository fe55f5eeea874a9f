//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Directory holding `dynamic_ratios.json` and the company documents.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Notebook process settings.
    #[serde(default)]
    pub notebook: NotebookConfig,

    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.notebook.command.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                message: "notebook.command cannot be empty".to_string(),
            });
        }

        if self.notebook.call_timeout_secs == 0 {
            return Err(ConfigError::ValidationError {
                message: "notebook.call_timeout_secs must be greater than zero".to_string(),
            });
        }

        if self.server.port == 0 {
            return Err(ConfigError::ValidationError {
                message: "server.port must be greater than zero".to_string(),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                    self.logging.level
                ),
            });
        }

        Ok(())
    }
}

/// How to run and talk to the notebook server.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotebookConfig {
    /// Executable to launch.
    /// Default: "python"
    #[serde(default = "default_command")]
    pub command: String,

    /// Arguments passed to the executable.
    /// Default: ["-m", "notebooklm_tools.mcp.server"]
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Working directory for the process.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Extra environment variables for the process.
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Title keyword that marks the preferred notebook (case-insensitive).
    #[serde(default = "default_keyword")]
    pub keyword: String,

    /// Seconds to wait for any single response.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    /// Consecutive timeouts after which the process is recycled. 0 disables.
    #[serde(default = "default_max_timeouts")]
    pub max_consecutive_timeouts: u32,
}

impl NotebookConfig {
    /// The per-call timeout as a [`Duration`].
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl Default for NotebookConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: default_args(),
            working_dir: None,
            env: HashMap::new(),
            keyword: default_keyword(),
            call_timeout_secs: default_call_timeout(),
            max_consecutive_timeouts: default_max_timeouts(),
        }
    }
}

fn default_command() -> String {
    "python".to_string()
}

fn default_args() -> Vec<String> {
    vec!["-m".to_string(), "notebooklm_tools.mcp.server".to_string()]
}

fn default_keyword() -> String {
    "nlt".to_string()
}

const fn default_call_timeout() -> u64 {
    120
}

const fn default_max_timeouts() -> u32 {
    3
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Interface to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    3001
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}
