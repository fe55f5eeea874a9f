//! Error types for notebook-proxy.
//!
//! Client errors are `Clone` so a single failure (for example the notebook
//! process exiting) can be delivered to every call waiting on it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::mcp::protocol::JsonRpcErrorData;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Result type for notebook client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors raised by the notebook client.
#[derive(Error, Debug, Clone)]
pub enum ClientError {
    /// The notebook process could not be started.
    #[error("failed to spawn notebook process `{program}`")]
    Spawn {
        /// Program that was executed.
        program: String,
        /// The underlying OS error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The `initialize` exchange failed.
    #[error("notebook handshake failed")]
    Handshake {
        /// What went wrong during the handshake.
        #[source]
        source: Box<ClientError>,
    },

    /// No notebook could be identified from the listing.
    #[error("notebook discovery failed: {reason}")]
    Discovery {
        /// Why discovery failed.
        reason: String,
    },

    /// No notebook is selected and a fresh discovery did not find one.
    #[error("no notebook is available")]
    NoNotebook,

    /// A call was not answered in time.
    #[error("`{method}` timed out after {}s", .after.as_secs())]
    Timeout {
        /// Method that timed out.
        method: String,
        /// Configured timeout.
        after: Duration,
    },

    /// The notebook process exited while the call was outstanding.
    #[error("notebook process exited (code {})", display_code(.code))]
    ProcessExited {
        /// Exit code, if the process exited normally.
        code: Option<i32>,
    },

    /// The notebook process died earlier and has not been restarted.
    #[error("notebook process is dead; restart required")]
    ProcessDead,

    /// The notebook answered with a JSON-RPC error.
    #[error("`{method}` failed: {error}")]
    Rpc {
        /// Method that failed.
        method: String,
        /// Error object returned by the notebook.
        error: JsonRpcErrorData,
    },

    /// A tool call returned `isError: true`.
    #[error("notebook tool error: {message}")]
    Tool {
        /// Text reported by the tool.
        message: String,
    },

    /// Writing to the notebook process failed.
    #[error("failed to write to notebook process")]
    Io(#[source] Arc<std::io::Error>),

    /// A message could not be serialised.
    #[error("failed to serialise message: {message}")]
    Serialize {
        /// Serialiser error text.
        message: String,
    },

    /// A result did not have the expected shape.
    #[error("unexpected result from `{method}`: {message}")]
    UnexpectedResult {
        /// Method whose result could not be decoded.
        method: String,
        /// Decoder error text.
        message: String,
    },
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

fn display_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

/// Errors that can occur while reading report files.
#[derive(Error, Debug)]
pub enum ReportError {
    /// The ratios file could not be read.
    #[error("failed to read ratios file: {path}")]
    Read {
        /// Path to the ratios file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The ratios file is not valid JSON of the expected shape.
    #[error("failed to parse ratios file: {path}")]
    Parse {
        /// Path to the ratios file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A snapshot could not be written.
    #[error("failed to write snapshot: {path}")]
    Write {
        /// Path to the snapshot file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}
