//! Error types for the tool server.

use std::io;
use std::path::PathBuf;

use microbit_client::ClientError;
use microbit_link::LinkError;
use thiserror::Error;

/// Errors raised while serving tools.
#[derive(Debug, Error)]
pub enum ToolError {
    /// No tool with this name exists.
    #[error("Tool not found: {0}")]
    UnknownTool(String),

    /// Tool arguments failed to deserialize or validate.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The device operation failed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Port enumeration failed.
    #[error(transparent)]
    Link(#[from] LinkError),

    /// The config file could not be read.
    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        /// Config file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The config file is not valid YAML for [`BridgeConfig`](crate::BridgeConfig).
    #[error("failed to parse config {path}: {source}")]
    ConfigParse {
        /// Config file path.
        path: PathBuf,
        /// Underlying YAML error.
        #[source]
        source: serde_yaml::Error,
    },

    /// stdio failure.
    #[error("stdio error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for tool server operations.
pub type ToolResult<T> = Result<T, ToolError>;
