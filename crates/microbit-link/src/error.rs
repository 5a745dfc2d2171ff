//! Error types for the serial link.

use std::io;

use thiserror::Error;

/// Errors that can occur on the serial link.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The device could not be reached when opening the link.
    #[error("failed to open serial port {port}: {source}")]
    Connection {
        /// Port path that was requested.
        port: String,
        /// Underlying serial port error.
        #[source]
        source: serialport::Error,
    },

    /// The link is closed (or was never opened).
    #[error("serial link is not connected")]
    NotConnected,

    /// Read or write failure while the link was open.
    #[error("serial I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial ports could not be enumerated.
    #[error("failed to enumerate serial ports: {0}")]
    Enumerate(#[source] serialport::Error),
}

/// Result type alias for link operations.
pub type LinkResult<T> = Result<T, LinkError>;
