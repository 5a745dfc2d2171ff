//! Error types for device operations.

use std::io;
use std::time::Duration;

use microbit_link::LinkError;
use microbit_protocol::Response;
use thiserror::Error;

/// Errors surfaced by [`MicrobitClient`](crate::MicrobitClient).
#[derive(Debug, Error)]
pub enum ClientError {
    /// The device could not be reached at setup.
    #[error("cannot connect to micro:bit on {port}: {source}")]
    Connection {
        /// Port path that was requested.
        port: String,
        /// Underlying link error.
        #[source]
        source: LinkError,
    },

    /// Operation attempted outside the connection lifetime.
    #[error("micro:bit is not connected")]
    NotConnected,

    /// Read or write failure mid-session.
    #[error("serial I/O error: {0}")]
    Io(#[from] io::Error),

    /// No matching response arrived before the deadline.
    #[error("timed out after {timeout:?} waiting for {operation} response from micro:bit")]
    DeviceTimeout {
        /// Operation that was waiting.
        operation: &'static str,
        /// Deadline that elapsed.
        timeout: Duration,
    },

    /// The reader loop stopped while a response was outstanding.
    #[error("micro:bit disconnected while waiting for a response")]
    Disconnected,

    /// A response of the wrong kind was routed to a wait.
    #[error("unexpected response from micro:bit: {0:?}")]
    UnexpectedResponse(Response),

    /// Caller-supplied argument is out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<LinkError> for ClientError {
    fn from(e: LinkError) -> Self {
        match e {
            LinkError::Connection { port, source } => ClientError::Connection {
                port: port.clone(),
                source: LinkError::Connection { port, source },
            },
            LinkError::NotConnected => ClientError::NotConnected,
            LinkError::Io(e) => ClientError::Io(e),
            LinkError::Enumerate(_) => ClientError::Connection {
                port: String::new(),
                source: e,
            },
        }
    }
}

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
