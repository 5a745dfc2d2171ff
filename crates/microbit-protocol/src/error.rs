//! Error types for the micro:bit protocol.

use thiserror::Error;

/// Errors that can occur when encoding or decoding protocol lines.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    /// The line does not start with any known response tag.
    #[error("unknown response tag in line: {0:?}")]
    UnknownTag(String),

    /// The line has the right tag but the wrong number of `|`-separated fields.
    #[error("{tag} response expects {expected} fields, got {actual}")]
    FieldCount {
        /// Response tag (without delimiter).
        tag: &'static str,
        /// Expected field count, tag included.
        expected: usize,
        /// Actual field count, tag included.
        actual: usize,
    },

    /// A numeric field could not be parsed.
    #[error("invalid {field} value: {value:?}")]
    InvalidNumber {
        /// Name of the offending field.
        field: &'static str,
        /// Raw field text.
        value: String,
    },

    /// Unknown button identifier.
    #[error("invalid button {0:?}, expected one of a, b, any")]
    InvalidButton(String),

    /// Image pattern is not 5 rows of 5 digits.
    #[error("invalid image pattern {0:?}")]
    InvalidImage(String),

    /// Music note is not `NOTE[#]OCTAVE:DURATION` or `R:DURATION`.
    #[error("invalid note {0:?}")]
    InvalidNote(String),
}

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
