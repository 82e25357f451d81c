//! Error types for the protocol crate.

use thiserror::Error;

/// Convenience type alias for Results using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Top-level IRC protocol errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// I/O error during reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Line exceeded the maximum allowed length.
    #[error("line too long: {actual} bytes (limit: {limit})")]
    LineTooLong {
        /// Actual line length.
        actual: usize,
        /// Maximum allowed length.
        limit: usize,
    },

    /// Failed to parse an IRC message.
    #[error("invalid message {string:?}")]
    InvalidMessage {
        /// The offending line.
        string: String,
        /// The underlying parse error.
        #[source]
        cause: MessageParseError,
    },
}

/// Errors encountered when parsing IRC messages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MessageParseError {
    /// Message contained nothing but whitespace.
    #[error("empty message")]
    EmptyMessage,

    /// Prefix was introduced by `:` but never terminated by a space.
    #[error("unterminated prefix")]
    UnterminatedPrefix,

    /// Command token was missing or contained invalid characters.
    #[error("invalid command")]
    InvalidCommand,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_line_too_long() {
        let err = ProtocolError::LineTooLong {
            actual: 600,
            limit: 512,
        };
        assert_eq!(format!("{}", err), "line too long: 600 bytes (limit: 512)");
    }

    #[test]
    fn invalid_message_chains_source() {
        let err = ProtocolError::InvalidMessage {
            string: ":only-a-prefix".into(),
            cause: MessageParseError::InvalidCommand,
        };
        let source = std::error::Error::source(&err).expect("source");
        assert_eq!(source.to_string(), "invalid command");
    }
}
