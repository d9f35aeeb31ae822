//! Error types for directory registration.

use std::time::Duration;

/// Errors from encoding records or talking to a directory server.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// Connecting, reading or writing failed.
    #[error("directory I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The directory did not answer within the handshake timeout.
    #[error("directory {directory} did not answer within {timeout:?}")]
    Timeout { directory: String, timeout: Duration },

    /// The directory closed the connection before replying.
    #[error("directory {0} closed the connection")]
    Closed(String),

    /// A record would exceed, or a buffer exceeds, the maximum length.
    #[error("record too large: {0} bytes")]
    TooLarge(usize),

    /// The bytes do not form a valid record.
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}
