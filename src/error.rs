//! Error types for serwire.

use thiserror::Error;

/// Main error type for all serwire operations.
#[derive(Debug, Error)]
pub enum SerwireError {
    /// I/O error on the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or corrupt frame (bad length, checksum mismatch).
    ///
    /// Protocol errors are handled inside the port (dropped frames, NAK
    /// replies) and never reach the user API.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A read deadline was reached before a payload arrived.
    #[error("timeout reached")]
    Timeout,

    /// The port is closed.
    #[error("port closed")]
    Closed,
}

/// Result type alias using SerwireError.
pub type Result<T> = std::result::Result<T, SerwireError>;
