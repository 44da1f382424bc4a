//! Error types

use thiserror::Error;

/// A delivery that cannot be turned into a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Fewer bytes than the sender pid prefix
    #[error("delivery too short to contain a sender id ({len} bytes)")]
    TooShort {
        /// Number of bytes actually delivered
        len: usize,
    },
}

/// Error type for take operations
#[derive(Debug, Error)]
pub enum Error {
    /// The caller's cancel signal fired before a message arrived
    #[error("take was cancelled")]
    Cancelled,

    /// The observer's resources were already released
    #[error("observer has been disposed")]
    Disposed,

    /// The delivery was malformed; the slot has already been released
    #[error("malformed delivery: {0}")]
    Decode(#[from] DecodeError),

    /// A wait or signal on a channel object failed
    #[cfg(windows)]
    #[error("channel operation failed: {0}")]
    Os(#[from] windows::core::Error),
}

/// Result alias for take operations
pub type Result<T> = std::result::Result<T, Error>;
