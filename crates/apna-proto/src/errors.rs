//! Codec error types.

use thiserror::Error;

/// Errors produced while encoding or decoding wire messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// CBOR serialization failed.
    #[error("failed to encode message: {0}")]
    Encode(String),

    /// CBOR deserialization failed.
    #[error("failed to decode message: {0}")]
    Decode(String),

    /// Message exceeds the maximum allowed size.
    #[error("message of {size} bytes exceeds limit of {limit} bytes")]
    TooLarge {
        /// Actual encoded size.
        size: usize,
        /// Maximum permitted size.
        limit: usize,
    },
}

/// Result alias for codec operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
