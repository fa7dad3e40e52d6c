//! Crypto error types.

use thiserror::Error;

/// Errors produced by APNA cryptographic operations.
///
/// `MacVerificationFailed` is an authentication failure, never a transient
/// error: callers must not retry the operation or fall through to
/// decryption.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// A truncated MAC did not match its message.
    #[error("MAC verification failed")]
    MacVerificationFailed,

    /// Authenticated decryption failed (wrong key or tampered ciphertext).
    #[error("decryption failed")]
    DecryptionFailed,

    /// Signature creation failed.
    #[error("signing failed: {0}")]
    SigningFailed(String),

    /// Certificate bytes have the wrong length or shape.
    #[error("malformed certificate: expected {expected} bytes, got {got}")]
    MalformedCertificate {
        /// Required encoded length.
        expected: usize,
        /// Actual input length.
        got: usize,
    },

    /// The HID type byte names no known identity kind.
    #[error("unknown HID kind {0:#04x}")]
    UnknownHidKind(u8),

    /// A key or field has the wrong length.
    #[error("invalid {what} length: expected {expected} bytes, got {got}")]
    InvalidLength {
        /// What was being parsed.
        what: &'static str,
        /// Required length.
        expected: usize,
        /// Actual input length.
        got: usize,
    },
}
