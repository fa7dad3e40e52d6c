//! Endpoint-side error taxonomy.

use apna_core::{ConfigError, HandshakeError};
use apna_crypto::CryptoError;
use apna_proto::ProtocolError;
use apna_proto::ms::EphIdGenErrorCode;
use thiserror::Error;

/// Errors raised by the connector and the endpoint driver.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Socket I/O failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A wire message failed to encode or decode.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The handshake state machine rejected a packet.
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    /// A cryptographic operation failed outside the handshake.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Configuration could not be loaded or validated.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The directory has no certificate for the requested address.
    #[error("no certificate registered for the requested service address")]
    UnknownServiceAddress,

    /// The directory has no entry for the requested host id.
    #[error("no entry for the requested host id")]
    UnknownHostId,

    /// The management service refused to mint an EphID.
    #[error("ephid generation failed: {0:?}")]
    Generation(EphIdGenErrorCode),

    /// A directory registration was refused.
    #[error("directory registration refused")]
    RegistrationFailed,

    /// The service answered a request with the wrong reply kind.
    #[error("mismatched reply kind for request")]
    UnexpectedReply,

    /// The connector's receive task is gone; no reply can arrive.
    #[error("management-service connector closed")]
    ConnectorClosed,
}
