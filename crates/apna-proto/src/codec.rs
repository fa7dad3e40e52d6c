//! CBOR encode/decode helpers shared by both message families.
//!
//! The transport is unreliable datagram, so every message must fit in a
//! single datagram. We enforce a conservative size limit on both paths to
//! reject garbage before it reaches a deserializer.

use serde::{Serialize, de::DeserializeOwned};

use crate::errors::{ProtocolError, Result};

/// Maximum encoded message size in bytes.
///
/// Generous for every APNA message (the largest, an encrypted-certificate
/// handshake packet, is well under 512 bytes) while staying inside a single
/// UDP datagram.
pub const MAX_MSG_SIZE: usize = 4096;

/// Encode a message to CBOR bytes.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf)
        .map_err(|e| ProtocolError::Encode(e.to_string()))?;
    if buf.len() > MAX_MSG_SIZE {
        return Err(ProtocolError::TooLarge { size: buf.len(), limit: MAX_MSG_SIZE });
    }
    Ok(buf)
}

/// Decode a message from CBOR bytes.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    if bytes.len() > MAX_MSG_SIZE {
        return Err(ProtocolError::TooLarge { size: bytes.len(), limit: MAX_MSG_SIZE });
    }
    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ms::{DnsRequest, MsEnvelope, MsMessage, ServiceAddr};

    #[test]
    fn envelope_roundtrip() {
        let env = MsEnvelope {
            id: 42,
            msg: MsMessage::DnsRequest(DnsRequest {
                addr: ServiceAddr { protocol: 17, addr: b"10.0.0.1".to_vec() },
            }),
        };
        let bytes = encode(&env).unwrap();
        let back: MsEnvelope = decode(&bytes).unwrap();
        assert_eq!(env, back);
    }

    #[test]
    fn oversized_input_rejected() {
        let huge = vec![0u8; MAX_MSG_SIZE + 1];
        let err = decode::<MsEnvelope>(&huge).unwrap_err();
        assert!(matches!(err, ProtocolError::TooLarge { .. }));
    }

    #[test]
    fn garbage_input_rejected() {
        let err = decode::<MsEnvelope>(&[0xff, 0x00, 0x13, 0x37]).unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }
}
