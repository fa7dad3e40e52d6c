//! Packet MAC: wire-level origin integrity for data-plane packets.
//!
//! HMAC-SHA256 over the packet's body image under a symmetric key,
//! truncated to 4 bytes. The key is independent of the DH-derived secrets:
//! the MAC authenticates the wire origin, the secrets protect payload
//! confidentiality. Verification is enforced on receipt; the comparison is
//! constant-time.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::CryptoError;
use crate::keys::MacKey;

type HmacSha256 = Hmac<Sha256>;

/// Truncated packet-MAC length in bytes.
pub const PACKET_MAC_LEN: usize = 4;

fn mac_instance(key: &MacKey) -> Result<HmacSha256, CryptoError> {
    HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|_| CryptoError::InvalidLength { what: "packet MAC key", expected: 1, got: 0 })
}

/// Compute the truncated packet MAC over `payload`.
pub fn compute_packet_mac(key: &MacKey, payload: &[u8]) -> Result<[u8; PACKET_MAC_LEN], CryptoError> {
    let mut mac = mac_instance(key)?;
    mac.update(payload);
    let full = mac.finalize().into_bytes();
    let mut out = [0u8; PACKET_MAC_LEN];
    out.copy_from_slice(&full[..PACKET_MAC_LEN]);
    Ok(out)
}

/// Verify a truncated packet MAC in constant time.
pub fn verify_packet_mac(key: &MacKey, payload: &[u8], tag: &[u8]) -> Result<(), CryptoError> {
    if tag.len() != PACKET_MAC_LEN {
        return Err(CryptoError::MacVerificationFailed);
    }
    let mut mac = mac_instance(key)?;
    mac.update(payload);
    mac.verify_truncated_left(tag).map_err(|_| CryptoError::MacVerificationFailed)
}
