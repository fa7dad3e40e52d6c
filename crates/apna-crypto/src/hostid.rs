//! Keyed host-id derivation.
//!
//! The 3-byte host id embedded in every HID is a truncated SipHash-2-4 of
//! the host's address under the management authority's SipHash key. Only
//! the authority (and the border element sharing its keys) can link a host
//! id back to an address, via the reverse index it populates at generation
//! time.

use std::hash::Hasher;

use siphasher::sip::SipHasher24;

use crate::keys::SipKey;

/// Truncated host-hash length in bytes.
pub const HOST_ID_LEN: usize = 3;

/// Truncated keyed hash of a host address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostId([u8; HOST_ID_LEN]);

impl HostId {
    /// Borrow the raw hash bytes.
    pub fn as_bytes(&self) -> &[u8; HOST_ID_LEN] {
        &self.0
    }

    /// Parse from a slice, validating the length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, crate::error::CryptoError> {
        let arr: [u8; HOST_ID_LEN] =
            bytes.try_into().map_err(|_| crate::error::CryptoError::InvalidLength {
                what: "host id",
                expected: HOST_ID_LEN,
                got: bytes.len(),
            })?;
        Ok(Self(arr))
    }
}

impl From<[u8; HOST_ID_LEN]> for HostId {
    fn from(bytes: [u8; HOST_ID_LEN]) -> Self {
        Self(bytes)
    }
}

/// Derive the host id for an address: SipHash-2-4 under `key`, truncated
/// to the low-order 3 bytes of the little-endian hash.
pub fn derive_host_id(key: &SipKey, addr: &[u8]) -> HostId {
    let mut hasher = SipHasher24::new_with_key(key.as_bytes());
    hasher.write(addr);
    let hash = hasher.finish().to_le_bytes();
    let mut out = [0u8; HOST_ID_LEN];
    out.copy_from_slice(&hash[..HOST_ID_LEN]);
    HostId(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let key = SipKey::from([7; 16]);
        let a = derive_host_id(&key, &[10, 0, 0, 1]);
        let b = derive_host_id(&key, &[10, 0, 0, 1]);
        assert_eq!(a, b);
    }

    #[test]
    fn different_addresses_get_different_ids() {
        let key = SipKey::from([7; 16]);
        let a = derive_host_id(&key, &[10, 0, 0, 1]);
        let b = derive_host_id(&key, &[10, 0, 0, 2]);
        assert_ne!(a, b);
    }

    #[test]
    fn different_keys_get_different_ids() {
        let a = derive_host_id(&SipKey::from([1; 16]), &[10, 0, 0, 1]);
        let b = derive_host_id(&SipKey::from([2; 16]), &[10, 0, 0, 1]);
        assert_ne!(a, b);
    }
}
