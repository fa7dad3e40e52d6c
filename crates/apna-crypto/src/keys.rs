//! Fixed-size key wrappers.
//!
//! Configuration supplies key material as opaque byte blobs; converting a
//! blob into one of these types is the single point where its length is
//! validated. Secret material is zeroized on drop and never printed by
//! `Debug`.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// AES-128 key length in bytes.
pub const AES_KEY_LEN: usize = 16;
/// HMAC-SHA256 key length in bytes.
pub const HMAC_KEY_LEN: usize = 64;
/// SipHash key length in bytes.
pub const SIPHASH_KEY_LEN: usize = 16;
/// X25519/Ed25519 key length in bytes.
pub const KX_KEY_LEN: usize = 32;

macro_rules! fixed_key {
    ($(#[$doc:meta])* $name:ident, $len:expr, $what:literal) => {
        $(#[$doc])*
        #[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
        pub struct $name([u8; $len]);

        impl $name {
            /// Wrap raw key bytes of exactly the right length.
            pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
                let arr: [u8; $len] = bytes.try_into().map_err(|_| {
                    CryptoError::InvalidLength { what: $what, expected: $len, got: bytes.len() }
                })?;
                Ok(Self(arr))
            }

            /// Borrow the raw key bytes.
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(concat!(stringify!($name), "(..)"))
            }
        }
    };
}

fixed_key!(
    /// AES-128 key used to derive the EphID keystream block.
    AesKey,
    AES_KEY_LEN,
    "AES key"
);

fixed_key!(
    /// HMAC-SHA256 key protecting EphID integrity.
    HmacKey,
    HMAC_KEY_LEN,
    "HMAC key"
);

fixed_key!(
    /// Keyed-hash key for host-id derivation.
    SipKey,
    SIPHASH_KEY_LEN,
    "SipHash key"
);

fixed_key!(
    /// 32-byte shared secret from X25519 key exchange, used directly as an
    /// XChaCha20-Poly1305 key.
    SharedKey,
    KX_KEY_LEN,
    "shared key"
);

/// Symmetric packet-MAC key.
///
/// Unlike the identifier keys this one is caller-provisioned and has no
/// mandated length; registrants pick it and publish it to the MAC-key
/// directory.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct MacKey(Vec<u8>);

impl MacKey {
    /// Wrap raw key bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Borrow the raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for MacKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MacKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_is_validated() {
        assert!(AesKey::from_slice(&[0u8; 16]).is_ok());
        let err = AesKey::from_slice(&[0u8; 15]).unwrap_err();
        assert_eq!(
            err,
            CryptoError::InvalidLength { what: "AES key", expected: 16, got: 15 }
        );
        assert!(HmacKey::from_slice(&[0u8; 64]).is_ok());
        assert!(HmacKey::from_slice(&[0u8; 32]).is_err());
        assert!(SipKey::from_slice(&[0u8; 16]).is_ok());
        assert!(SharedKey::from_slice(&[0u8; 31]).is_err());
    }

    #[test]
    fn debug_never_leaks_key_bytes() {
        let key = AesKey::from_slice(&[0xab; 16]).unwrap();
        assert_eq!(format!("{key:?}"), "AesKey(..)");
        let mac = MacKey::new(vec![0xcd; 8]);
        assert_eq!(format!("{mac:?}"), "MacKey(..)");
    }
}
