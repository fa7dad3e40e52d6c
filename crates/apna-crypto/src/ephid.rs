//! The identity codec: HID encoding and EphID encryption.
//!
//! A HID is the 8-byte plaintext identity record:
//!
//! ```text
//! type (1B) || host_id (3B) || expiry (4B, minutes since epoch, LE)
//! ```
//!
//! It is never transmitted unencrypted. The wire form is the 16-byte EphID:
//!
//! ```text
//! iv (4B random) || encrypted_hid (8B) || mac (4B)
//! ```
//!
//! Encryption is a one-block stream cipher built from AES: the 4-byte IV is
//! zero-padded to a full block and run through the cipher's *encrypt*
//! primitive, and the output block is used purely as a keystream XORed with
//! the HID. (A one-block CBC encryption of an all-zero plaintext under the
//! padded IV produces exactly this block, so generation and verification
//! regenerate identical keystreams as long as both call the encrypt
//! primitive — mixing encrypt and decrypt here is a correctness bug.)
//!
//! The MAC is HMAC-SHA256 over `iv || encrypted_hid`, truncated to 4 bytes.
//! It must verify before the ciphertext is trusted; decrypting without
//! verification is a protocol violation.

use aes::Aes128;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;

use crate::error::CryptoError;
use crate::hostid::{HOST_ID_LEN, HostId};
use crate::keys::{AesKey, HmacKey};

type HmacSha256 = Hmac<Sha256>;

/// Plaintext identity record length.
pub const HID_LEN: usize = 8;
/// Random IV length inside an EphID.
pub const IV_LEN: usize = 4;
/// Truncated MAC length inside an EphID.
pub const MAC_LEN: usize = 4;
/// Wire EphID length.
pub const EPHID_LEN: usize = IV_LEN + HID_LEN + MAC_LEN;

const TYPE_OFFSET: usize = 0;
const HOST_OFFSET: usize = 1;
const TIME_OFFSET: usize = HOST_OFFSET + HOST_ID_LEN;
const MAC_OFFSET: usize = IV_LEN + HID_LEN;

/// Identity kind carried in the HID's type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HidKind {
    /// Control-level identity (one hour lifetime).
    Ctrl = 0x00,
    /// Session-scoped identity (five minute lifetime).
    Session = 0x01,
}

impl TryFrom<u8> for HidKind {
    type Error = CryptoError;

    fn try_from(value: u8) -> Result<Self, CryptoError> {
        match value {
            0x00 => Ok(Self::Ctrl),
            0x01 => Ok(Self::Session),
            _ => Err(CryptoError::UnknownHidKind(value)),
        }
    }
}

/// Plaintext 8-byte identity record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hid([u8; HID_LEN]);

impl Hid {
    /// Encode a HID from its fields. Pure concatenation; no validation
    /// beyond the fixed field widths.
    pub fn new(kind: HidKind, host_id: HostId, expiry_minutes: u32) -> Self {
        let mut bytes = [0u8; HID_LEN];
        bytes[TYPE_OFFSET] = kind as u8;
        bytes[HOST_OFFSET..TIME_OFFSET].copy_from_slice(host_id.as_bytes());
        bytes[TIME_OFFSET..].copy_from_slice(&expiry_minutes.to_le_bytes());
        Self(bytes)
    }

    /// Raw type byte.
    pub fn kind_raw(&self) -> u8 {
        self.0[TYPE_OFFSET]
    }

    /// Embedded host id.
    pub fn host_id(&self) -> HostId {
        let mut host = [0u8; HOST_ID_LEN];
        host.copy_from_slice(&self.0[HOST_OFFSET..TIME_OFFSET]);
        HostId::from(host)
    }

    /// Expiry in minutes since the protocol epoch (little-endian).
    pub fn expiry_minutes(&self) -> u32 {
        let mut ts = [0u8; 4];
        ts.copy_from_slice(&self.0[TIME_OFFSET..]);
        u32::from_le_bytes(ts)
    }

    /// Borrow the raw record.
    pub fn as_bytes(&self) -> &[u8; HID_LEN] {
        &self.0
    }
}

impl From<[u8; HID_LEN]> for Hid {
    fn from(bytes: [u8; HID_LEN]) -> Self {
        Self(bytes)
    }
}

/// Wire EphID: the encrypted, MAC-protected form of a HID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EphId([u8; EPHID_LEN]);

impl EphId {
    /// Parse a wire EphID, validating only the length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; EPHID_LEN] = bytes.try_into().map_err(|_| CryptoError::InvalidLength {
            what: "EphID",
            expected: EPHID_LEN,
            got: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// The random IV.
    pub fn iv(&self) -> &[u8] {
        &self.0[..IV_LEN]
    }

    /// The encrypted HID bytes. Untrusted until the MAC verifies.
    pub fn encrypted_hid(&self) -> &[u8] {
        &self.0[IV_LEN..MAC_OFFSET]
    }

    /// The truncated MAC.
    pub fn mac(&self) -> &[u8] {
        &self.0[MAC_OFFSET..]
    }

    /// Borrow the full wire form.
    pub fn as_bytes(&self) -> &[u8; EPHID_LEN] {
        &self.0
    }
}

impl From<[u8; EPHID_LEN]> for EphId {
    fn from(bytes: [u8; EPHID_LEN]) -> Self {
        Self(bytes)
    }
}

/// Derive the one-block keystream for a given IV.
///
/// Zero-pads the IV to a full block and applies the AES encrypt primitive.
/// Both encryption and decryption call this same function.
fn keystream(key: &AesKey, iv: &[u8]) -> [u8; 16] {
    let mut block = [0u8; 16];
    block[..IV_LEN].copy_from_slice(iv);
    let cipher = Aes128::new(GenericArray::from_slice(key.as_bytes()));
    let mut ga = GenericArray::from(block);
    cipher.encrypt_block(&mut ga);
    ga.into()
}

fn truncated_mac(key: &HmacKey, message: &[u8]) -> Result<[u8; MAC_LEN], CryptoError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key.as_bytes())
        .map_err(|_| CryptoError::InvalidLength { what: "HMAC key", expected: 64, got: 0 })?;
    mac.update(message);
    let full = mac.finalize().into_bytes();
    let mut out = [0u8; MAC_LEN];
    out.copy_from_slice(&full[..MAC_LEN]);
    Ok(out)
}

/// Encrypt a HID into its wire EphID form and sign it.
///
/// Draws a fresh 4-byte IV, XORs the HID with the derived keystream, and
/// appends the truncated HMAC over `iv || encrypted_hid`.
pub fn encrypt_and_sign(hid: &Hid, aes_key: &AesKey, hmac_key: &HmacKey) -> Result<EphId, CryptoError> {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    let mut out = [0u8; EPHID_LEN];
    out[..IV_LEN].copy_from_slice(&iv);
    let ks = keystream(aes_key, &iv);
    for (i, byte) in hid.as_bytes().iter().enumerate() {
        out[IV_LEN + i] = ks[i] ^ byte;
    }
    let mac = truncated_mac(hmac_key, &out[..MAC_OFFSET])?;
    out[MAC_OFFSET..].copy_from_slice(&mac);
    Ok(EphId(out))
}

/// Verify an EphID's MAC, then decrypt it back to the HID.
///
/// The MAC is recomputed over `iv || encrypted_hid` and compared in
/// constant time. On mismatch the ciphertext is never decrypted and
/// [`CryptoError::MacVerificationFailed`] is returned; callers must treat
/// this as an authentication failure.
pub fn verify_and_decrypt(
    ephid: &EphId,
    aes_key: &AesKey,
    hmac_key: &HmacKey,
) -> Result<Hid, CryptoError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(hmac_key.as_bytes())
        .map_err(|_| CryptoError::InvalidLength { what: "HMAC key", expected: 64, got: 0 })?;
    mac.update(&ephid.as_bytes()[..MAC_OFFSET]);
    mac.verify_truncated_left(ephid.mac())
        .map_err(|_| CryptoError::MacVerificationFailed)?;

    let ks = keystream(aes_key, ephid.iv());
    let mut hid = [0u8; HID_LEN];
    for (i, byte) in ephid.encrypted_hid().iter().enumerate() {
        hid[i] = ks[i] ^ byte;
    }
    Ok(Hid(hid))
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use proptest::prelude::*;

    use super::*;

    fn test_keys() -> (AesKey, HmacKey) {
        (AesKey::from([0x11; 16]), HmacKey::from([0x22; 64]))
    }

    #[test]
    fn hid_field_layout() {
        let hid = Hid::new(HidKind::Session, HostId::from([0xaa, 0xbb, 0xcc]), 0x0102_0304);
        assert_eq!(hid.as_bytes(), &hex!("01 aa bb cc 04 03 02 01"));
        assert_eq!(hid.kind_raw(), 0x01);
        assert_eq!(hid.host_id().as_bytes(), &[0xaa, 0xbb, 0xcc]);
        assert_eq!(hid.expiry_minutes(), 0x0102_0304);
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let (aes, hmac) = test_keys();
        let hid = Hid::new(HidKind::Ctrl, HostId::from([1, 2, 3]), 42);
        let ephid = encrypt_and_sign(&hid, &aes, &hmac).unwrap();
        let back = verify_and_decrypt(&ephid, &aes, &hmac).unwrap();
        assert_eq!(hid, back);
    }

    #[test]
    fn fresh_iv_per_encryption() {
        let (aes, hmac) = test_keys();
        let hid = Hid::new(HidKind::Ctrl, HostId::from([1, 2, 3]), 42);
        let a = encrypt_and_sign(&hid, &aes, &hmac).unwrap();
        let b = encrypt_and_sign(&hid, &aes, &hmac).unwrap();
        // Two encryptions of the same HID should differ (random IV).
        assert_ne!(a.iv(), b.iv());
        assert_ne!(a.encrypted_hid(), b.encrypted_hid());
    }

    #[test]
    fn wrong_hmac_key_fails_verification() {
        let (aes, hmac) = test_keys();
        let hid = Hid::new(HidKind::Session, HostId::from([9, 9, 9]), 7);
        let ephid = encrypt_and_sign(&hid, &aes, &hmac).unwrap();
        let other = HmacKey::from([0x33; 64]);
        assert_eq!(
            verify_and_decrypt(&ephid, &aes, &other).unwrap_err(),
            CryptoError::MacVerificationFailed
        );
    }

    proptest! {
        #[test]
        fn roundtrip_all_hids(kind in 0u8..=1, host in any::<[u8; 3]>(), expiry in any::<u32>()) {
            let (aes, hmac) = test_keys();
            let kind = if kind == 0 { HidKind::Ctrl } else { HidKind::Session };
            let hid = Hid::new(kind, HostId::from(host), expiry);
            let ephid = encrypt_and_sign(&hid, &aes, &hmac).unwrap();
            let back = verify_and_decrypt(&ephid, &aes, &hmac).unwrap();
            prop_assert_eq!(hid, back);
        }

        #[test]
        fn tampering_any_bit_is_detected(
            host in any::<[u8; 3]>(),
            expiry in any::<u32>(),
            // Bits of encrypted_hid and mac; the IV is authenticated too
            // but flipping it changes the keystream, not the MAC input alone.
            bit in 0usize..(EPHID_LEN * 8),
        ) {
            let (aes, hmac) = test_keys();
            let hid = Hid::new(HidKind::Ctrl, HostId::from(host), expiry);
            let ephid = encrypt_and_sign(&hid, &aes, &hmac).unwrap();
            let mut raw = *ephid.as_bytes();
            raw[bit / 8] ^= 1 << (bit % 8);
            let tampered = EphId::from(raw);
            prop_assert_eq!(
                verify_and_decrypt(&tampered, &aes, &hmac).unwrap_err(),
                CryptoError::MacVerificationFailed
            );
        }
    }

    #[test]
    fn ephid_from_slice_validates_length() {
        assert!(EphId::from_slice(&[0u8; 16]).is_ok());
        assert!(matches!(
            EphId::from_slice(&[0u8; 15]),
            Err(CryptoError::InvalidLength { what: "EphID", .. })
        ));
    }
}
