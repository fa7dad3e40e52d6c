//! Certificates binding an EphID to a public key.
//!
//! The management authority issues one certificate per EphID-generation
//! request, signing the binding between the wire EphID, the requester's
//! X25519 public key, the receive-only flag, and the expiry timestamp.
//! Certificates are immutable once signed. Expiry enforcement is the
//! caller's responsibility; parsing and verification here never reject an
//! expired certificate.
//!
//! Signed layout (117 bytes):
//!
//! ```text
//! ephid    [  0..16 ]
//! pubkey   [ 16..48 ]
//! recv_only[ 48..49 ]
//! exp_time [ 49..53 ]   minutes since epoch, LE
//! signature[ 53..117]   Ed25519 over the first 53 bytes
//! ```

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

use crate::ephid::{EPHID_LEN, EphId};
use crate::error::CryptoError;

/// X25519 public key length inside a certificate.
pub const CERT_PUBKEY_LEN: usize = 32;
/// Ed25519 signature length.
pub const CERT_SIGNATURE_LEN: usize = 64;
/// Length of the signed prefix (everything before the signature).
pub const CERT_SIGNED_LEN: usize = EPHID_LEN + CERT_PUBKEY_LEN + 1 + 4;
/// Total encoded certificate length.
pub const CERT_LEN: usize = CERT_SIGNED_LEN + CERT_SIGNATURE_LEN;

const PUBKEY_OFFSET: usize = EPHID_LEN;
const RECV_ONLY_OFFSET: usize = PUBKEY_OFFSET + CERT_PUBKEY_LEN;
const EXP_TIME_OFFSET: usize = RECV_ONLY_OFFSET + 1;
const SIGNATURE_OFFSET: usize = CERT_SIGNED_LEN;

/// A signed EphID certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// The wire EphID this certificate attests.
    pub ephid: EphId,
    /// X25519 public key bound to the EphID.
    pub pubkey: [u8; CERT_PUBKEY_LEN],
    /// Receive-only flag.
    pub recv_only: u8,
    /// Expiry in minutes since the protocol epoch, little-endian.
    pub exp_time: [u8; 4],
    /// Authority signature over the signed prefix.
    pub signature: [u8; CERT_SIGNATURE_LEN],
}

impl Certificate {
    /// The 53-byte prefix the signature covers.
    pub fn signed_bytes(&self) -> [u8; CERT_SIGNED_LEN] {
        let mut buf = [0u8; CERT_SIGNED_LEN];
        buf[..EPHID_LEN].copy_from_slice(self.ephid.as_bytes());
        buf[PUBKEY_OFFSET..RECV_ONLY_OFFSET].copy_from_slice(&self.pubkey);
        buf[RECV_ONLY_OFFSET] = self.recv_only;
        buf[EXP_TIME_OFFSET..].copy_from_slice(&self.exp_time);
        buf
    }

    /// The full 117-byte signed encoding.
    pub fn to_bytes(&self) -> [u8; CERT_LEN] {
        let mut buf = [0u8; CERT_LEN];
        buf[..CERT_SIGNED_LEN].copy_from_slice(&self.signed_bytes());
        buf[SIGNATURE_OFFSET..].copy_from_slice(&self.signature);
        buf
    }

    /// Parse a certificate from its signed encoding.
    ///
    /// Fails with [`CryptoError::MalformedCertificate`] unless the input is
    /// exactly [`CERT_LEN`] bytes. Signature validity is not checked here;
    /// call [`verify_certificate`] before trusting the embedded key.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, CryptoError> {
        if raw.len() != CERT_LEN {
            return Err(CryptoError::MalformedCertificate { expected: CERT_LEN, got: raw.len() });
        }
        let ephid = EphId::from_slice(&raw[..EPHID_LEN])?;
        let mut pubkey = [0u8; CERT_PUBKEY_LEN];
        pubkey.copy_from_slice(&raw[PUBKEY_OFFSET..RECV_ONLY_OFFSET]);
        let mut exp_time = [0u8; 4];
        exp_time.copy_from_slice(&raw[EXP_TIME_OFFSET..SIGNATURE_OFFSET]);
        let mut signature = [0u8; CERT_SIGNATURE_LEN];
        signature.copy_from_slice(&raw[SIGNATURE_OFFSET..]);
        Ok(Self { ephid, pubkey, recv_only: raw[RECV_ONLY_OFFSET], exp_time, signature })
    }

    /// Expiry as minutes since the protocol epoch.
    pub fn expiry_minutes(&self) -> u32 {
        u32::from_le_bytes(self.exp_time)
    }
}

/// Build and sign a certificate under the authority's Ed25519 key.
///
/// Deterministic given identical inputs: Ed25519 signing in the canonical
/// scheme has no randomness of its own.
pub fn issue_certificate(
    ephid: EphId,
    pubkey: &[u8],
    recv_only: u8,
    exp_time: [u8; 4],
    signing_key: &SigningKey,
) -> Result<Certificate, CryptoError> {
    let pubkey: [u8; CERT_PUBKEY_LEN] =
        pubkey.try_into().map_err(|_| CryptoError::InvalidLength {
            what: "certificate pubkey",
            expected: CERT_PUBKEY_LEN,
            got: pubkey.len(),
        })?;
    let mut cert = Certificate { ephid, pubkey, recv_only, exp_time, signature: [0u8; 64] };
    let signature: Signature = signing_key.sign(&cert.signed_bytes());
    cert.signature = signature.to_bytes();
    Ok(cert)
}

/// Check a certificate's signature against the authority's public key.
///
/// Must be called before any party trusts the certificate's embedded
/// public key.
pub fn verify_certificate(cert: &Certificate, authority: &VerifyingKey) -> bool {
    let signature = Signature::from_bytes(&cert.signature);
    authority.verify(&cert.signed_bytes(), &signature).is_ok()
}

/// Parse an Ed25519 signing key from raw seed bytes, validating the length.
pub fn signing_key_from_bytes(bytes: &[u8]) -> Result<SigningKey, CryptoError> {
    let seed: [u8; 32] = bytes.try_into().map_err(|_| CryptoError::InvalidLength {
        what: "Ed25519 signing key",
        expected: 32,
        got: bytes.len(),
    })?;
    Ok(SigningKey::from_bytes(&seed))
}

/// Parse an Ed25519 verifying key from raw bytes, validating length and
/// curve membership.
pub fn verifying_key_from_bytes(bytes: &[u8]) -> Result<VerifyingKey, CryptoError> {
    let raw: [u8; 32] = bytes.try_into().map_err(|_| CryptoError::InvalidLength {
        what: "Ed25519 verifying key",
        expected: 32,
        got: bytes.len(),
    })?;
    VerifyingKey::from_bytes(&raw)
        .map_err(|e| CryptoError::SigningFailed(format!("invalid verifying key: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authority() -> SigningKey {
        SigningKey::from_bytes(&[0x42; 32])
    }

    fn sample_cert() -> Certificate {
        issue_certificate(EphId::from([0xee; 16]), &[0xcd; 32], 0, 77u32.to_le_bytes(), &authority())
            .unwrap()
    }

    #[test]
    fn issue_then_verify() {
        let cert = sample_cert();
        assert!(verify_certificate(&cert, &authority().verifying_key()));
    }

    #[test]
    fn wrong_authority_rejected() {
        let cert = sample_cert();
        let other = SigningKey::from_bytes(&[0x43; 32]);
        assert!(!verify_certificate(&cert, &other.verifying_key()));
    }

    #[test]
    fn every_flipped_byte_breaks_verification() {
        let cert = sample_cert();
        let authority_pub = authority().verifying_key();
        let raw = cert.to_bytes();
        for i in 0..CERT_LEN {
            let mut tampered = raw;
            tampered[i] ^= 0xff;
            match Certificate::from_bytes(&tampered) {
                Ok(parsed) => assert!(
                    !verify_certificate(&parsed, &authority_pub),
                    "flipping byte {i} went undetected"
                ),
                // Some EphId mutations can't even parse; that also counts.
                Err(_) => {},
            }
        }
    }

    #[test]
    fn parse_roundtrip() {
        let cert = sample_cert();
        let back = Certificate::from_bytes(&cert.to_bytes()).unwrap();
        assert_eq!(cert, back);
    }

    #[test]
    fn wrong_length_is_malformed() {
        let err = Certificate::from_bytes(&[0u8; 116]).unwrap_err();
        assert_eq!(err, CryptoError::MalformedCertificate { expected: CERT_LEN, got: 116 });
    }

    #[test]
    fn total_length_is_117() {
        assert_eq!(CERT_LEN, 117);
        assert_eq!(CERT_SIGNED_LEN, 53);
        assert_eq!(sample_cert().to_bytes().len(), 117);
    }
}
