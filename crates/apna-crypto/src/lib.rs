//! Cryptographic primitives for the APNA protocol.
//!
//! APNA addresses hosts by short-lived encrypted identifiers instead of
//! stable addresses. This crate implements the pieces that make that work:
//!
//! - [`ephid`]: the identity codec. An 8-byte plaintext HID is XORed with a
//!   one-block keystream derived from AES under a random IV, then protected
//!   by a truncated HMAC; the resulting 16-byte EphID is the only form ever
//!   seen on the wire.
//! - [`cert`]: Ed25519 certificates binding an EphID to an X25519 public
//!   key under the management authority's signing key.
//! - [`kx`]: X25519 key exchange for control- and session-level shared
//!   secrets.
//! - [`seal`]: XChaCha20-Poly1305 authenticated encryption under a shared
//!   secret, used for session certificates and session payloads.
//! - [`hostid`]: keyed SipHash derivation of the 3-byte host id embedded in
//!   every HID.
//! - [`pktmac`]: the truncated packet MAC protecting wire-level origin
//!   integrity, independent of any DH-derived secret.
//!
//! # Security
//!
//! MAC verification always precedes decryption: [`ephid::verify_and_decrypt`]
//! refuses to touch the ciphertext on a MAC mismatch, and all MAC
//! comparisons are constant-time. Secret key material is zeroized on drop.

pub mod cert;
pub mod ephid;
pub mod error;
pub mod hostid;
pub mod keys;
pub mod kx;
pub mod pktmac;
pub mod seal;

pub use cert::{CERT_LEN, Certificate, issue_certificate, verify_certificate};
pub use ephid::{EPHID_LEN, EphId, HID_LEN, Hid, HidKind, encrypt_and_sign, verify_and_decrypt};
pub use error::CryptoError;
pub use hostid::{HOST_ID_LEN, HostId, derive_host_id};
pub use keys::{AesKey, HmacKey, MacKey, SharedKey, SipKey};
pub use kx::KxKeyPair;
pub use pktmac::{PACKET_MAC_LEN, compute_packet_mac, verify_packet_mac};
pub use seal::{open, seal};

/// Result alias for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
