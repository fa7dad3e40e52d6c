//! X25519 key exchange.
//!
//! Both handshake levels use plain Diffie-Hellman: a control-level exchange
//! between the peers' certified control keys, then a session-level exchange
//! between freshly minted session keys. The 32-byte shared point is used
//! directly as the sealing key.
//!
//! Secrets are held as `StaticSecret` because the responder reuses its
//! control secret across many inbound handshakes.

use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::CryptoError;
use crate::keys::SharedKey;

/// An X25519 key pair.
#[derive(Clone)]
pub struct KxKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KxKeyPair {
    /// Generate a fresh key pair from the OS RNG.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Rebuild a key pair from raw secret bytes.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let raw: [u8; 32] = bytes.try_into().map_err(|_| CryptoError::InvalidLength {
            what: "X25519 secret key",
            expected: 32,
            got: bytes.len(),
        })?;
        let secret = StaticSecret::from(raw);
        let public = PublicKey::from(&secret);
        Ok(Self { secret, public })
    }

    /// The public key bytes.
    pub fn public_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// Compute the shared secret with a peer's public key.
    pub fn shared_secret(&self, peer_public: &[u8]) -> Result<SharedKey, CryptoError> {
        let raw: [u8; 32] = peer_public.try_into().map_err(|_| CryptoError::InvalidLength {
            what: "X25519 public key",
            expected: 32,
            got: peer_public.len(),
        })?;
        let shared = self.secret.diffie_hellman(&PublicKey::from(raw));
        Ok(SharedKey::from(*shared.as_bytes()))
    }
}

impl std::fmt::Debug for KxKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KxKeyPair").field("public", &self.public_bytes()).finish_non_exhaustive()
    }
}
