//! Authenticated sealing under a shared secret.
//!
//! XChaCha20-Poly1305 with a random 24-byte nonce prepended to the
//! ciphertext. Used for session certificates exchanged during the
//! handshake (sealed under the control shared secret) and for session
//! payloads (sealed under the session shared secret).

use chacha20poly1305::aead::{Aead, OsRng};
use chacha20poly1305::{AeadCore, KeyInit, XChaCha20Poly1305, XNonce};

use crate::error::CryptoError;
use crate::keys::SharedKey;

/// Nonce length prepended to every sealed message.
pub const NONCE_LEN: usize = 24;

/// Seal `plaintext` under `key`. Output is `nonce || ciphertext`.
pub fn seal(key: &SharedKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
    let ciphertext =
        cipher.encrypt(&nonce, plaintext).map_err(|_| CryptoError::DecryptionFailed)?;
    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open a sealed message produced by [`seal`].
///
/// Fails with [`CryptoError::DecryptionFailed`] on a wrong key, truncated
/// input, or tampered ciphertext.
pub fn open(key: &SharedKey, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < NONCE_LEN {
        return Err(CryptoError::DecryptionFailed);
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}
