//! Established-session state.

use apna_crypto::{CryptoError, EphId, SharedKey, open, seal};

/// Confirmation literal the responder seals under the session secret to
/// finish the handshake.
pub const CONFIRMATION: &[u8] = b"Handshake Done";
/// Steady-state ping payload.
pub const PING: &[u8] = b"ping";
/// Expected reply to a ping.
pub const PONG: &[u8] = b"pong";

/// Lookup key for an established session: `(local EphID, remote EphID)`
/// from the owner's perspective. An inbound packet's `(remote, local)` pair
/// maps to the receiver's `(local, remote)` key.
pub type SessionKey = (EphId, EphId);

/// One established session: the EphID pair it is addressed by and the
/// session-level shared secret protecting its payloads.
///
/// During the handshake a session is keyed by the responder's ephemeral
/// session public key; completion re-keys it by the EphID pair so
/// steady-state lookup never touches key material.
#[derive(Debug, Clone)]
pub struct Session {
    /// Our session EphID.
    pub local_ephid: EphId,
    /// The peer's session EphID.
    pub remote_ephid: EphId,
    secret: SharedKey,
}

impl Session {
    /// Assemble a session from the handshake's outputs.
    pub fn new(local_ephid: EphId, remote_ephid: EphId, secret: SharedKey) -> Self {
        Self { local_ephid, remote_ephid, secret }
    }

    /// The `(local, remote)` lookup key.
    pub fn key(&self) -> SessionKey {
        (self.local_ephid, self.remote_ephid)
    }

    /// Seal an application payload under the session secret.
    pub fn seal_payload(&self, payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
        seal(&self.secret, payload)
    }

    /// Open a sealed payload received on this session.
    pub fn open_payload(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        open(&self.secret, sealed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(secret: [u8; 32]) -> Session {
        Session::new(EphId::from([1; 16]), EphId::from([2; 16]), SharedKey::from(secret))
    }

    #[test]
    fn payload_roundtrip() {
        let s = session([0x44; 32]);
        let sealed = s.seal_payload(PING).unwrap();
        assert_eq!(s.open_payload(&sealed).unwrap(), PING);
    }

    #[test]
    fn sessions_with_different_secrets_cannot_read_each_other() {
        let a = session([0x44; 32]);
        let b = session([0x45; 32]);
        let sealed = a.seal_payload(b"secret").unwrap();
        assert!(b.open_payload(&sealed).is_err());
    }
}
