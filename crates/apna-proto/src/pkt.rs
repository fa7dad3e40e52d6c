//! Data-plane packet exchanged between APNA endpoints.
//!
//! One packet type serves both the handshake and steady-state traffic; the
//! `next_header` discriminant names the handshake phase and the body union
//! carries the phase's payload. The border element relays these packets
//! without understanding the body.
//!
//! Every packet carries a `packet_mac`: a truncated HMAC over the body's
//! byte image under a symmetric key independent of any DH-derived secret.
//! The MAC protects wire-level origin integrity; payload confidentiality
//! comes from the handshake's shared secrets.

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

/// Handshake phase discriminant carried in every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum NextHeader {
    /// Phase 0: initiator sends its control public key.
    Init = 0x00,
    /// Phase 1: responder replies with its encrypted session certificate.
    Ecert = 0x01,
    /// Phase 2: initiator replies with its encrypted session certificate
    /// plus the responder's echoed session public key.
    EcertPubkey = 0x02,
    /// Phase 3: session data (first use: the handshake confirmation).
    Data = 0x03,
    /// Phase 4: steady-state ping/pong.
    Ping = 0x04,
}

/// Per-phase packet payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PktBody {
    /// Initiator's control-level X25519 public key.
    Pubkey(Vec<u8>),
    /// Session certificate sealed under the control shared secret.
    Ecert(Vec<u8>),
    /// Sealed session certificate plus the peer's session public key.
    EcertPubkey {
        /// Sealed certificate bytes.
        ecert: Vec<u8>,
        /// Echoed session public key identifying the pending session.
        pubkey: Vec<u8>,
    },
    /// Payload sealed under the session shared secret.
    Data(Vec<u8>),
}

/// An APNA data-plane packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pkt {
    /// Sender's wire EphID (16 bytes).
    pub local_ephid: Vec<u8>,
    /// Receiver's wire EphID (16 bytes).
    pub remote_ephid: Vec<u8>,
    /// Sender's port.
    pub local_port: u16,
    /// Receiver's port.
    pub remote_port: u16,
    /// Handshake phase of the body.
    pub next_header: NextHeader,
    /// Truncated HMAC over [`Pkt::mac_input`] (4 bytes).
    pub packet_mac: Vec<u8>,
    /// Phase payload.
    pub body: PktBody,
}

impl Pkt {
    /// Byte image of the body the packet MAC is computed over.
    ///
    /// Mirrors the body union exactly: the concatenation of the active
    /// variant's fields in declaration order.
    pub fn mac_input(&self) -> Vec<u8> {
        match &self.body {
            PktBody::Pubkey(pk) => pk.clone(),
            PktBody::Ecert(ec) => ec.clone(),
            PktBody::EcertPubkey { ecert, pubkey } => {
                let mut buf = Vec::with_capacity(ecert.len() + pubkey.len());
                buf.extend_from_slice(ecert);
                buf.extend_from_slice(pubkey);
                buf
            },
            PktBody::Data(data) => data.clone(),
        }
    }
}
