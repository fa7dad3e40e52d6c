//! The 4-phase session handshake.
//!
//! Two sans-IO state machines: [`Initiator`] dials, [`Responder`] answers.
//! Transitions consume decoded packets and return packets or typed events;
//! the machines never touch a socket. When a transition needs a freshly
//! minted session identity (an EphID plus certificate, which only the
//! management service can produce), it surfaces that as an event and the
//! driver feeds the identity back in.
//!
//! # Phases
//!
//! ```text
//! initiator                                 responder
//!   | -- 0x00 Init(ctrl pubkey) ------------> |  DH ctrl secret
//!   | <- 0x01 Ecert(sealed session cert) ---- |  pending by session pubkey
//!   | -- 0x02 EcertPubkey(sealed cert, echo)->|  DH session secret
//!   | <- 0x03 Data(sealed "Handshake Done") - |  session re-keyed by EphIDs
//!   | <====== 0x04 ping / pong =============> |
//! ```
//!
//! Phases 0x00..=0x02 are addressed by the peers' control EphIDs; from 0x03
//! on, packets carry the session EphIDs minted during the handshake. The
//! session certificates travel sealed under the control-level DH secret, and
//! the confirmation literal plus all steady-state payloads travel sealed
//! under the session-level secret.
//!
//! # Security
//!
//! Every inbound packet's wire MAC is verified before any field is
//! interpreted, and every certificate received mid-handshake is checked
//! against the authority key before its embedded public key is used for key
//! exchange.

mod initiator;
mod responder;
mod session;

use apna_crypto::{CryptoError, MacKey, compute_packet_mac, verify_packet_mac};
use apna_proto::{NextHeader, Pkt, PktBody};
use thiserror::Error;

pub use initiator::{Initiator, InitiatorEvent};
pub use responder::{PendingOffer, Responder, ResponderEvent};
pub use session::{CONFIRMATION, PING, PONG, Session, SessionKey};

/// Errors raised by the handshake state machines.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// A packet arrived out of phase order.
    #[error("unexpected handshake phase: expected {expected:#04x}, got {got:#04x}")]
    UnexpectedPhase {
        /// Phase the state machine was waiting for.
        expected: u8,
        /// Phase carried by the packet.
        got: u8,
    },

    /// No pending or established session matches the packet's keys.
    #[error("no session matches the packet")]
    SessionNotFound,

    /// The packet is well-formed but its content violates the protocol,
    /// e.g. a body that does not match its phase or a ping payload that is
    /// not the ping literal.
    #[error("protocol violation")]
    ProtocolViolation,

    /// A certificate received during the handshake does not verify against
    /// the authority key.
    #[error("certificate does not verify against the authority")]
    UntrustedCertificate,

    /// A cryptographic operation failed (wire MAC, sealing, key exchange).
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Build an outbound packet, computing its wire MAC over the body image.
fn build_packet(
    mac_key: &MacKey,
    local_ephid: Vec<u8>,
    remote_ephid: Vec<u8>,
    local_port: u16,
    remote_port: u16,
    next_header: NextHeader,
    body: PktBody,
) -> Result<Pkt, HandshakeError> {
    let mut pkt = Pkt {
        local_ephid,
        remote_ephid,
        local_port,
        remote_port,
        next_header,
        packet_mac: Vec::new(),
        body,
    };
    pkt.packet_mac = compute_packet_mac(mac_key, &pkt.mac_input())?.to_vec();
    Ok(pkt)
}

/// Verify an inbound packet's wire MAC. Called before any transition
/// interprets the packet.
fn check_packet(mac_key: &MacKey, pkt: &Pkt) -> Result<(), HandshakeError> {
    verify_packet_mac(mac_key, &pkt.mac_input(), &pkt.packet_mac)?;
    Ok(())
}

/// Build a steady-state packet on an established session: the payload is
/// sealed under the session secret and the packet addressed by the session's
/// EphID pair. Only `Data` and `Ping` are steady-state phases.
pub fn session_packet(
    mac_key: &MacKey,
    session: &Session,
    local_port: u16,
    remote_port: u16,
    next_header: NextHeader,
    payload: &[u8],
) -> Result<Pkt, HandshakeError> {
    if !matches!(next_header, NextHeader::Data | NextHeader::Ping) {
        return Err(HandshakeError::ProtocolViolation);
    }
    build_packet(
        mac_key,
        session.local_ephid.as_bytes().to_vec(),
        session.remote_ephid.as_bytes().to_vec(),
        local_port,
        remote_port,
        next_header,
        PktBody::Data(session.seal_payload(payload)?),
    )
}

/// Verify and open a steady-state packet received on an established
/// session: wire MAC first, then the sealed payload.
pub fn open_session_packet(
    mac_key: &MacKey,
    session: &Session,
    pkt: &Pkt,
) -> Result<Vec<u8>, HandshakeError> {
    check_packet(mac_key, pkt)?;
    let PktBody::Data(sealed) = &pkt.body else {
        return Err(HandshakeError::ProtocolViolation);
    };
    Ok(session.open_payload(sealed)?)
}
