//! The answering side of the handshake.

use std::collections::HashMap;

use apna_crypto::cert::verify_certificate;
use apna_crypto::{Certificate, EphId, KxKeyPair, MacKey, SharedKey, open, seal};
use apna_proto::{NextHeader, Pkt, PktBody};
use ed25519_dalek::VerifyingKey;
use tracing::debug;

use super::session::{CONFIRMATION, PING, PONG, Session, SessionKey};
use super::{HandshakeError, build_packet, check_packet};

/// Outcome of feeding a packet to the [`Responder`].
#[derive(Debug)]
pub enum ResponderEvent {
    /// A phase-0x00 packet was accepted; the driver must mint a session
    /// identity and pass it to [`Responder::accept`] along with this offer.
    SessionIdentityNeeded(PendingOffer),
    /// A handshake completed. The confirmation reply must be sent and the
    /// session is now addressable under `session_key`.
    Established {
        /// Lookup key of the newly established session.
        session_key: SessionKey,
        /// Phase-0x03 confirmation packet to send.
        reply: Pkt,
    },
    /// Steady-state data arrived on an established session.
    Data {
        /// Session the payload belongs to.
        session_key: SessionKey,
        /// Decrypted application payload.
        payload: Vec<u8>,
    },
    /// A ping was answered; send this pong.
    Reply(Pkt),
}

/// Snapshot of a phase-0x00 packet, handed to the driver while it mints the
/// session identity the reply needs. Opaque: it only travels back into
/// [`Responder::accept`].
#[derive(Debug)]
pub struct PendingOffer {
    ctrl_secret: SharedKey,
    initiator_ctrl_ephid: Vec<u8>,
    responder_ctrl_ephid: Vec<u8>,
    remote_port: u16,
}

struct Pending {
    ctrl_secret: SharedKey,
    session_kx: KxKeyPair,
    session_cert: Certificate,
}

/// Responder state machine: one instance serves any number of concurrent
/// inbound handshakes plus their established sessions.
///
/// Handshakes in flight are keyed by the responder's ephemeral session
/// public key (echoed back by the initiator in phase 0x02); completed
/// sessions are re-keyed by their `(local EphID, remote EphID)` pair so
/// steady-state lookup is a single map probe.
pub struct Responder {
    mac_key: MacKey,
    authority: VerifyingKey,
    ctrl_kx: KxKeyPair,
    local_port: u16,
    pending: HashMap<[u8; 32], Pending>,
    sessions: HashMap<SessionKey, Session>,
}

impl Responder {
    /// Create a responder answering with the given control key pair.
    pub fn new(
        mac_key: MacKey,
        authority: VerifyingKey,
        ctrl_kx: KxKeyPair,
        local_port: u16,
    ) -> Self {
        Self {
            mac_key,
            authority,
            ctrl_kx,
            local_port,
            pending: HashMap::new(),
            sessions: HashMap::new(),
        }
    }

    /// Feed one inbound packet to the state machine.
    ///
    /// The wire MAC is verified before anything else is looked at. Packets
    /// for unknown sessions fail with [`HandshakeError::SessionNotFound`];
    /// a failed packet never disturbs other in-flight handshakes.
    pub fn on_packet(&mut self, pkt: &Pkt) -> Result<ResponderEvent, HandshakeError> {
        check_packet(&self.mac_key, pkt)?;
        match pkt.next_header {
            NextHeader::Init => self.on_init(pkt),
            NextHeader::EcertPubkey => self.on_ecert_pubkey(pkt),
            NextHeader::Data => self.on_data(pkt),
            NextHeader::Ping => self.on_ping(pkt),
            NextHeader::Ecert => Err(HandshakeError::UnexpectedPhase {
                expected: NextHeader::Init as u8,
                got: NextHeader::Ecert as u8,
            }),
        }
    }

    fn on_init(&mut self, pkt: &Pkt) -> Result<ResponderEvent, HandshakeError> {
        let PktBody::Pubkey(initiator_pubkey) = &pkt.body else {
            return Err(HandshakeError::ProtocolViolation);
        };
        let ctrl_secret = self.ctrl_kx.shared_secret(initiator_pubkey)?;
        debug!("inbound handshake opened");
        Ok(ResponderEvent::SessionIdentityNeeded(PendingOffer {
            ctrl_secret,
            initiator_ctrl_ephid: pkt.local_ephid.clone(),
            responder_ctrl_ephid: pkt.remote_ephid.clone(),
            remote_port: pkt.local_port,
        }))
    }

    /// Attach the freshly minted session identity to a pending handshake
    /// and produce the phase-0x01 reply carrying the sealed certificate.
    pub fn accept(
        &mut self,
        offer: PendingOffer,
        session_kx: KxKeyPair,
        session_cert: Certificate,
    ) -> Result<Pkt, HandshakeError> {
        let ecert = seal(&offer.ctrl_secret, &session_cert.to_bytes())?;
        let pkt = build_packet(
            &self.mac_key,
            offer.responder_ctrl_ephid,
            offer.initiator_ctrl_ephid,
            self.local_port,
            offer.remote_port,
            NextHeader::Ecert,
            PktBody::Ecert(ecert),
        )?;
        self.pending.insert(
            session_kx.public_bytes(),
            Pending { ctrl_secret: offer.ctrl_secret, session_kx, session_cert },
        );
        Ok(pkt)
    }

    fn on_ecert_pubkey(&mut self, pkt: &Pkt) -> Result<ResponderEvent, HandshakeError> {
        let PktBody::EcertPubkey { ecert, pubkey } = &pkt.body else {
            return Err(HandshakeError::ProtocolViolation);
        };
        let echoed: [u8; 32] =
            pubkey.as_slice().try_into().map_err(|_| HandshakeError::ProtocolViolation)?;
        let pending =
            self.pending.remove(&echoed).ok_or(HandshakeError::SessionNotFound)?;

        let raw = open(&pending.ctrl_secret, ecert)?;
        let peer_cert = Certificate::from_bytes(&raw)?;
        if !verify_certificate(&peer_cert, &self.authority) {
            return Err(HandshakeError::UntrustedCertificate);
        }
        let secret = pending.session_kx.shared_secret(&peer_cert.pubkey)?;

        let session =
            Session::new(pending.session_cert.ephid, peer_cert.ephid, secret);
        let session_key = session.key();
        let reply = build_packet(
            &self.mac_key,
            session.local_ephid.as_bytes().to_vec(),
            session.remote_ephid.as_bytes().to_vec(),
            self.local_port,
            pkt.local_port,
            NextHeader::Data,
            PktBody::Data(session.seal_payload(CONFIRMATION)?),
        )?;
        self.sessions.insert(session_key, session);
        debug!("handshake complete, session re-keyed by EphID pair");
        Ok(ResponderEvent::Established { session_key, reply })
    }

    /// Resolve the established session an inbound packet addresses: the
    /// packet's `(remote, local)` EphIDs are our `(local, remote)` key.
    fn session_for(&self, pkt: &Pkt) -> Result<&Session, HandshakeError> {
        let local = EphId::from_slice(&pkt.remote_ephid)?;
        let remote = EphId::from_slice(&pkt.local_ephid)?;
        self.sessions.get(&(local, remote)).ok_or(HandshakeError::SessionNotFound)
    }

    fn on_data(&mut self, pkt: &Pkt) -> Result<ResponderEvent, HandshakeError> {
        let PktBody::Data(sealed) = &pkt.body else {
            return Err(HandshakeError::ProtocolViolation);
        };
        let session = self.session_for(pkt)?;
        let payload = session.open_payload(sealed)?;
        Ok(ResponderEvent::Data { session_key: session.key(), payload })
    }

    fn on_ping(&mut self, pkt: &Pkt) -> Result<ResponderEvent, HandshakeError> {
        let PktBody::Data(sealed) = &pkt.body else {
            return Err(HandshakeError::ProtocolViolation);
        };
        let session = self.session_for(pkt)?;
        let payload = session.open_payload(sealed)?;
        if payload != PING {
            return Err(HandshakeError::ProtocolViolation);
        }
        let reply = build_packet(
            &self.mac_key,
            session.local_ephid.as_bytes().to_vec(),
            session.remote_ephid.as_bytes().to_vec(),
            self.local_port,
            pkt.local_port,
            NextHeader::Ping,
            PktBody::Data(session.seal_payload(PONG)?),
        )?;
        Ok(ResponderEvent::Reply(reply))
    }

    /// Look up an established session by its key.
    pub fn session(&self, key: &SessionKey) -> Option<&Session> {
        self.sessions.get(key)
    }
}

impl std::fmt::Debug for Responder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder")
            .field("pending", &self.pending.len())
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}
