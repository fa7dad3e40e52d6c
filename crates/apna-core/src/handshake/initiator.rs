//! The dialing side of the handshake.

use apna_crypto::cert::verify_certificate;
use apna_crypto::{Certificate, KxKeyPair, MacKey, SharedKey, open, seal};
use apna_proto::{NextHeader, Pkt, PktBody};
use ed25519_dalek::VerifyingKey;
use tracing::debug;

use super::session::{CONFIRMATION, Session};
use super::{HandshakeError, build_packet, check_packet};

/// Outcome of feeding a packet to the [`Initiator`].
#[derive(Debug)]
pub enum InitiatorEvent {
    /// The responder's session certificate was accepted; the driver must
    /// mint a session identity (fresh key pair plus certificate from the
    /// management service) and pass it to [`Initiator::send_session_cert`].
    SessionIdentityNeeded,
    /// The confirmation opened and matched; the handshake is complete.
    Established(Session),
}

#[derive(Debug)]
enum State {
    Idle,
    AwaitEcert { ctrl_secret: SharedKey },
    NeedSessionIdentity { ctrl_secret: SharedKey, remote_session_cert: Certificate },
    AwaitConfirmation { session: Session },
    Established,
}

impl State {
    fn expected_phase(&self) -> u8 {
        match self {
            State::Idle => NextHeader::Init as u8,
            State::AwaitEcert { .. } => NextHeader::Ecert as u8,
            State::NeedSessionIdentity { .. } => NextHeader::EcertPubkey as u8,
            State::AwaitConfirmation { .. } | State::Established => NextHeader::Data as u8,
        }
    }
}

/// Initiator state machine: one instance per outbound handshake.
///
/// Construction verifies the responder's directory certificate; every
/// subsequent certificate and payload is authenticated before use. Drive it
/// with [`Initiator::start`], then feed every inbound packet to
/// [`Initiator::on_packet`] until it yields [`InitiatorEvent::Established`].
#[derive(Debug)]
pub struct Initiator {
    mac_key: MacKey,
    authority: VerifyingKey,
    ctrl_cert: Certificate,
    ctrl_kx: KxKeyPair,
    remote_cert: Certificate,
    local_port: u16,
    remote_port: u16,
    state: State,
}

impl Initiator {
    /// Create an initiator dialing the endpoint behind `remote_cert`.
    ///
    /// Fails with [`HandshakeError::UntrustedCertificate`] if the directory
    /// certificate does not verify against the authority key.
    pub fn new(
        mac_key: MacKey,
        authority: VerifyingKey,
        ctrl_cert: Certificate,
        ctrl_kx: KxKeyPair,
        remote_cert: Certificate,
        local_port: u16,
        remote_port: u16,
    ) -> Result<Self, HandshakeError> {
        if !verify_certificate(&remote_cert, &authority) {
            return Err(HandshakeError::UntrustedCertificate);
        }
        Ok(Self {
            mac_key,
            authority,
            ctrl_cert,
            ctrl_kx,
            remote_cert,
            local_port,
            remote_port,
            state: State::Idle,
        })
    }

    /// Open the handshake: derive the control shared secret and produce the
    /// phase-0x00 packet carrying our control public key.
    pub fn start(&mut self) -> Result<Pkt, HandshakeError> {
        if !matches!(self.state, State::Idle) {
            return Err(HandshakeError::ProtocolViolation);
        }
        let ctrl_secret = self.ctrl_kx.shared_secret(&self.remote_cert.pubkey)?;
        let pkt = build_packet(
            &self.mac_key,
            self.ctrl_cert.ephid.as_bytes().to_vec(),
            self.remote_cert.ephid.as_bytes().to_vec(),
            self.local_port,
            self.remote_port,
            NextHeader::Init,
            PktBody::Pubkey(self.ctrl_kx.public_bytes().to_vec()),
        )?;
        self.state = State::AwaitEcert { ctrl_secret };
        debug!("handshake opened");
        Ok(pkt)
    }

    /// Feed one inbound packet to the state machine.
    ///
    /// The wire MAC is verified before anything else is looked at; a packet
    /// for the wrong phase leaves the state untouched.
    pub fn on_packet(&mut self, pkt: &Pkt) -> Result<InitiatorEvent, HandshakeError> {
        check_packet(&self.mac_key, pkt)?;
        let got = pkt.next_header;
        match &self.state {
            State::AwaitEcert { ctrl_secret } if got == NextHeader::Ecert => {
                let PktBody::Ecert(sealed) = &pkt.body else {
                    return Err(HandshakeError::ProtocolViolation);
                };
                let raw = open(ctrl_secret, sealed)?;
                let cert = Certificate::from_bytes(&raw)?;
                if !verify_certificate(&cert, &self.authority) {
                    return Err(HandshakeError::UntrustedCertificate);
                }
                debug!("responder session certificate accepted");
                self.state = State::NeedSessionIdentity {
                    ctrl_secret: ctrl_secret.clone(),
                    remote_session_cert: cert,
                };
                Ok(InitiatorEvent::SessionIdentityNeeded)
            },
            State::AwaitConfirmation { session } if got == NextHeader::Data => {
                let PktBody::Data(sealed) = &pkt.body else {
                    return Err(HandshakeError::ProtocolViolation);
                };
                let payload = session.open_payload(sealed)?;
                if payload != CONFIRMATION {
                    return Err(HandshakeError::ProtocolViolation);
                }
                let session = session.clone();
                self.state = State::Established;
                debug!("handshake complete");
                Ok(InitiatorEvent::Established(session))
            },
            state => Err(HandshakeError::UnexpectedPhase {
                expected: state.expected_phase(),
                got: got as u8,
            }),
        }
    }

    /// Supply the freshly minted session identity and produce the
    /// phase-0x02 packet.
    ///
    /// Derives the session shared secret against the responder's session
    /// public key, seals our session certificate under the control secret,
    /// and echoes the responder's session public key so it can find its
    /// pending state.
    pub fn send_session_cert(
        &mut self,
        session_kx: &KxKeyPair,
        session_cert: Certificate,
    ) -> Result<Pkt, HandshakeError> {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::NeedSessionIdentity { ctrl_secret, remote_session_cert } => {
                let secret = session_kx.shared_secret(&remote_session_cert.pubkey)?;
                let ecert = seal(&ctrl_secret, &session_cert.to_bytes())?;
                let pkt = build_packet(
                    &self.mac_key,
                    self.ctrl_cert.ephid.as_bytes().to_vec(),
                    self.remote_cert.ephid.as_bytes().to_vec(),
                    self.local_port,
                    self.remote_port,
                    NextHeader::EcertPubkey,
                    PktBody::EcertPubkey {
                        ecert,
                        pubkey: remote_session_cert.pubkey.to_vec(),
                    },
                )?;
                self.state = State::AwaitConfirmation {
                    session: Session::new(
                        session_cert.ephid,
                        remote_session_cert.ephid,
                        secret,
                    ),
                };
                Ok(pkt)
            },
            other => {
                self.state = other;
                Err(HandshakeError::ProtocolViolation)
            },
        }
    }
}
