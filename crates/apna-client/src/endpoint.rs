//! Endpoint driver: identity registration and handshake I/O.
//!
//! An [`Endpoint`] owns one data-plane UDP socket and a connector to the
//! management service. Registration mints the control identity and publishes
//! the certificate and packet-MAC key; after that the endpoint can dial
//! peers ([`Endpoint::connect`]) or answer them ([`Endpoint::serve`]),
//! feeding packets through the sans-IO state machines and minting session
//! identities on demand.

use std::net::SocketAddr;
use std::sync::Arc;

use apna_core::handshake::{PING, PONG, open_session_packet, session_packet};
use apna_core::{HandshakeError, Initiator, InitiatorEvent, Responder, ResponderEvent, Session};
use apna_crypto::{Certificate, KxKeyPair, MacKey};
use apna_proto::ms::{EphIdKind, ServiceAddr};
use apna_proto::{MAX_MSG_SIZE, NextHeader, Pkt};
use ed25519_dalek::VerifyingKey;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::connector::MsConnector;
use crate::error::ClientError;

/// Static identity of one endpoint.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Service address registered with the directory.
    pub addr: ServiceAddr,
    /// Data-plane port, also the MAC-key registry key.
    pub port: u16,
    /// Packet-MAC key shared with the peers and the border element.
    pub mac_key: MacKey,
    /// Authority key certificates are verified against.
    pub authority: VerifyingKey,
}

/// A registered APNA endpoint.
#[derive(Debug)]
pub struct Endpoint {
    connector: Arc<MsConnector>,
    socket: UdpSocket,
    config: EndpointConfig,
    ctrl_kx: KxKeyPair,
    ctrl_cert: Certificate,
}

impl Endpoint {
    /// Register an identity: mint a control EphID certificate, publish it
    /// in the directory, and register the packet-MAC key under `addr:port`.
    pub async fn register(
        connector: Arc<MsConnector>,
        socket: UdpSocket,
        config: EndpointConfig,
    ) -> Result<Self, ClientError> {
        let ctrl_kx = KxKeyPair::generate();
        let ctrl_cert = connector
            .generate_ephid(EphIdKind::Ctrl, config.addr.clone(), &ctrl_kx.public_bytes())
            .await?;
        connector.dns_register(config.addr.clone(), &ctrl_cert).await?;
        connector
            .mac_key_register(config.addr.addr.clone(), config.port, &config.mac_key)
            .await?;
        info!(port = config.port, "endpoint registered");
        Ok(Self { connector, socket, config, ctrl_kx, ctrl_cert })
    }

    /// The endpoint's control certificate.
    pub fn ctrl_cert(&self) -> &Certificate {
        &self.ctrl_cert
    }

    /// Mint a session identity: fresh key pair plus session EphID
    /// certificate bound to it.
    async fn mint_session_identity(&self) -> Result<(KxKeyPair, Certificate), ClientError> {
        let kx = KxKeyPair::generate();
        let cert = self
            .connector
            .generate_ephid(EphIdKind::Session, self.config.addr.clone(), &kx.public_bytes())
            .await?;
        Ok((kx, cert))
    }

    /// Dial the endpoint registered under `remote`, reachable at
    /// `remote_sock`, and run the handshake to completion.
    pub async fn connect(
        &self,
        remote: ServiceAddr,
        remote_sock: SocketAddr,
        remote_port: u16,
    ) -> Result<Session, ClientError> {
        let remote_cert = self.connector.dns_lookup(remote).await?;
        let mut initiator = Initiator::new(
            self.config.mac_key.clone(),
            self.config.authority,
            self.ctrl_cert.clone(),
            self.ctrl_kx.clone(),
            remote_cert,
            self.config.port,
            remote_port,
        )?;
        let pkt = initiator.start()?;
        self.send_pkt(&pkt, remote_sock).await?;

        let mut buf = vec![0u8; MAX_MSG_SIZE];
        loop {
            let (len, _) = self.socket.recv_from(&mut buf).await?;
            let pkt: Pkt = match apna_proto::decode(&buf[..len]) {
                Ok(pkt) => pkt,
                Err(err) => {
                    warn!(%err, "dropping undecodable packet");
                    continue;
                },
            };
            match initiator.on_packet(&pkt) {
                Ok(InitiatorEvent::SessionIdentityNeeded) => {
                    let (kx, cert) = self.mint_session_identity().await?;
                    let reply = initiator.send_session_cert(&kx, cert)?;
                    self.send_pkt(&reply, remote_sock).await?;
                },
                Ok(InitiatorEvent::Established(session)) => {
                    info!("session established");
                    return Ok(session);
                },
                Err(HandshakeError::UnexpectedPhase { expected, got }) => {
                    // Stray or duplicated datagram; keep waiting.
                    debug!(expected, got, "ignoring out-of-phase packet");
                },
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Answer inbound handshakes and steady-state traffic forever.
    ///
    /// Per-packet failures are logged and the packet dropped; the loop
    /// never halts on a bad packet.
    pub async fn serve(&self) -> Result<(), ClientError> {
        let mut responder = Responder::new(
            self.config.mac_key.clone(),
            self.config.authority,
            self.ctrl_kx.clone(),
            self.config.port,
        );
        let mut buf = vec![0u8; MAX_MSG_SIZE];
        loop {
            let (len, peer) = self.socket.recv_from(&mut buf).await?;
            let pkt: Pkt = match apna_proto::decode(&buf[..len]) {
                Ok(pkt) => pkt,
                Err(err) => {
                    warn!(%err, %peer, "dropping undecodable packet");
                    continue;
                },
            };
            match responder.on_packet(&pkt) {
                Ok(ResponderEvent::SessionIdentityNeeded(offer)) => {
                    let (kx, cert) = match self.mint_session_identity().await {
                        Ok(identity) => identity,
                        Err(err) => {
                            warn!(%err, "failed to mint session identity");
                            continue;
                        },
                    };
                    match responder.accept(offer, kx, cert) {
                        Ok(reply) => self.send_pkt(&reply, peer).await?,
                        Err(err) => warn!(%err, "failed to accept handshake"),
                    }
                },
                Ok(ResponderEvent::Established { reply, .. }) => {
                    self.send_pkt(&reply, peer).await?;
                },
                Ok(ResponderEvent::Reply(reply)) => {
                    self.send_pkt(&reply, peer).await?;
                },
                Ok(ResponderEvent::Data { payload, .. }) => {
                    debug!(len = payload.len(), "session data received");
                },
                Err(err) => warn!(%err, %peer, "dropping packet"),
            }
        }
    }

    /// Send one encrypted ping on an established session and wait for the
    /// matching pong.
    pub async fn ping(
        &self,
        session: &Session,
        remote_sock: SocketAddr,
        remote_port: u16,
    ) -> Result<(), ClientError> {
        let pkt = session_packet(
            &self.config.mac_key,
            session,
            self.config.port,
            remote_port,
            NextHeader::Ping,
            PING,
        )?;
        self.send_pkt(&pkt, remote_sock).await?;

        let mut buf = vec![0u8; MAX_MSG_SIZE];
        let (len, _) = self.socket.recv_from(&mut buf).await?;
        let reply: Pkt = apna_proto::decode(&buf[..len])?;
        let payload = open_session_packet(&self.config.mac_key, session, &reply)?;
        if payload != PONG {
            return Err(HandshakeError::ProtocolViolation.into());
        }
        Ok(())
    }

    /// Send an encrypted application payload on an established session.
    pub async fn send_data(
        &self,
        session: &Session,
        remote_sock: SocketAddr,
        remote_port: u16,
        payload: &[u8],
    ) -> Result<(), ClientError> {
        let pkt = session_packet(
            &self.config.mac_key,
            session,
            self.config.port,
            remote_port,
            NextHeader::Data,
            payload,
        )?;
        self.send_pkt(&pkt, remote_sock).await
    }

    async fn send_pkt(&self, pkt: &Pkt, to: SocketAddr) -> Result<(), ClientError> {
        let raw = apna_proto::encode(pkt)?;
        self.socket.send_to(&raw, to).await?;
        Ok(())
    }
}
