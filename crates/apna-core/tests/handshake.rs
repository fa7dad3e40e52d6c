//! Deterministic in-memory handshake: two endpoints, one directory service,
//! no sockets.

use apna_core::handshake::{open_session_packet, session_packet};
use apna_core::{
    DirectoryService, HandshakeError, Initiator, InitiatorEvent, MsConfig, Responder,
    ResponderEvent, Session,
};
use apna_crypto::{KxKeyPair, MacKey};
use apna_proto::NextHeader;
use apna_proto::ms::{EphIdKind, ServiceAddr};
use ed25519_dalek::SigningKey;

const INITIATOR_PORT: u16 = 4001;
const RESPONDER_PORT: u16 = 4002;

fn directory() -> DirectoryService {
    let signing = SigningKey::from_bytes(&[0x42; 32]);
    let config = MsConfig {
        ip: "127.0.0.1".parse().unwrap(),
        port: 0,
        sign_algo: "ed25519".to_string(),
        pubkey: signing.verifying_key().to_bytes().to_vec(),
        privkey: signing.to_bytes().to_vec(),
        hmac_key: vec![0x22; 64],
        aes_key: vec![0x11; 16],
        siphash_key: vec![0x33; 16],
    };
    DirectoryService::new(config.keys().unwrap())
}

fn udp4(addr: [u8; 4]) -> ServiceAddr {
    ServiceAddr { protocol: 17, addr: addr.to_vec() }
}

struct Endpoints {
    svc: DirectoryService,
    initiator: Initiator,
    responder: Responder,
    initiator_addr: ServiceAddr,
    responder_addr: ServiceAddr,
}

fn endpoints() -> Endpoints {
    let mut svc = directory();
    let mac_key = MacKey::new(vec![0x99; 32]);
    let initiator_addr = udp4([10, 0, 0, 1]);
    let responder_addr = udp4([10, 0, 0, 2]);

    let initiator_kx = KxKeyPair::generate();
    let initiator_cert = svc
        .generate_certificate(EphIdKind::Ctrl, &initiator_addr, &initiator_kx.public_bytes())
        .unwrap();
    let responder_kx = KxKeyPair::generate();
    let responder_cert = svc
        .generate_certificate(EphIdKind::Ctrl, &responder_addr, &responder_kx.public_bytes())
        .unwrap();

    let initiator = Initiator::new(
        mac_key.clone(),
        svc.authority(),
        initiator_cert,
        initiator_kx,
        responder_cert,
        INITIATOR_PORT,
        RESPONDER_PORT,
    )
    .unwrap();
    let responder = Responder::new(mac_key, svc.authority(), responder_kx, RESPONDER_PORT);

    Endpoints { svc, initiator, responder, initiator_addr, responder_addr }
}

/// Run phases 0x00 through 0x03, returning the initiator's established
/// session.
fn complete_handshake(ep: &mut Endpoints) -> Session {
    let init_pkt = ep.initiator.start().unwrap();

    let ResponderEvent::SessionIdentityNeeded(offer) =
        ep.responder.on_packet(&init_pkt).unwrap()
    else {
        panic!("expected session identity request from responder");
    };
    let responder_session_kx = KxKeyPair::generate();
    let responder_session_cert = ep
        .svc
        .generate_certificate(
            EphIdKind::Session,
            &ep.responder_addr,
            &responder_session_kx.public_bytes(),
        )
        .unwrap();
    let ecert_pkt =
        ep.responder.accept(offer, responder_session_kx, responder_session_cert).unwrap();

    let InitiatorEvent::SessionIdentityNeeded = ep.initiator.on_packet(&ecert_pkt).unwrap()
    else {
        panic!("expected session identity request from initiator");
    };
    let initiator_session_kx = KxKeyPair::generate();
    let initiator_session_cert = ep
        .svc
        .generate_certificate(
            EphIdKind::Session,
            &ep.initiator_addr,
            &initiator_session_kx.public_bytes(),
        )
        .unwrap();
    let ecert_pubkey_pkt = ep
        .initiator
        .send_session_cert(&initiator_session_kx, initiator_session_cert)
        .unwrap();

    let ResponderEvent::Established { session_key, reply } =
        ep.responder.on_packet(&ecert_pubkey_pkt).unwrap()
    else {
        panic!("expected responder to establish");
    };
    assert!(ep.responder.session(&session_key).is_some());

    let InitiatorEvent::Established(session) = ep.initiator.on_packet(&reply).unwrap() else {
        panic!("expected initiator to establish");
    };
    session
}

#[test]
fn full_handshake_establishes_matching_sessions() {
    let mut ep = endpoints();
    let session = complete_handshake(&mut ep);

    // The two sides hold mirrored EphID pairs for the same session.
    let responder_session =
        ep.responder.session(&(session.remote_ephid, session.local_ephid)).unwrap();
    assert_eq!(responder_session.local_ephid, session.remote_ephid);
    assert_eq!(responder_session.remote_ephid, session.local_ephid);

    // And the same secret: a payload sealed on one side opens on the other.
    let sealed = session.seal_payload(b"hello").unwrap();
    assert_eq!(responder_session.open_payload(&sealed).unwrap(), b"hello");
}

#[test]
fn ping_elicits_pong() {
    let mut ep = endpoints();
    let session = complete_handshake(&mut ep);
    let mac_key = MacKey::new(vec![0x99; 32]);

    let ping = session_packet(
        &mac_key,
        &session,
        INITIATOR_PORT,
        RESPONDER_PORT,
        NextHeader::Ping,
        b"ping",
    )
    .unwrap();
    let ResponderEvent::Reply(pong) = ep.responder.on_packet(&ping).unwrap() else {
        panic!("expected pong reply");
    };
    assert_eq!(open_session_packet(&mac_key, &session, &pong).unwrap(), b"pong");
}

#[test]
fn non_ping_payload_is_a_protocol_violation() {
    let mut ep = endpoints();
    let session = complete_handshake(&mut ep);
    let mac_key = MacKey::new(vec![0x99; 32]);

    let bogus = session_packet(
        &mac_key,
        &session,
        INITIATOR_PORT,
        RESPONDER_PORT,
        NextHeader::Ping,
        b"gnip",
    )
    .unwrap();
    assert!(matches!(
        ep.responder.on_packet(&bogus),
        Err(HandshakeError::ProtocolViolation)
    ));
}

#[test]
fn data_on_established_session_is_surfaced() {
    let mut ep = endpoints();
    let session = complete_handshake(&mut ep);
    let mac_key = MacKey::new(vec![0x99; 32]);

    let pkt = session_packet(
        &mac_key,
        &session,
        INITIATOR_PORT,
        RESPONDER_PORT,
        NextHeader::Data,
        b"application bytes",
    )
    .unwrap();
    let ResponderEvent::Data { payload, .. } = ep.responder.on_packet(&pkt).unwrap() else {
        panic!("expected data event");
    };
    assert_eq!(payload, b"application bytes");
}

#[test]
fn data_for_unknown_session_is_rejected() {
    let mut ep = endpoints();
    let _ = complete_handshake(&mut ep);
    let mac_key = MacKey::new(vec![0x99; 32]);

    // A session the responder never saw.
    let stranger = Session::new(
        apna_crypto::EphId::from([0xaa; 16]),
        apna_crypto::EphId::from([0xbb; 16]),
        apna_crypto::SharedKey::from([0xcc; 32]),
    );
    let pkt = session_packet(
        &mac_key,
        &stranger,
        INITIATOR_PORT,
        RESPONDER_PORT,
        NextHeader::Data,
        b"hi",
    )
    .unwrap();
    assert!(matches!(
        ep.responder.on_packet(&pkt),
        Err(HandshakeError::SessionNotFound)
    ));
}

#[test]
fn out_of_order_packet_leaves_initiator_usable() {
    let mut ep = endpoints();
    let init_pkt = ep.initiator.start().unwrap();

    // Replaying the initiator's own packet at itself is out of phase.
    let err = ep.initiator.on_packet(&init_pkt).unwrap_err();
    assert!(matches!(err, HandshakeError::UnexpectedPhase { expected: 0x01, got: 0x00 }));

    // The handshake still completes afterwards.
    let ResponderEvent::SessionIdentityNeeded(offer) =
        ep.responder.on_packet(&init_pkt).unwrap()
    else {
        panic!("expected session identity request");
    };
    let kx = KxKeyPair::generate();
    let cert = ep
        .svc
        .generate_certificate(EphIdKind::Session, &ep.responder_addr, &kx.public_bytes())
        .unwrap();
    let ecert_pkt = ep.responder.accept(offer, kx, cert).unwrap();
    assert!(matches!(
        ep.initiator.on_packet(&ecert_pkt).unwrap(),
        InitiatorEvent::SessionIdentityNeeded
    ));
}

#[test]
fn mitm_mac_key_is_detected() {
    let mut ep = endpoints();
    let mut init_pkt = ep.initiator.start().unwrap();
    // Recompute the MAC under a different key.
    init_pkt.packet_mac = vec![0; 4];
    assert!(matches!(
        ep.responder.on_packet(&init_pkt),
        Err(HandshakeError::Crypto(_))
    ));
}
