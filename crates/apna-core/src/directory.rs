//! The management authority's directory service.
//!
//! Three in-memory registries plus a request/reply dispatch:
//!
//! - certificate directory: `ServiceAddr -> Certificate`, one active
//!   certificate per address, overwritten on re-registration;
//! - MAC-key directory: `host_id:port -> symmetric key`, same upsert
//!   semantics;
//! - reverse host index: `host_id -> address`, populated as a side effect
//!   of every EphID generation so the border element can route a decrypted
//!   HID back to its real endpoint. Entries never expire within a process
//!   lifetime.
//!
//! Registries are plain maps owned by a single [`DirectoryService`] value
//! constructed at startup; callers serialize access (one request at a
//! time), which makes each registry operation atomic. Nothing here touches
//! the network: `handle` maps one decoded request to at most one reply,
//! and the runtime does the datagram I/O.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use apna_crypto::{
    Certificate, CryptoError, Hid, HidKind, HostId, MacKey, derive_host_id, encrypt_and_sign,
    issue_certificate,
};
use apna_proto::ms::{
    DnsErrorCode, DnsRegister, DnsRegisterErrorCode, DnsRegisterReply, DnsReply, DnsRequest,
    EphIdGenErrorCode, EphIdGenerationReply, EphIdGenerationRequest, EphIdKind, MacKeyErrorCode,
    MacKeyRegister, MacKeyRegisterErrorCode, MacKeyRegisterReply, MacKeyReply, MacKeyRequest,
    ServiceAddr, SiphashToHostErrorCode, SiphashToHostReply, SiphashToHostRequest,
};
use apna_proto::{MsEnvelope, MsMessage};
use tracing::{debug, warn};

use crate::config::MsKeys;

/// Protocol epoch: 2018-01-01T00:00:00Z as Unix seconds. EphID expiry
/// timestamps count minutes from this instant.
pub const EPOCH_UNIX_SECS: u64 = 1_514_764_800;

/// Control EphID lifetime.
pub const CTRL_EPHID_LIFETIME: Duration = Duration::from_secs(60 * 60);

/// Session EphID lifetime.
pub const SESSION_EPHID_LIFETIME: Duration = Duration::from_secs(5 * 60);

/// Expiry timestamp for an EphID of the given kind minted now: minutes
/// since the protocol epoch, measured from `now` plus the kind's lifetime.
pub fn expiry_minutes(kind: EphIdKind, now: SystemTime) -> u32 {
    let lifetime = match kind {
        EphIdKind::Ctrl => CTRL_EPHID_LIFETIME,
        EphIdKind::Session => SESSION_EPHID_LIFETIME,
    };
    let since_unix = now
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .saturating_add(lifetime)
        .as_secs();
    (since_unix.saturating_sub(EPOCH_UNIX_SECS) / 60) as u32
}

/// The management authority's registries and request dispatch.
pub struct DirectoryService {
    keys: MsKeys,
    dns: HashMap<ServiceAddr, Certificate>,
    mac_keys: HashMap<(HostId, u16), MacKey>,
    reverse: HashMap<HostId, Vec<u8>>,
}

impl DirectoryService {
    /// Create a service with empty registries.
    pub fn new(keys: MsKeys) -> Self {
        Self { keys, dns: HashMap::new(), mac_keys: HashMap::new(), reverse: HashMap::new() }
    }

    /// Dispatch one decoded request to its handler.
    ///
    /// Returns the reply envelope carrying the request's correlation id, or
    /// `None` for messages that are not requests (the protocol has no "bad
    /// request" reply; such datagrams are logged and dropped).
    pub fn handle(&mut self, envelope: &MsEnvelope) -> Option<MsEnvelope> {
        let msg = match &envelope.msg {
            MsMessage::EphIdGenerationRequest(req) => {
                MsMessage::EphIdGenerationReply(self.handle_ephid_generation(req))
            },
            MsMessage::DnsRequest(req) => MsMessage::DnsReply(self.handle_dns_request(req)),
            MsMessage::DnsRegister(req) => {
                MsMessage::DnsRegisterReply(self.handle_dns_register(req))
            },
            MsMessage::SiphashToHostRequest(req) => {
                MsMessage::SiphashToHostReply(self.handle_siphash_to_host(req))
            },
            MsMessage::MacKeyRequest(req) => MsMessage::MacKeyReply(self.handle_mac_key(req)),
            MsMessage::MacKeyRegister(req) => {
                MsMessage::MacKeyRegisterReply(self.handle_mac_key_register(req))
            },
            other => {
                warn!(id = envelope.id, ?other, "dropping non-request message");
                return None;
            },
        };
        Some(MsEnvelope { id: envelope.id, msg })
    }

    /// Mint an EphID and certificate for `addr`, recording the reverse
    /// index entry. This is the typed core of the wire handler, also used
    /// when the service is embedded in-process.
    pub fn generate_certificate(
        &mut self,
        kind: EphIdKind,
        addr: &ServiceAddr,
        pubkey: &[u8],
    ) -> Result<Certificate, EphIdGenErrorCode> {
        if addr.addr.is_empty() {
            return Err(EphIdGenErrorCode::HostIdGenerationFailed);
        }
        let host_id = derive_host_id(&self.keys.siphash, &addr.addr);
        self.reverse.insert(host_id, addr.addr.clone());

        let exp = expiry_minutes(kind, SystemTime::now());
        let hid_kind = match kind {
            EphIdKind::Ctrl => HidKind::Ctrl,
            EphIdKind::Session => HidKind::Session,
        };
        let hid = Hid::new(hid_kind, host_id, exp);
        let ephid = match encrypt_and_sign(&hid, &self.keys.aes, &self.keys.hmac) {
            Ok(ephid) => ephid,
            Err(CryptoError::InvalidLength { what: "HMAC key", .. }) => {
                return Err(EphIdGenErrorCode::MacComputeFailed);
            },
            Err(_) => return Err(EphIdGenErrorCode::EncryptionFailed),
        };
        issue_certificate(ephid, pubkey, kind as u8, exp.to_le_bytes(), &self.keys.signing)
            .map_err(|_| EphIdGenErrorCode::SigningFailed)
    }

    fn handle_ephid_generation(&mut self, req: &EphIdGenerationRequest) -> EphIdGenerationReply {
        debug!(kind = ?req.kind, addr = ?req.addr, "ephid generation request");
        match self.generate_certificate(req.kind, &req.addr, &req.pubkey) {
            Ok(cert) => EphIdGenerationReply {
                error_code: EphIdGenErrorCode::Ok,
                cert: cert.to_bytes().to_vec(),
            },
            Err(error_code) => {
                warn!(?error_code, "ephid generation failed");
                EphIdGenerationReply { error_code, cert: Vec::new() }
            },
        }
    }

    fn handle_dns_request(&self, req: &DnsRequest) -> DnsReply {
        debug!(addr = ?req.addr, "dns request");
        match self.dns.get(&req.addr) {
            Some(cert) => {
                DnsReply { error_code: DnsErrorCode::Ok, cert: cert.to_bytes().to_vec() }
            },
            None => DnsReply { error_code: DnsErrorCode::NoEntries, cert: Vec::new() },
        }
    }

    fn handle_dns_register(&mut self, req: &DnsRegister) -> DnsRegisterReply {
        debug!(addr = ?req.addr, "dns register");
        match Certificate::from_bytes(&req.cert) {
            Ok(cert) => {
                // Unconditional upsert: the new certificate replaces any
                // prior registration for this address.
                self.dns.insert(req.addr.clone(), cert);
                DnsRegisterReply { error_code: DnsRegisterErrorCode::Ok }
            },
            Err(err) => {
                warn!(%err, "rejecting malformed certificate registration");
                DnsRegisterReply { error_code: DnsRegisterErrorCode::Failed }
            },
        }
    }

    fn handle_siphash_to_host(&self, req: &SiphashToHostRequest) -> SiphashToHostReply {
        debug!(siphash = ?req.siphash, "siphash-to-host request");
        let Ok(host_id) = HostId::from_slice(&req.siphash) else {
            return SiphashToHostReply {
                error_code: SiphashToHostErrorCode::NotFound,
                host: Vec::new(),
            };
        };
        match self.reverse.get(&host_id) {
            Some(host) => {
                SiphashToHostReply { error_code: SiphashToHostErrorCode::Ok, host: host.clone() }
            },
            None => {
                SiphashToHostReply { error_code: SiphashToHostErrorCode::NotFound, host: Vec::new() }
            },
        }
    }

    fn handle_mac_key(&self, req: &MacKeyRequest) -> MacKeyReply {
        debug!(host_id = ?req.host_id, port = req.port, "mac key request");
        let Ok(host_id) = HostId::from_slice(&req.host_id) else {
            return MacKeyReply { error_code: MacKeyErrorCode::NotFound, mac_key: Vec::new() };
        };
        match self.mac_keys.get(&(host_id, req.port)) {
            Some(key) => MacKeyReply {
                error_code: MacKeyErrorCode::Ok,
                mac_key: key.as_bytes().to_vec(),
            },
            None => MacKeyReply { error_code: MacKeyErrorCode::NotFound, mac_key: Vec::new() },
        }
    }

    fn handle_mac_key_register(&mut self, req: &MacKeyRegister) -> MacKeyRegisterReply {
        debug!(addr = ?req.addr, port = req.port, "mac key register");
        if req.addr.is_empty() || req.key.is_empty() {
            return MacKeyRegisterReply { error_code: MacKeyRegisterErrorCode::Failed };
        }
        let host_id = derive_host_id(&self.keys.siphash, &req.addr);
        self.mac_keys.insert((host_id, req.port), MacKey::new(req.key.clone()));
        MacKeyRegisterReply { error_code: MacKeyRegisterErrorCode::Ok }
    }

    /// The authority public key endpoints verify certificates against.
    pub fn authority(&self) -> ed25519_dalek::VerifyingKey {
        self.keys.authority
    }

    /// Decode one raw request datagram, dispatch it, and encode the reply.
    ///
    /// Undecodable datagrams and non-request messages are dropped with a
    /// log line, mirroring [`Self::handle`].
    pub fn handle_datagram(&mut self, datagram: &[u8]) -> Option<Vec<u8>> {
        let envelope: MsEnvelope = match apna_proto::decode(datagram) {
            Ok(env) => env,
            Err(err) => {
                warn!(%err, "dropping undecodable datagram");
                return None;
            },
        };
        let reply = self.handle(&envelope)?;
        match apna_proto::encode(&reply) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                warn!(%err, "failed to encode reply");
                None
            },
        }
    }
}

impl std::fmt::Debug for DirectoryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryService")
            .field("dns_entries", &self.dns.len())
            .field("mac_keys", &self.mac_keys.len())
            .field("reverse_entries", &self.reverse.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use apna_crypto::verify_certificate;
    use ed25519_dalek::SigningKey;
    use proptest::prelude::*;

    use super::*;
    use crate::config::MsConfig;

    fn test_service() -> DirectoryService {
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

    fn udp4(addr: &[u8]) -> ServiceAddr {
        ServiceAddr { protocol: 17, addr: addr.to_vec() }
    }

    #[test]
    fn generated_certificate_verifies_and_decrypts() {
        let mut svc = test_service();
        let cert = svc
            .generate_certificate(EphIdKind::Ctrl, &udp4(&[10, 0, 0, 1]), &[0xab; 32])
            .unwrap();
        assert!(verify_certificate(&cert, &svc.authority()));

        // The EphID decrypts back to the right host id under the service keys.
        let hid =
            apna_crypto::verify_and_decrypt(&cert.ephid, &svc.keys.aes, &svc.keys.hmac).unwrap();
        assert_eq!(hid.host_id(), derive_host_id(&svc.keys.siphash, &[10, 0, 0, 1]));
        assert_eq!(hid.kind_raw(), EphIdKind::Ctrl as u8);
    }

    #[test]
    fn reverse_index_is_populated_by_generation() {
        let mut svc = test_service();
        let addr = udp4(&[10, 0, 0, 7]);
        svc.generate_certificate(EphIdKind::Session, &addr, &[1; 32]).unwrap();

        let host_id = derive_host_id(&svc.keys.siphash, &addr.addr);
        let reply = svc.handle_siphash_to_host(&SiphashToHostRequest {
            siphash: host_id.as_bytes().to_vec(),
        });
        assert_eq!(reply.error_code, SiphashToHostErrorCode::Ok);
        assert_eq!(reply.host, addr.addr);
    }

    #[test]
    fn dns_register_overwrites_previous_entry() {
        let mut svc = test_service();
        let addr = udp4(&[10, 0, 0, 1]);
        let first = svc.generate_certificate(EphIdKind::Ctrl, &addr, &[1; 32]).unwrap();
        let second = svc.generate_certificate(EphIdKind::Ctrl, &addr, &[2; 32]).unwrap();

        for cert in [&first, &second] {
            let reply = svc.handle_dns_register(&DnsRegister {
                addr: addr.clone(),
                cert: cert.to_bytes().to_vec(),
            });
            assert_eq!(reply.error_code, DnsRegisterErrorCode::Ok);
        }

        let reply = svc.handle_dns_request(&DnsRequest { addr });
        assert_eq!(reply.error_code, DnsErrorCode::Ok);
        assert_eq!(reply.cert, second.to_bytes().to_vec());
    }

    #[test]
    fn dns_miss_reports_no_entries() {
        let svc = test_service();
        let reply = svc.handle_dns_request(&DnsRequest { addr: udp4(&[9, 9, 9, 9]) });
        assert_eq!(reply.error_code, DnsErrorCode::NoEntries);
        assert!(reply.cert.is_empty());
    }

    #[test]
    fn mac_key_roundtrip_and_overwrite() {
        let mut svc = test_service();
        let addr = vec![10, 0, 0, 2];
        for key in [vec![0xaa; 16], vec![0xbb; 16]] {
            let reply = svc.handle_mac_key_register(&MacKeyRegister {
                addr: addr.clone(),
                port: 4000,
                key,
            });
            assert_eq!(reply.error_code, MacKeyRegisterErrorCode::Ok);
        }

        let host_id = derive_host_id(&svc.keys.siphash, &addr);
        let reply = svc.handle_mac_key(&MacKeyRequest {
            host_id: host_id.as_bytes().to_vec(),
            port: 4000,
        });
        assert_eq!(reply.error_code, MacKeyErrorCode::Ok);
        assert_eq!(reply.mac_key, vec![0xbb; 16]);

        // Different port is a different entry.
        let reply = svc.handle_mac_key(&MacKeyRequest {
            host_id: host_id.as_bytes().to_vec(),
            port: 4001,
        });
        assert_eq!(reply.error_code, MacKeyErrorCode::NotFound);
    }

    #[test]
    fn dispatch_echoes_correlation_id() {
        let mut svc = test_service();
        let envelope = MsEnvelope {
            id: 0xdead_beef,
            msg: MsMessage::DnsRequest(DnsRequest { addr: udp4(&[1, 2, 3, 4]) }),
        };
        let reply = svc.handle(&envelope).unwrap();
        assert_eq!(reply.id, 0xdead_beef);
        assert!(matches!(reply.msg, MsMessage::DnsReply(_)));
    }

    #[test]
    fn reply_messages_are_dropped_not_answered() {
        let mut svc = test_service();
        let envelope = MsEnvelope {
            id: 1,
            msg: MsMessage::DnsReply(DnsReply { error_code: DnsErrorCode::Ok, cert: vec![] }),
        };
        assert!(svc.handle(&envelope).is_none());
    }

    #[test]
    fn undecodable_datagram_dropped() {
        let mut svc = test_service();
        assert!(svc.handle_datagram(&[0xff, 0x13, 0x37]).is_none());
    }

    proptest! {
        #[test]
        fn any_nonempty_address_yields_a_verifiable_certificate(
            addr in proptest::collection::vec(any::<u8>(), 1..32),
        ) {
            let mut svc = test_service();
            let cert = svc
                .generate_certificate(
                    EphIdKind::Session,
                    &ServiceAddr { protocol: 17, addr: addr.clone() },
                    &[0x01; 32],
                )
                .unwrap();
            prop_assert!(verify_certificate(&cert, &svc.authority()));
            let hid = apna_crypto::verify_and_decrypt(&cert.ephid, &svc.keys.aes, &svc.keys.hmac)
                .unwrap();
            prop_assert_eq!(hid.host_id(), derive_host_id(&svc.keys.siphash, &addr));
        }
    }

    #[test]
    fn empty_address_is_rejected() {
        let mut svc = test_service();
        let err = svc
            .generate_certificate(
                EphIdKind::Ctrl,
                &ServiceAddr { protocol: 17, addr: Vec::new() },
                &[0x01; 32],
            )
            .unwrap_err();
        assert_eq!(err, EphIdGenErrorCode::HostIdGenerationFailed);
    }

    #[test]
    fn expiry_policies_differ_by_kind() {
        let now = SystemTime::now();
        let ctrl = expiry_minutes(EphIdKind::Ctrl, now);
        let session = expiry_minutes(EphIdKind::Session, now);
        // One hour vs five minutes, measured in whole minutes.
        assert!(ctrl >= session + 54 && ctrl <= session + 56);
    }
}
