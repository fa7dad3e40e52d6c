//! Management-service request/reply messages.
//!
//! One inbound datagram maps to exactly one request kind. Each request
//! carries a caller-chosen correlation id; the service echoes it unchanged
//! in the reply so callers can match replies to concurrent outstanding
//! requests over a single socket. There is no "bad request" reply: datagrams
//! with an unknown shape are logged and dropped by the service.
//!
//! Failures are surfaced as typed per-reply error codes, never as raw
//! errors across the wire.

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

/// EphID kind requested from the service: control-level (long-lived) or
/// session-scoped (short-lived).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum EphIdKind {
    /// Control EphID, one hour lifetime.
    Ctrl = 0x00,
    /// Session EphID, five minute lifetime.
    Session = 0x01,
}

/// Directory key identifying a registrant.
///
/// Unique per `(protocol, address)` pair; the address is the registrant's
/// host address in its canonical byte form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceAddr {
    /// Transport protocol discriminant (e.g. 17 for udp4).
    pub protocol: u8,
    /// Host address bytes.
    pub addr: Vec<u8>,
}

/// Request a fresh EphID plus certificate bound to `pubkey`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EphIdGenerationRequest {
    /// Control or session EphID.
    pub kind: EphIdKind,
    /// Address the EphID is generated for.
    pub addr: ServiceAddr,
    /// X25519 public key to bind into the certificate.
    pub pubkey: Vec<u8>,
}

/// Outcome codes for [`EphIdGenerationRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum EphIdGenErrorCode {
    /// Success.
    Ok = 0,
    /// Host id derivation from the address failed.
    HostIdGenerationFailed = 1,
    /// EphID encryption failed.
    EncryptionFailed = 2,
    /// EphID MAC computation failed.
    MacComputeFailed = 3,
    /// Certificate signing failed.
    SigningFailed = 4,
}

/// Reply to [`EphIdGenerationRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EphIdGenerationReply {
    /// Outcome code.
    pub error_code: EphIdGenErrorCode,
    /// Signed certificate bytes (117 bytes) when `error_code` is `Ok`,
    /// empty otherwise.
    pub cert: Vec<u8>,
}

/// Look up the active certificate registered for an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRequest {
    /// Address to resolve.
    pub addr: ServiceAddr,
}

/// Outcome codes for [`DnsRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum DnsErrorCode {
    /// Success.
    Ok = 0,
    /// No certificate registered for the address.
    NoEntries = 1,
}

/// Reply to [`DnsRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsReply {
    /// Outcome code.
    pub error_code: DnsErrorCode,
    /// Registered certificate bytes, empty on a miss.
    pub cert: Vec<u8>,
}

/// Publish a certificate under an address. Unconditional upsert: a new
/// registration replaces any prior certificate for the same address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRegister {
    /// Address to register under.
    pub addr: ServiceAddr,
    /// Signed certificate bytes.
    pub cert: Vec<u8>,
}

/// Outcome codes for [`DnsRegister`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum DnsRegisterErrorCode {
    /// Success.
    Ok = 0,
    /// Registration failed.
    Failed = 1,
}

/// Reply to [`DnsRegister`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRegisterReply {
    /// Outcome code.
    pub error_code: DnsRegisterErrorCode,
}

/// Resolve a truncated keyed host hash back to the host address it was
/// derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiphashToHostRequest {
    /// 3-byte truncated SipHash of the host address.
    pub siphash: Vec<u8>,
}

/// Outcome codes for [`SiphashToHostRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum SiphashToHostErrorCode {
    /// Success.
    Ok = 0,
    /// No host recorded for this hash.
    NotFound = 1,
}

/// Reply to [`SiphashToHostRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiphashToHostReply {
    /// Outcome code.
    pub error_code: SiphashToHostErrorCode,
    /// Host address bytes, empty on a miss.
    pub host: Vec<u8>,
}

/// Look up the symmetric packet-MAC key registered for `hostid:port`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacKeyRequest {
    /// 3-byte host id.
    pub host_id: Vec<u8>,
    /// Registrant port.
    pub port: u16,
}

/// Outcome codes for [`MacKeyRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum MacKeyErrorCode {
    /// Success.
    Ok = 0,
    /// No key registered for this host and port.
    NotFound = 1,
}

/// Reply to [`MacKeyRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacKeyReply {
    /// Outcome code.
    pub error_code: MacKeyErrorCode,
    /// Symmetric key bytes, empty on a miss.
    pub mac_key: Vec<u8>,
}

/// Register a symmetric packet-MAC key for `addr:port`. The service derives
/// the host id from the address with its own keyed hash; upsert semantics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacKeyRegister {
    /// Registrant host address bytes.
    pub addr: Vec<u8>,
    /// Registrant port.
    pub port: u16,
    /// Symmetric key to register.
    pub key: Vec<u8>,
}

/// Outcome codes for [`MacKeyRegister`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum MacKeyRegisterErrorCode {
    /// Success.
    Ok = 0,
    /// Registration failed.
    Failed = 1,
}

/// Reply to [`MacKeyRegister`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacKeyRegisterReply {
    /// Outcome code.
    pub error_code: MacKeyRegisterErrorCode,
}

/// Tagged union of every management-service message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MsMessage {
    /// EphID + certificate generation request.
    EphIdGenerationRequest(EphIdGenerationRequest),
    /// EphID + certificate generation reply.
    EphIdGenerationReply(EphIdGenerationReply),
    /// Certificate directory lookup.
    DnsRequest(DnsRequest),
    /// Certificate directory lookup reply.
    DnsReply(DnsReply),
    /// Certificate directory registration.
    DnsRegister(DnsRegister),
    /// Certificate directory registration reply.
    DnsRegisterReply(DnsRegisterReply),
    /// Reverse host-index lookup.
    SiphashToHostRequest(SiphashToHostRequest),
    /// Reverse host-index lookup reply.
    SiphashToHostReply(SiphashToHostReply),
    /// MAC-key directory lookup.
    MacKeyRequest(MacKeyRequest),
    /// MAC-key directory lookup reply.
    MacKeyReply(MacKeyReply),
    /// MAC-key directory registration.
    MacKeyRegister(MacKeyRegister),
    /// MAC-key directory registration reply.
    MacKeyRegisterReply(MacKeyRegisterReply),
}

/// Management-service datagram: correlation id plus one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsEnvelope {
    /// Caller-chosen correlation id, echoed in the reply.
    pub id: u64,
    /// The request or reply payload.
    pub msg: MsMessage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode, encode};

    #[test]
    fn ephid_generation_roundtrip() {
        let env = MsEnvelope {
            id: 7,
            msg: MsMessage::EphIdGenerationRequest(EphIdGenerationRequest {
                kind: EphIdKind::Session,
                addr: ServiceAddr { protocol: 17, addr: vec![10, 0, 0, 1] },
                pubkey: vec![0xab; 32],
            }),
        };
        let back: MsEnvelope = decode(&encode(&env).unwrap()).unwrap();
        assert_eq!(env, back);
    }

    #[test]
    fn error_codes_are_stable() {
        // Reply codes are part of the wire contract.
        assert_eq!(EphIdGenErrorCode::Ok as u8, 0);
        assert_eq!(EphIdGenErrorCode::HostIdGenerationFailed as u8, 1);
        assert_eq!(EphIdGenErrorCode::EncryptionFailed as u8, 2);
        assert_eq!(EphIdGenErrorCode::MacComputeFailed as u8, 3);
        assert_eq!(EphIdGenErrorCode::SigningFailed as u8, 4);
        assert_eq!(DnsErrorCode::NoEntries as u8, 1);
        assert_eq!(SiphashToHostErrorCode::NotFound as u8, 1);
        assert_eq!(MacKeyErrorCode::NotFound as u8, 1);
    }

    #[test]
    fn correlation_id_survives_roundtrip() {
        let env = MsEnvelope {
            id: u64::MAX,
            msg: MsMessage::MacKeyRequest(MacKeyRequest { host_id: vec![1, 2, 3], port: 4000 }),
        };
        let back: MsEnvelope = decode(&encode(&env).unwrap()).unwrap();
        assert_eq!(back.id, u64::MAX);
    }
}
