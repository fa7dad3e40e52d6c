//! Management-service connector.
//!
//! One UDP socket serves any number of concurrent requests: each request
//! draws a fresh correlation id from an atomic counter and parks a oneshot
//! sender in the pending table; a background receive task decodes inbound
//! envelopes and completes the matching oneshot. Replies for unknown ids
//! (duplicates, latecomers) are logged and dropped.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use apna_crypto::{Certificate, HostId, MacKey};
use apna_proto::ms::{
    DnsErrorCode, DnsRegister, DnsRegisterErrorCode, DnsRequest, EphIdGenErrorCode,
    EphIdGenerationRequest, EphIdKind, MacKeyErrorCode, MacKeyRegister, MacKeyRegisterErrorCode,
    MacKeyRequest, ServiceAddr, SiphashToHostErrorCode, SiphashToHostRequest,
};
use apna_proto::{MAX_MSG_SIZE, MsEnvelope, MsMessage};
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::ClientError;

type PendingMap = Mutex<HashMap<u64, oneshot::Sender<MsMessage>>>;

/// Async connector to the management service.
pub struct MsConnector {
    socket: Arc<UdpSocket>,
    next_id: AtomicU64,
    pending: Arc<PendingMap>,
}

impl MsConnector {
    /// Bind an ephemeral local socket, connect it to the service address,
    /// and spawn the receive task.
    pub async fn connect(ms_addr: SocketAddr) -> Result<Arc<Self>, ClientError> {
        let bind_addr = if ms_addr.is_ipv4() {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)
        } else {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0)
        };
        let socket = Arc::new(UdpSocket::bind(bind_addr).await?);
        socket.connect(ms_addr).await?;

        let connector = Arc::new(Self {
            socket: Arc::clone(&socket),
            next_id: AtomicU64::new(1),
            pending: Arc::new(Mutex::new(HashMap::new())),
        });
        tokio::spawn(recv_loop(socket, Arc::clone(&connector.pending)));
        Ok(connector)
    }

    /// Send one request and await its correlated reply.
    pub async fn request(&self, msg: MsMessage) -> Result<MsMessage, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().map_err(|_| ClientError::ConnectorClosed)?;
            pending.insert(id, tx);
        }
        let raw = apna_proto::encode(&MsEnvelope { id, msg })?;
        if let Err(err) = self.socket.send(&raw).await {
            if let Ok(mut pending) = self.pending.lock() {
                pending.remove(&id);
            }
            return Err(err.into());
        }
        rx.await.map_err(|_| ClientError::ConnectorClosed)
    }

    /// Mint an EphID plus certificate bound to `pubkey`.
    pub async fn generate_ephid(
        &self,
        kind: EphIdKind,
        addr: ServiceAddr,
        pubkey: &[u8],
    ) -> Result<Certificate, ClientError> {
        let msg = MsMessage::EphIdGenerationRequest(EphIdGenerationRequest {
            kind,
            addr,
            pubkey: pubkey.to_vec(),
        });
        match self.request(msg).await? {
            MsMessage::EphIdGenerationReply(reply) => match reply.error_code {
                EphIdGenErrorCode::Ok => Ok(Certificate::from_bytes(&reply.cert)?),
                code => Err(ClientError::Generation(code)),
            },
            _ => Err(ClientError::UnexpectedReply),
        }
    }

    /// Resolve the certificate registered for a service address.
    pub async fn dns_lookup(&self, addr: ServiceAddr) -> Result<Certificate, ClientError> {
        match self.request(MsMessage::DnsRequest(DnsRequest { addr })).await? {
            MsMessage::DnsReply(reply) => match reply.error_code {
                DnsErrorCode::Ok => Ok(Certificate::from_bytes(&reply.cert)?),
                DnsErrorCode::NoEntries => Err(ClientError::UnknownServiceAddress),
            },
            _ => Err(ClientError::UnexpectedReply),
        }
    }

    /// Publish a certificate under a service address.
    pub async fn dns_register(
        &self,
        addr: ServiceAddr,
        cert: &Certificate,
    ) -> Result<(), ClientError> {
        let msg =
            MsMessage::DnsRegister(DnsRegister { addr, cert: cert.to_bytes().to_vec() });
        match self.request(msg).await? {
            MsMessage::DnsRegisterReply(reply) => match reply.error_code {
                DnsRegisterErrorCode::Ok => Ok(()),
                DnsRegisterErrorCode::Failed => Err(ClientError::RegistrationFailed),
            },
            _ => Err(ClientError::UnexpectedReply),
        }
    }

    /// Register the packet-MAC key for `addr:port`.
    pub async fn mac_key_register(
        &self,
        addr: Vec<u8>,
        port: u16,
        key: &MacKey,
    ) -> Result<(), ClientError> {
        let msg = MsMessage::MacKeyRegister(MacKeyRegister {
            addr,
            port,
            key: key.as_bytes().to_vec(),
        });
        match self.request(msg).await? {
            MsMessage::MacKeyRegisterReply(reply) => match reply.error_code {
                MacKeyRegisterErrorCode::Ok => Ok(()),
                MacKeyRegisterErrorCode::Failed => Err(ClientError::RegistrationFailed),
            },
            _ => Err(ClientError::UnexpectedReply),
        }
    }

    /// Resolve the packet-MAC key registered for `host_id:port`.
    pub async fn mac_key_lookup(
        &self,
        host_id: HostId,
        port: u16,
    ) -> Result<MacKey, ClientError> {
        let msg = MsMessage::MacKeyRequest(MacKeyRequest {
            host_id: host_id.as_bytes().to_vec(),
            port,
        });
        match self.request(msg).await? {
            MsMessage::MacKeyReply(reply) => match reply.error_code {
                MacKeyErrorCode::Ok => Ok(MacKey::new(reply.mac_key)),
                MacKeyErrorCode::NotFound => Err(ClientError::UnknownHostId),
            },
            _ => Err(ClientError::UnexpectedReply),
        }
    }

    /// Resolve a host id back to the address it was derived from.
    pub async fn host_lookup(&self, host_id: HostId) -> Result<Vec<u8>, ClientError> {
        let msg = MsMessage::SiphashToHostRequest(SiphashToHostRequest {
            siphash: host_id.as_bytes().to_vec(),
        });
        match self.request(msg).await? {
            MsMessage::SiphashToHostReply(reply) => match reply.error_code {
                SiphashToHostErrorCode::Ok => Ok(reply.host),
                SiphashToHostErrorCode::NotFound => Err(ClientError::UnknownHostId),
            },
            _ => Err(ClientError::UnexpectedReply),
        }
    }
}

/// Receive task: route each inbound envelope to the oneshot parked under
/// its correlation id. Exits when the socket errors or the connector is
/// dropped (pending table unreachable).
async fn recv_loop(socket: Arc<UdpSocket>, pending: Arc<PendingMap>) {
    let mut buf = vec![0u8; MAX_MSG_SIZE];
    loop {
        let len = match socket.recv(&mut buf).await {
            Ok(len) => len,
            Err(err) => {
                warn!(%err, "connector socket closed");
                return;
            },
        };
        let envelope: MsEnvelope = match apna_proto::decode(&buf[..len]) {
            Ok(env) => env,
            Err(err) => {
                warn!(%err, "dropping undecodable reply");
                continue;
            },
        };
        let waiter = match pending.lock() {
            Ok(mut pending) => pending.remove(&envelope.id),
            Err(_) => return,
        };
        match waiter {
            Some(tx) => {
                // A dropped receiver means the caller gave up; nothing to do.
                let _ = tx.send(envelope.msg);
            },
            None => debug!(id = envelope.id, "dropping reply with no waiter"),
        }
    }
}

impl std::fmt::Debug for MsConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MsConnector")
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}
