//! Border-element forwarding pipeline.
//!
//! Four stages, each an independent task, linked by bounded queues:
//!
//! ```text
//! receive --> verify --> resolve --> send
//! ```
//!
//! - **receive** reads datagrams and decodes packets;
//! - **verify** decrypts the sender's EphID, resolves the packet-MAC key
//!   for `hostID:port` (local cache, then directory), and checks the wire
//!   MAC;
//! - **resolve** decrypts the destination EphID and resolves the real host
//!   address through the reverse index (cache, then directory);
//! - **send** writes the packet to `host:port`.
//!
//! No shared mutable state crosses a stage boundary except through the
//! queues; each stage processes one packet at a time, so per-queue order is
//! preserved. A full queue stalls the producer, which is the only
//! backpressure. Any per-packet failure is logged and the packet dropped;
//! the pipeline never halts on a bad packet. Caches have no eviction: an
//! entry is trusted for the process lifetime.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use apna_client::MsConnector;
use apna_core::MsKeys;
use apna_crypto::{EphId, HostId, MacKey, verify_and_decrypt, verify_packet_mac};
use apna_proto::{MAX_MSG_SIZE, Pkt};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Bounded capacity of every inter-stage queue.
pub const QUEUE_CAPACITY: usize = 16;

/// The border element.
#[derive(Debug)]
pub struct Forwarder {
    keys: MsKeys,
    connector: Arc<MsConnector>,
    socket: Arc<UdpSocket>,
}

impl Forwarder {
    /// Bind the data-plane socket.
    ///
    /// `keys` is the management service's key material: the forwarder
    /// shares the identifier keys so it can decrypt EphIDs locally instead
    /// of round-tripping to the service per packet.
    pub async fn bind(
        addr: SocketAddr,
        keys: MsKeys,
        connector: Arc<MsConnector>,
    ) -> std::io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!(addr = %socket.local_addr()?, "forwarder listening");
        Ok(Self { keys, connector, socket })
    }

    /// The bound socket address.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Run the pipeline until the socket fails.
    pub async fn run(self) {
        let (verify_tx, verify_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (resolve_tx, resolve_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (send_tx, send_rx) = mpsc::channel(QUEUE_CAPACITY);

        let receive = tokio::spawn(receive_stage(Arc::clone(&self.socket), verify_tx));
        let verify = tokio::spawn(verify_stage(
            self.keys.clone(),
            Arc::clone(&self.connector),
            verify_rx,
            resolve_tx,
        ));
        let resolve =
            tokio::spawn(resolve_stage(self.keys, self.connector, resolve_rx, send_tx));
        let send = tokio::spawn(send_stage(self.socket, send_rx));

        let _ = tokio::join!(receive, verify, resolve, send);
    }
}

/// Stage 1: datagram in, decoded packet out.
async fn receive_stage(socket: Arc<UdpSocket>, tx: mpsc::Sender<Pkt>) {
    let mut buf = vec![0u8; MAX_MSG_SIZE];
    loop {
        let len = match socket.recv_from(&mut buf).await {
            Ok((len, _)) => len,
            Err(err) => {
                warn!(%err, "receive stage: socket error, shutting down");
                return;
            },
        };
        let pkt: Pkt = match apna_proto::decode(&buf[..len]) {
            Ok(pkt) => pkt,
            Err(err) => {
                warn!(%err, "dropping undecodable packet");
                continue;
            },
        };
        if tx.send(pkt).await.is_err() {
            return;
        }
    }
}

/// Resolve the packet-MAC key for `hostID:port`: local cache first, then
/// the directory.
async fn mac_key_for(
    cache: &mut HashMap<(HostId, u16), MacKey>,
    connector: &MsConnector,
    host_id: HostId,
    port: u16,
) -> Option<MacKey> {
    if let Some(key) = cache.get(&(host_id, port)) {
        return Some(key.clone());
    }
    match connector.mac_key_lookup(host_id, port).await {
        Ok(key) => {
            cache.insert((host_id, port), key.clone());
            Some(key)
        },
        Err(err) => {
            warn!(%err, ?host_id, port, "MAC key resolution failed");
            None
        },
    }
}

/// Stage 2: enforce the wire MAC under the sender's registered key.
async fn verify_stage(
    keys: MsKeys,
    connector: Arc<MsConnector>,
    mut rx: mpsc::Receiver<Pkt>,
    tx: mpsc::Sender<Pkt>,
) {
    let mut cache: HashMap<(HostId, u16), MacKey> = HashMap::new();
    while let Some(pkt) = rx.recv().await {
        let sender = match EphId::from_slice(&pkt.local_ephid) {
            Ok(ephid) => ephid,
            Err(err) => {
                warn!(%err, "dropping packet with malformed sender EphID");
                continue;
            },
        };
        let hid = match verify_and_decrypt(&sender, &keys.aes, &keys.hmac) {
            Ok(hid) => hid,
            Err(err) => {
                warn!(%err, "dropping packet with unverifiable sender EphID");
                continue;
            },
        };
        let Some(mac_key) =
            mac_key_for(&mut cache, &connector, hid.host_id(), pkt.local_port).await
        else {
            continue;
        };
        if let Err(err) = verify_packet_mac(&mac_key, &pkt.mac_input(), &pkt.packet_mac) {
            warn!(%err, "dropping packet with bad wire MAC");
            continue;
        }
        if tx.send(pkt).await.is_err() {
            return;
        }
    }
}

/// Resolve a destination host id to its address: cache, then the reverse
/// index.
async fn host_for(
    cache: &mut HashMap<HostId, Vec<u8>>,
    connector: &MsConnector,
    host_id: HostId,
) -> Option<Vec<u8>> {
    if let Some(host) = cache.get(&host_id) {
        return Some(host.clone());
    }
    match connector.host_lookup(host_id).await {
        Ok(host) => {
            cache.insert(host_id, host.clone());
            Some(host)
        },
        Err(err) => {
            warn!(%err, ?host_id, "host resolution failed");
            None
        },
    }
}

/// Stage 3: decrypt the destination EphID and resolve the real endpoint.
async fn resolve_stage(
    keys: MsKeys,
    connector: Arc<MsConnector>,
    mut rx: mpsc::Receiver<Pkt>,
    tx: mpsc::Sender<(Pkt, SocketAddr)>,
) {
    let mut cache: HashMap<HostId, Vec<u8>> = HashMap::new();
    while let Some(pkt) = rx.recv().await {
        let dest = match EphId::from_slice(&pkt.remote_ephid) {
            Ok(ephid) => ephid,
            Err(err) => {
                warn!(%err, "dropping packet with malformed destination EphID");
                continue;
            },
        };
        let hid = match verify_and_decrypt(&dest, &keys.aes, &keys.hmac) {
            Ok(hid) => hid,
            Err(err) => {
                warn!(%err, "dropping packet with unverifiable destination EphID");
                continue;
            },
        };
        let Some(host) = host_for(&mut cache, &connector, hid.host_id()).await else {
            continue;
        };
        let octets: [u8; 4] = match host.as_slice().try_into() {
            Ok(octets) => octets,
            Err(_) => {
                warn!(len = host.len(), "dropping packet with non-IPv4 host address");
                continue;
            },
        };
        let dst = SocketAddr::new(IpAddr::V4(Ipv4Addr::from(octets)), pkt.remote_port);
        if tx.send((pkt, dst)).await.is_err() {
            return;
        }
    }
}

/// Stage 4: write verified packets to their resolved endpoints.
async fn send_stage(socket: Arc<UdpSocket>, mut rx: mpsc::Receiver<(Pkt, SocketAddr)>) {
    while let Some((pkt, dst)) = rx.recv().await {
        let raw = match apna_proto::encode(&pkt) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(%err, "failed to re-encode packet");
                continue;
            },
        };
        match socket.send_to(&raw, dst).await {
            Ok(sent) if sent == raw.len() => {
                debug!(%dst, len = sent, "packet forwarded");
            },
            Ok(sent) => {
                warn!(%dst, expected = raw.len(), got = sent, "short send");
            },
            Err(err) => {
                warn!(%err, %dst, "send failed");
            },
        }
    }
}
