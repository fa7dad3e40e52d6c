//! Management-service daemon loop.
//!
//! One UDP socket, one request at a time: each datagram is decoded,
//! dispatched through the directory service, and the reply (if any) sent
//! back to the requester. Serializing requests keeps every registry
//! operation atomic without locks.

use std::net::SocketAddr;

use apna_core::DirectoryService;
use apna_proto::MAX_MSG_SIZE;
use tokio::net::UdpSocket;
use tracing::{info, warn};

/// The management-service daemon.
#[derive(Debug)]
pub struct MsServer {
    socket: UdpSocket,
    service: DirectoryService,
}

impl MsServer {
    /// Bind the service socket.
    pub async fn bind(addr: SocketAddr, service: DirectoryService) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        info!(addr = %socket.local_addr()?, "management service listening");
        Ok(Self { socket, service })
    }

    /// The bound socket address.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Serve requests forever. Undecodable datagrams and non-requests are
    /// dropped; a single bad datagram never halts the loop.
    pub async fn serve(mut self) -> std::io::Result<()> {
        let mut buf = vec![0u8; MAX_MSG_SIZE];
        loop {
            let (len, peer) = self.socket.recv_from(&mut buf).await?;
            let Some(reply) = self.service.handle_datagram(&buf[..len]) else {
                continue;
            };
            if let Err(err) = self.socket.send_to(&reply, peer).await {
                warn!(%err, %peer, "failed to send reply");
            }
        }
    }
}
