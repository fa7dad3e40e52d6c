//! APNA endpoint runtime: the management-service connector and the driver
//! that runs handshakes over UDP.
//!
//! The protocol logic lives in `apna-core` as sans-IO state machines; this
//! crate owns the sockets. [`MsConnector`] multiplexes concurrent
//! request/reply exchanges with the management service over one UDP socket,
//! matching replies to requests by correlation id. [`Endpoint`] registers an
//! identity (control EphID certificate, directory entry, packet-MAC key) and
//! drives the handshake machines against a peer.

mod connector;
mod endpoint;
mod error;

pub use connector::MsConnector;
pub use endpoint::{Endpoint, EndpointConfig};
pub use error::ClientError;
