//! Wire format for the APNA protocol.
//!
//! Two message families share one CBOR codec:
//!
//! - [`ms`]: the management-service request/reply protocol. Every request
//!   carries a caller-chosen `u64` correlation id that the service echoes in
//!   the reply, so one socket can serve many concurrent requests.
//! - [`pkt`]: the data-plane packet exchanged between APNA endpoints and
//!   relayed by the border element. Hosts are addressed by encrypted
//!   ephemeral identifiers (EphIDs); the packet body is a tagged union
//!   keyed by the handshake phase.
//!
//! Field layouts round-trip exactly; the byte-level framing is CBOR and is
//! not part of the protocol contract. Raw byte fields (EphIDs, public keys,
//! certificates) are carried as opaque `Vec<u8>` here and given typed
//! interpretations in higher layers.

pub mod codec;
pub mod errors;
pub mod ms;
pub mod pkt;

pub use codec::{MAX_MSG_SIZE, decode, encode};
pub use errors::{ProtocolError, Result};
pub use ms::{MsEnvelope, MsMessage};
pub use pkt::{NextHeader, Pkt, PktBody};
