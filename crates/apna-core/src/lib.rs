//! APNA protocol core logic.
//!
//! Pure protocol logic, decoupled from I/O. The directory service is a
//! request-to-reply function over in-memory registries; the handshake is a
//! pair of sans-IO state machines whose transitions consume packets and
//! produce packets or typed events. A runtime (the `apna-client` and
//! `apna-server` crates) owns the sockets and drives these machines.
//!
//! # Components
//!
//! - [`directory`]: the management authority's registries (certificate
//!   directory, MAC-key directory, reverse host index) and its
//!   request/reply dispatch.
//! - [`handshake`]: the 4-phase session handshake establishing control-
//!   and session-level shared secrets between two endpoints, plus the
//!   steady-state session table.
//! - [`config`]: the keyed configuration blob and its conversion into
//!   validated, typed key material.
//!
//! Registries live in a single [`directory::DirectoryService`] instance
//! constructed at startup; there is no ambient global state, and
//! registries are rebuilt empty on every boot.

pub mod config;
pub mod directory;
pub mod handshake;

pub use config::{ConfigError, MsConfig, MsKeys};
pub use directory::DirectoryService;
pub use handshake::{
    HandshakeError, Initiator, InitiatorEvent, PendingOffer, Responder, ResponderEvent, Session,
    SessionKey,
};
