//! APNA server runtimes: the management-service daemon and the border
//! element.
//!
//! - [`ms`]: a UDP request/reply loop around the pure
//!   `apna_core::DirectoryService` dispatch.
//! - [`forwarder`]: the border element's four-stage pipeline
//!   (receive, verify, resolve, send) over bounded queues. It shares the
//!   management service's identifier keys so it can decrypt destination
//!   EphIDs locally, and falls back to directory lookups (with local
//!   caches) for MAC keys and host addresses.

pub mod forwarder;
pub mod ms;

pub use forwarder::Forwarder;
pub use ms::MsServer;
