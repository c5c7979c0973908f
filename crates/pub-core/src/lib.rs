//! pub core - identity records, storage and the subscribe handshake.
//!
//! This crate implements:
//! - Self and Peer records
//! - The subscribe handshake (request and accept flows)
//! - Persistent storage abstraction
//! - Network seams for peer info lookup and request delivery

#![forbid(unsafe_code)]

// Protocol
pub mod handshake;
pub mod subscription;

// Records and infrastructure
pub mod records;
pub mod store;
pub mod transport;

// Supporting modules
pub mod harness;

// Optional transport implementations
#[cfg(feature = "tor-client")]
pub mod onion_client;

// Optional storage implementations
#[cfg(feature = "sqlite")]
pub mod sqlite_store;

pub use handshake::HandshakeError;
pub use records::{Peer, PublicProfile, SelfIdentity, SessionSecret};
pub use store::{InMemoryStore, Store, StoreError};
pub use subscription::SubscriptionService;
pub use transport::{PeerDirectory, PeerTransport, TransportError, TransportResponse};
