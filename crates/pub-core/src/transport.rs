//! Network seams used by the handshake.
//!
//! The core never opens sockets itself. It asks a [`PeerDirectory`] for a
//! peer's published profile and hands sealed bytes to a [`PeerTransport`].

use async_trait::async_trait;

use crate::records::PublicProfile;

/// Header carrying the requester's own onion address.
pub const PEER_HEADER: &str = "Peer";

/// Path of the responder's subscribe endpoint.
pub const SUBSCRIBE_PATH: &str = "/subscribe";

/// Path of the public profile endpoint.
pub const INFO_PATH: &str = "/info";

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request timed out")]
    Timeout,
    #[error("bad response: {0}")]
    BadResponse(String),
}

/// Status and body returned by a peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Resolves a peer's current public profile.
#[async_trait]
pub trait PeerDirectory: Send + Sync {
    async fn fetch_info(&self, onion: &str) -> Result<PublicProfile, TransportError>;
}

/// Delivers a request body to a peer.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn post(
        &self,
        onion: &str,
        path: &str,
        body: Vec<u8>,
        headers: Vec<(String, String)>,
    ) -> Result<TransportResponse, TransportError>;
}
