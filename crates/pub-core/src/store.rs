//! Storage abstraction for the local identity and known peers.
//!
//! This module defines the `Store` trait and an in-memory implementation used
//! by tests and the loopback harness. The persistent backend lives in
//! [`crate::sqlite_store`].

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::records::{Peer, SelfIdentity};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during store operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("record already exists: {0}")]
    AlreadyExists(String),

    #[error("storage operation failed: {0}")]
    OperationFailed(String),

    #[error("data corruption detected: {0}")]
    DataCorruption(String),
}

// ============================================================================
// Store Trait
// ============================================================================

/// Persistence for the single self record and the peer table.
///
/// Peers are keyed by onion address. Inserting a peer whose onion is already
/// stored replaces the previous record.
#[async_trait]
pub trait Store: Send + Sync {
    /// Persist the self identity. Fails with `AlreadyExists` if one is stored.
    async fn create_self(&self, identity: &SelfIdentity) -> Result<(), StoreError>;

    /// Load the self identity. Fails with `NotFound` before `create_self`.
    async fn get_self(&self) -> Result<SelfIdentity, StoreError>;

    /// Insert or replace a peer.
    async fn insert_peer(&self, peer: &Peer) -> Result<(), StoreError>;

    async fn get_peer(&self, onion: &str) -> Result<Option<Peer>, StoreError>;

    /// All peers, ordered by onion address.
    async fn list_peers(&self) -> Result<Vec<Peer>, StoreError>;
}

// ============================================================================
// In-Memory Store Implementation
// ============================================================================

/// In-memory store for testing and ephemeral nodes.
#[derive(Default)]
pub struct InMemoryStore {
    identity: RwLock<Option<SelfIdentity>>,
    peers: RwLock<HashMap<String, Peer>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_self(&self, identity: &SelfIdentity) -> Result<(), StoreError> {
        let mut slot = self.identity.write().await;
        if let Some(existing) = slot.as_ref() {
            return Err(StoreError::AlreadyExists(existing.onion().to_string()));
        }
        *slot = Some(identity.clone());
        Ok(())
    }

    async fn get_self(&self) -> Result<SelfIdentity, StoreError> {
        self.identity
            .read()
            .await
            .clone()
            .ok_or_else(|| StoreError::NotFound("self".to_string()))
    }

    async fn insert_peer(&self, peer: &Peer) -> Result<(), StoreError> {
        self.peers
            .write()
            .await
            .insert(peer.onion().to_string(), peer.clone());
        Ok(())
    }

    async fn get_peer(&self, onion: &str) -> Result<Option<Peer>, StoreError> {
        Ok(self.peers.read().await.get(onion).cloned())
    }

    async fn list_peers(&self) -> Result<Vec<Peer>, StoreError> {
        let mut peers: Vec<Peer> = self.peers.read().await.values().cloned().collect();
        peers.sort_by(|a, b| a.onion().cmp(b.onion()));
        Ok(peers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{PublicProfile, SessionSecret};
    use pub_crypto::address::OnionScheme;
    use pub_crypto::rng::OsRandom;

    fn make_peer(onion: &str, name: &str, secret: u8) -> Peer {
        Peer::subscribed(
            PublicProfile {
                onion: onion.to_string(),
                name: name.to_string(),
                about: String::new(),
                box_key: vec![1; 32],
                sign_key: vec![2; 32],
            },
            SessionSecret::new([secret; 32]),
        )
    }

    #[tokio::test]
    async fn test_self_create_once() {
        let store = InMemoryStore::new();
        assert!(matches!(store.get_self().await, Err(StoreError::NotFound(_))));

        let me = SelfIdentity::generate("me", "", OnionScheme::Ed25519V3, &OsRandom).unwrap();
        store.create_self(&me).await.unwrap();
        assert_eq!(store.get_self().await.unwrap().onion(), me.onion());

        let other = SelfIdentity::generate("other", "", OnionScheme::Ed25519V3, &OsRandom).unwrap();
        assert!(matches!(
            store.create_self(&other).await,
            Err(StoreError::AlreadyExists(_))
        ));
        assert_eq!(store.get_self().await.unwrap().onion(), me.onion());
    }

    #[tokio::test]
    async fn test_peer_upsert_last_writer_wins() {
        let store = InMemoryStore::new();
        store.insert_peer(&make_peer("aaaaaaaaaaaaaaaa", "first", 1)).await.unwrap();
        store.insert_peer(&make_peer("aaaaaaaaaaaaaaaa", "second", 2)).await.unwrap();

        let peers = store.list_peers().await.unwrap();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].profile.name, "second");
        assert_eq!(peers[0].secret_auth_key, Some(SessionSecret::new([2; 32])));
    }

    #[tokio::test]
    async fn test_list_peers_sorted() {
        let store = InMemoryStore::new();
        store.insert_peer(&make_peer("cccccccccccccccc", "c", 3)).await.unwrap();
        store.insert_peer(&make_peer("aaaaaaaaaaaaaaaa", "a", 1)).await.unwrap();
        store.insert_peer(&make_peer("bbbbbbbbbbbbbbbb", "b", 2)).await.unwrap();

        let names: Vec<_> = store
            .list_peers()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.profile.name)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(store.get_peer("dddddddddddddddd").await.unwrap().is_none());
    }
}
