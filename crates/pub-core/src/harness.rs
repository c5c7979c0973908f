//! Test harness.
//!
//! [`LoopbackNetwork`] wires any number of in-process nodes together: it is
//! both the peer directory and the transport, and delivers `/subscribe`
//! requests straight into the target node's accept flow.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use tokio::sync::RwLock;

use pub_crypto::rng::{SecureRandom, SharedRandom};

use crate::handshake::{unix_now, HandshakeError};
use crate::records::{Peer, PublicProfile, SelfIdentity};
use crate::store::{InMemoryStore, Store, StoreError};
use crate::subscription::SubscriptionService;
use crate::transport::{
    PeerDirectory, PeerTransport, TransportError, TransportResponse, PEER_HEADER, SUBSCRIBE_PATH,
};

/// Reproducible random source (xorshift64*). Never use outside tests.
pub struct DeterministicRandom(Mutex<u64>);

impl DeterministicRandom {
    pub fn new(seed: u64) -> Self {
        // xorshift has a fixed point at zero.
        Self(Mutex::new(seed | 1))
    }

    pub fn shared(seed: u64) -> SharedRandom {
        Arc::new(Self::new(seed))
    }
}

impl SecureRandom for DeterministicRandom {
    fn fill_bytes(&self, dest: &mut [u8]) {
        let mut state = match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for chunk in dest.chunks_mut(8) {
            let mut x = *state;
            x ^= x >> 12;
            x ^= x << 25;
            x ^= x >> 27;
            *state = x;
            let out = x.wrapping_mul(0x2545_F491_4F6C_DD1D).to_le_bytes();
            chunk.copy_from_slice(&out[..chunk.len()]);
        }
    }
}

/// A node attached to a [`LoopbackNetwork`].
pub struct LoopbackNode {
    pub service: Arc<SubscriptionService>,
    pub store: Arc<InMemoryStore>,
}

impl LoopbackNode {
    pub fn onion(&self) -> &str {
        self.service.identity().onion()
    }
}

/// In-memory network of nodes.
#[derive(Default)]
pub struct LoopbackNetwork {
    nodes: RwLock<HashMap<String, Weak<SubscriptionService>>>,
    published: RwLock<HashMap<String, PublicProfile>>,
    clock: Mutex<Option<i64>>,
}

impl LoopbackNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attach a node with a fresh in-memory store.
    pub async fn add_node(
        self: &Arc<Self>,
        identity: SelfIdentity,
        rng: SharedRandom,
    ) -> Result<LoopbackNode, StoreError> {
        let store = Arc::new(InMemoryStore::new());
        store.create_self(&identity).await?;

        let onion = identity.onion().to_string();
        let service = Arc::new(SubscriptionService::new(
            identity,
            store.clone(),
            self.clone(),
            self.clone(),
            rng,
        ));
        self.nodes
            .write()
            .await
            .insert(onion, Arc::downgrade(&service));

        Ok(LoopbackNode { service, store })
    }

    /// Serve `profile` at `/info` for `onion` instead of the node's own.
    pub async fn publish_profile(&self, onion: &str, profile: PublicProfile) {
        self.published
            .write()
            .await
            .insert(onion.to_string(), profile);
    }

    /// Pin the clock responders use. `None` restores wall-clock time.
    pub fn set_clock(&self, now_unix: Option<i64>) {
        match self.clock.lock() {
            Ok(mut guard) => *guard = now_unix,
            Err(poisoned) => *poisoned.into_inner() = now_unix,
        }
    }

    fn now(&self) -> i64 {
        let pinned = match self.clock.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        };
        pinned.unwrap_or_else(unix_now)
    }

    async fn node(&self, onion: &str) -> Result<Arc<SubscriptionService>, TransportError> {
        self.nodes
            .read()
            .await
            .get(onion)
            .and_then(Weak::upgrade)
            .ok_or_else(|| TransportError::Connect(format!("no route to {}", onion)))
    }
}

/// Run a full subscribe from `requester` to `responder`.
///
/// Returns the requester's record of the responder and the responder's
/// stored record of the requester.
pub async fn run_subscribe_flow(
    requester: &LoopbackNode,
    responder: &LoopbackNode,
) -> Result<(Peer, Peer), HandshakeError> {
    let outbound = requester.service.subscribe(responder.onion()).await?;
    let inbound = responder
        .store
        .get_peer(requester.onion())
        .await?
        .ok_or_else(|| StoreError::NotFound(requester.onion().to_string()))?;
    Ok((outbound, inbound))
}

fn json_response(status: u16, value: &impl serde::Serialize) -> TransportResponse {
    TransportResponse {
        status,
        body: serde_json::to_vec(value).unwrap_or_default(),
    }
}

#[async_trait]
impl PeerDirectory for LoopbackNetwork {
    async fn fetch_info(&self, onion: &str) -> Result<PublicProfile, TransportError> {
        if let Some(profile) = self.published.read().await.get(onion) {
            return Ok(profile.clone());
        }
        let node = self.node(onion).await?;
        Ok(node.identity().profile().clone())
    }
}

#[async_trait]
impl PeerTransport for LoopbackNetwork {
    async fn post(
        &self,
        onion: &str,
        path: &str,
        body: Vec<u8>,
        headers: Vec<(String, String)>,
    ) -> Result<TransportResponse, TransportError> {
        let node = self.node(onion).await?;
        if path != SUBSCRIBE_PATH {
            return Ok(json_response(404, &serde_json::json!({ "error": "not found" })));
        }

        let sender = headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(PEER_HEADER))
            .map(|(_, value)| value.clone());
        let Some(sender) = sender else {
            return Ok(json_response(400, &serde_json::json!({ "error": "missing Peer header" })));
        };

        match node.accept_at(&sender, &body, self.now()).await {
            Ok(peer) => Ok(json_response(200, &peer.profile)),
            Err(e) => Ok(json_response(
                e.status_code(),
                &serde_json::json!({ "error": e.public_reason() }),
            )),
        }
    }
}
