//! Request and accept flows of the subscribe handshake.
//!
//! Requester (`subscribe`):
//! 1. fetch the target's profile from the directory;
//! 2. mint a 32-byte session secret;
//! 3. seal `subscribe:<now>:<secret>` for the target's box key;
//! 4. POST it to the target's `/subscribe` with our onion in the `Peer` header;
//! 5. on 2xx, store the target as a peer holding the secret.
//!
//! Responder (`accept`):
//! 1. fetch the claimed sender's profile from the directory;
//! 2. open the envelope with the sender's box key and validate the payload;
//! 3. store the sender as a peer holding the secret it sent.
//!
//! Nothing is stored unless the whole flow succeeds, and nothing is retried
//! here.

use std::sync::Arc;

use tracing::{debug, info, warn};

use pub_crypto::address::validate_address;
use pub_crypto::rng::SharedRandom;

use crate::handshake::{self, unix_now, HandshakeError};
use crate::records::{Peer, PublicProfile, SelfIdentity, SessionSecret};
use crate::store::Store;
use crate::transport::{PeerDirectory, PeerTransport, PEER_HEADER, SUBSCRIBE_PATH};

/// Runs both roles of the handshake for the local identity.
pub struct SubscriptionService {
    identity: SelfIdentity,
    store: Arc<dyn Store>,
    directory: Arc<dyn PeerDirectory>,
    transport: Arc<dyn PeerTransport>,
    rng: SharedRandom,
}

impl SubscriptionService {
    pub fn new(
        identity: SelfIdentity,
        store: Arc<dyn Store>,
        directory: Arc<dyn PeerDirectory>,
        transport: Arc<dyn PeerTransport>,
        rng: SharedRandom,
    ) -> Self {
        Self {
            identity,
            store,
            directory,
            transport,
            rng,
        }
    }

    pub fn identity(&self) -> &SelfIdentity {
        &self.identity
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Subscribe to `onion`.
    pub async fn subscribe(&self, onion: &str) -> Result<Peer, HandshakeError> {
        self.subscribe_at(onion, unix_now()).await
    }

    /// Subscribe to `onion` with an explicit clock.
    pub async fn subscribe_at(&self, onion: &str, now_unix: i64) -> Result<Peer, HandshakeError> {
        validate_address(onion)?;

        let profile = self.resolve(onion).await?;
        let secret = SessionSecret::generate(self.rng.as_ref());
        let sealed = handshake::seal_request(
            &self.identity,
            &profile.box_key,
            &secret,
            now_unix,
            self.rng.as_ref(),
        )?;

        let resp = self
            .transport
            .post(
                onion,
                SUBSCRIBE_PATH,
                sealed,
                vec![(PEER_HEADER.to_string(), self.identity.onion().to_string())],
            )
            .await
            .map_err(|e| HandshakeError::PeerUnreachable(e.to_string()))?;

        if !resp.is_success() {
            warn!(peer = %onion, status = resp.status, "subscription rejected by peer");
            return Err(HandshakeError::SubscriptionRejected { status: resp.status });
        }

        let peer = Peer::subscribed(profile, secret);
        self.store.insert_peer(&peer).await?;
        info!(peer = %onion, "subscribed");
        Ok(peer)
    }

    /// Handle a subscribe request from `sender`.
    pub async fn accept(&self, sender: &str, sealed: &[u8]) -> Result<Peer, HandshakeError> {
        self.accept_at(sender, sealed, unix_now()).await
    }

    /// Handle a subscribe request with an explicit clock.
    pub async fn accept_at(
        &self,
        sender: &str,
        sealed: &[u8],
        now_unix: i64,
    ) -> Result<Peer, HandshakeError> {
        validate_address(sender)?;

        let profile = self.resolve(sender).await?;
        let secret = handshake::open_request(&self.identity, &profile.box_key, sealed, now_unix)
            .map_err(|e| {
                warn!(peer = %sender, error = %e, "rejected subscribe request");
                e
            })?;

        let peer = Peer::subscribed(profile, secret);
        self.store.insert_peer(&peer).await?;
        info!(peer = %sender, "accepted subscriber");
        Ok(peer)
    }

    /// Fetch a profile and check it describes the address we asked about.
    async fn resolve(&self, onion: &str) -> Result<PublicProfile, HandshakeError> {
        let profile = self.directory.fetch_info(onion).await.map_err(|e| {
            debug!(peer = %onion, error = %e, "peer info lookup failed");
            HandshakeError::PeerUnreachable(e.to_string())
        })?;

        if profile.onion != onion {
            return Err(HandshakeError::PeerUnreachable(format!(
                "peer info for {} describes {}",
                onion, profile.onion
            )));
        }
        Ok(profile)
    }
}
