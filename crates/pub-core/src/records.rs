//! Identity records.
//!
//! [`SelfIdentity`] is the local node: a [`PublicProfile`] plus the private
//! halves of its keys. [`Peer`] is a remote node known locally: its public
//! profile plus the session secret agreed during the subscribe handshake.
//!
//! Only [`PublicProfile`] implements `Serialize`. Neither record type can be
//! serialized directly, so private keys and session secrets cannot leak
//! through a JSON response.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use pub_crypto::address::{format_private_key_for_transport, AddressError, OnionScheme};
use pub_crypto::envelope::{self, EnvelopeError};
use pub_crypto::identity::{self, IdentityError, IdentityKeys};
use pub_crypto::rng::SecureRandom;

/// Length of the handshake session secret.
pub const SESSION_SECRET_LEN: usize = 32;

/// The 32-byte secret shared by both sides of a subscription.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionSecret([u8; SESSION_SECRET_LEN]);

impl SessionSecret {
    pub fn new(bytes: [u8; SESSION_SECRET_LEN]) -> Self {
        Self(bytes)
    }

    /// Draw a fresh secret from `rng`.
    pub fn generate(rng: &dyn SecureRandom) -> Self {
        let mut bytes = [0u8; SESSION_SECRET_LEN];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Returns `None` unless `bytes` is exactly 32 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; SESSION_SECRET_LEN] {
        &self.0
    }
}

impl fmt::Debug for SessionSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionSecret(..)")
    }
}

/// Profile fields a node publishes at `/info`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicProfile {
    pub onion: String,
    pub name: String,
    pub about: String,
    /// X25519 public key for sealed envelopes.
    #[serde(with = "base64_bytes")]
    pub box_key: Vec<u8>,
    /// Ed25519 public key for content signatures.
    #[serde(with = "base64_bytes")]
    pub sign_key: Vec<u8>,
}

/// A remote node with an established subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Peer {
    pub profile: PublicProfile,
    /// Local-only; never part of any serialized form.
    pub secret_auth_key: Option<SessionSecret>,
}

impl Peer {
    /// Build the record written at the end of a successful handshake.
    pub fn subscribed(profile: PublicProfile, secret: SessionSecret) -> Self {
        Self {
            profile,
            secret_auth_key: Some(secret),
        }
    }

    pub fn onion(&self) -> &str {
        &self.profile.onion
    }
}

/// The local identity.
#[derive(Clone)]
pub struct SelfIdentity {
    profile: PublicProfile,
    scheme: OnionScheme,
    private_onion_key: Zeroizing<Vec<u8>>,
    private_box_key: Zeroizing<Vec<u8>>,
    private_sign_key: Zeroizing<Vec<u8>>,
}

impl SelfIdentity {
    /// Generate a brand new identity. Persisting it is the caller's job.
    pub fn generate(
        name: impl Into<String>,
        about: impl Into<String>,
        scheme: OnionScheme,
        rng: &dyn SecureRandom,
    ) -> Result<Self, IdentityError> {
        let keys = identity::generate(scheme, rng)?;
        Ok(Self::from_generated(name, about, keys))
    }

    /// Wrap freshly generated key material.
    pub fn from_generated(name: impl Into<String>, about: impl Into<String>, keys: IdentityKeys) -> Self {
        Self {
            profile: PublicProfile {
                onion: keys.onion,
                name: name.into(),
                about: about.into(),
                box_key: keys.encryption.public,
                sign_key: keys.signing.public,
            },
            scheme: keys.scheme,
            private_onion_key: keys.rendezvous.private,
            private_box_key: keys.encryption.private,
            private_sign_key: keys.signing.private,
        }
    }

    /// Rebuild from stored columns.
    pub fn from_parts(
        profile: PublicProfile,
        scheme_tag: &str,
        private_onion_key: Vec<u8>,
        private_box_key: Vec<u8>,
        private_sign_key: Vec<u8>,
    ) -> Result<Self, AddressError> {
        Ok(Self {
            profile,
            scheme: scheme_tag.parse()?,
            private_onion_key: Zeroizing::new(private_onion_key),
            private_box_key: Zeroizing::new(private_box_key),
            private_sign_key: Zeroizing::new(private_sign_key),
        })
    }

    pub fn profile(&self) -> &PublicProfile {
        &self.profile
    }

    pub fn onion(&self) -> &str {
        &self.profile.onion
    }

    pub fn scheme(&self) -> OnionScheme {
        self.scheme
    }

    pub fn private_onion_key(&self) -> &[u8] {
        &self.private_onion_key
    }

    pub fn private_box_key(&self) -> &[u8] {
        &self.private_box_key
    }

    pub fn private_sign_key(&self) -> &[u8] {
        &self.private_sign_key
    }

    /// Onion private key in the form `ADD_ONION` expects.
    pub fn onion_key_for_transport(&self) -> Result<String, AddressError> {
        format_private_key_for_transport(self.scheme, &self.private_onion_key)
    }

    /// Seal `plaintext` for a peer's published box key.
    pub fn seal_for(
        &self,
        plaintext: &[u8],
        peer_box_key: &[u8],
        rng: &dyn SecureRandom,
    ) -> Result<Vec<u8>, EnvelopeError> {
        envelope::seal(plaintext, peer_box_key, &self.private_box_key, rng)
    }

    /// Open an envelope a peer sealed for us.
    pub fn open_from(&self, sealed: &[u8], peer_box_key: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        envelope::open(sealed, peer_box_key, &self.private_box_key)
    }
}

impl fmt::Debug for SelfIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelfIdentity")
            .field("profile", &self.profile)
            .field("scheme", &self.scheme)
            .finish_non_exhaustive()
    }
}

/// Standard base64 for byte fields, matching how profiles have always been
/// published.
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}
