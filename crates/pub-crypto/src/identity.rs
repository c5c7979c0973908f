//! Identity generation.
//!
//! A node identity is three independent keypairs:
//!
//! - the rendezvous (onion service) key, RSA1024 or Ed25519 depending on the
//!   requested scheme, from which the onion address is derived;
//! - an X25519 keypair used to seal and open envelopes;
//! - an Ed25519 keypair used to sign published content.
//!
//! Private halves are held in zeroizing buffers and never implement
//! `Debug` output.

use std::fmt;

use ed25519_dalek::SigningKey;
use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::address::{derive_address, AddressError, OnionScheme};
use crate::rng::{RngAdapter, SecureRandom};

/// RSA modulus size for legacy onion keys.
pub const RSA_KEY_BITS: usize = 1024;

/// Error type for identity generation.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("rsa key generation failed: {0}")]
    Rsa(String),
    #[error("key encoding failed: {0}")]
    Encoding(String),
    #[error(transparent)]
    Address(#[from] AddressError),
}

/// What a keypair is used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyPurpose {
    Rendezvous,
    ContentSigning,
    ContentEncryption,
}

/// A public/private key pair as raw bytes.
#[derive(Clone)]
pub struct KeyPair {
    pub purpose: KeyPurpose,
    pub public: Vec<u8>,
    pub private: Zeroizing<Vec<u8>>,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("purpose", &self.purpose)
            .field("public_len", &self.public.len())
            .finish_non_exhaustive()
    }
}

/// Freshly generated key material for a new self identity.
#[derive(Clone, Debug)]
pub struct IdentityKeys {
    /// Rendezvous key scheme.
    pub scheme: OnionScheme,
    /// Onion address derived from the rendezvous public key.
    pub onion: String,
    /// Rendezvous keypair. Public half is PKCS#1 DER (RSA) or 32 raw bytes
    /// (Ed25519); private half is PKCS#1 DER (RSA) or seed || public (Ed25519).
    pub rendezvous: KeyPair,
    /// X25519 keypair for sealed envelopes.
    pub encryption: KeyPair,
    /// Ed25519 keypair for content signatures, private half is seed || public.
    pub signing: KeyPair,
}

/// Generate a complete identity for `scheme`.
pub fn generate(scheme: OnionScheme, rng: &dyn SecureRandom) -> Result<IdentityKeys, IdentityError> {
    let rendezvous = match scheme {
        OnionScheme::Rsa1024 => generate_rsa_rendezvous(rng)?,
        OnionScheme::Ed25519V3 => generate_ed25519(KeyPurpose::Rendezvous, rng),
    };
    let onion = derive_address(scheme, &rendezvous.public)?;

    Ok(IdentityKeys {
        scheme,
        onion,
        rendezvous,
        encryption: generate_encryption_keypair(rng),
        signing: generate_ed25519(KeyPurpose::ContentSigning, rng),
    })
}

fn generate_rsa_rendezvous(rng: &dyn SecureRandom) -> Result<KeyPair, IdentityError> {
    let private = RsaPrivateKey::new(&mut RngAdapter(rng), RSA_KEY_BITS)
        .map_err(|e| IdentityError::Rsa(e.to_string()))?;
    let public_der = RsaPublicKey::from(&private)
        .to_pkcs1_der()
        .map_err(|e| IdentityError::Encoding(e.to_string()))?;
    let private_der = private
        .to_pkcs1_der()
        .map_err(|e| IdentityError::Encoding(e.to_string()))?;

    Ok(KeyPair {
        purpose: KeyPurpose::Rendezvous,
        public: public_der.as_bytes().to_vec(),
        private: Zeroizing::new(private_der.as_bytes().to_vec()),
    })
}

fn generate_ed25519(purpose: KeyPurpose, rng: &dyn SecureRandom) -> KeyPair {
    let sign = SigningKey::generate(&mut RngAdapter(rng));
    KeyPair {
        purpose,
        public: sign.verifying_key().to_bytes().to_vec(),
        private: Zeroizing::new(sign.to_keypair_bytes().to_vec()),
    }
}

/// Generate an X25519 keypair for sealed envelopes.
pub fn generate_encryption_keypair(rng: &dyn SecureRandom) -> KeyPair {
    let secret = StaticSecret::random_from_rng(&mut RngAdapter(rng));
    let public = X25519PublicKey::from(&secret);
    KeyPair {
        purpose: KeyPurpose::ContentEncryption,
        public: public.as_bytes().to_vec(),
        private: Zeroizing::new(secret.to_bytes().to_vec()),
    }
}
