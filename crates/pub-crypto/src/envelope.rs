//! Sealed envelopes.
//!
//! Public-key authenticated encryption between two static X25519 keypairs:
//! the shared secret `X25519(sender_priv, recipient_pub)` is run through
//! HKDF-SHA256 to key XChaCha20-Poly1305, and a fresh random 24-byte nonce
//! is drawn for every seal.
//!
//! Wire layout: `nonce (24 bytes) || ciphertext || tag (16 bytes)`.
//!
//! The construction is symmetric in role: `open(seal(m, pk_b, sk_a), pk_a, sk_b) == m`.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    Key, XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use sha2::Sha256;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::rng::SecureRandom;

/// Nonce length prepended to every envelope.
pub const NONCE_LEN: usize = 24;

/// Poly1305 tag length.
pub const TAG_LEN: usize = 16;

/// Smallest possible envelope (empty plaintext).
pub const MIN_SEALED_LEN: usize = NONCE_LEN + TAG_LEN;

const KDF_INFO: &[u8] = b"pub_box_v1_key";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("invalid key bytes")]
    InvalidKeyBytes,
    #[error("encryption failed")]
    EncryptFailed,
    #[error("authentication failed")]
    AuthenticationFailed,
}

fn x25519_public(bytes: &[u8]) -> Result<X25519PublicKey, EnvelopeError> {
    let arr: [u8; 32] = bytes.try_into().map_err(|_| EnvelopeError::InvalidKeyBytes)?;
    Ok(X25519PublicKey::from(arr))
}

fn x25519_secret(bytes: &[u8]) -> Result<StaticSecret, EnvelopeError> {
    let arr: Zeroizing<[u8; 32]> =
        Zeroizing::new(bytes.try_into().map_err(|_| EnvelopeError::InvalidKeyBytes)?);
    Ok(StaticSecret::from(*arr))
}

/// Derive the symmetric box key shared by `own_private` and `their_public`.
fn box_key(their_public: &[u8], own_private: &[u8]) -> Result<Zeroizing<[u8; 32]>, EnvelopeError> {
    let public = x25519_public(their_public)?;
    let secret = x25519_secret(own_private)?;
    let shared = secret.diffie_hellman(&public);

    // Low-order public keys yield an all-zero secret.
    if !shared.was_contributory() {
        return Err(EnvelopeError::InvalidKeyBytes);
    }

    let hk = Hkdf::<Sha256>::new(None, shared.as_bytes());
    let mut key = Zeroizing::new([0u8; 32]);
    hk.expand(KDF_INFO, &mut key[..])
        .map_err(|_| EnvelopeError::InvalidKeyBytes)?;
    Ok(key)
}

/// Seal `plaintext` for the holder of `recipient_public`, authenticated by
/// `sender_private`.
pub fn seal(
    plaintext: &[u8],
    recipient_public: &[u8],
    sender_private: &[u8],
    rng: &dyn SecureRandom,
) -> Result<Vec<u8>, EnvelopeError> {
    let key = box_key(recipient_public, sender_private)?;

    let mut nonce = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut nonce);

    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key[..]));
    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| EnvelopeError::EncryptFailed)?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Open an envelope sealed by the holder of `sender_public` for
/// `recipient_private`.
///
/// Every failure to open, including truncated input and malformed keys, is
/// reported as [`EnvelopeError::AuthenticationFailed`].
pub fn open(
    sealed: &[u8],
    sender_public: &[u8],
    recipient_private: &[u8],
) -> Result<Vec<u8>, EnvelopeError> {
    if sealed.len() < MIN_SEALED_LEN {
        return Err(EnvelopeError::AuthenticationFailed);
    }
    let key = box_key(sender_public, recipient_private)
        .map_err(|_| EnvelopeError::AuthenticationFailed)?;

    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key[..]));
    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| EnvelopeError::AuthenticationFailed)
}
