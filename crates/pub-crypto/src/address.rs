//! Onion address derivation.
//!
//! Two incompatible schemes are supported and dispatched on the stored
//! scheme tag:
//!
//! - `RSA1024` (legacy): `base32(sha1(der(public_key))[..10])`, 16 chars,
//!   no checksum.
//! - `ED25519-V3`: `base32(public_key || checksum || 0x03)`, 56 chars, where
//!   `checksum = sha3_256(".onion checksum" || public_key || 0x03)[..2]`.
//!
//! All addresses are lower-case and carry no `.onion` suffix.

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rsa::pkcs1::{DecodeRsaPublicKey, EncodeRsaPublicKey};
use rsa::RsaPublicKey;
use sha1::Sha1;
use sha2::{Digest, Sha512};
use sha3::Sha3_256;
use zeroize::Zeroizing;

/// Version byte of v3 onion addresses.
pub const ED25519_VERSION: u8 = 0x03;

/// Length of a legacy RSA1024 address in characters.
pub const RSA1024_ADDRESS_LEN: usize = 16;

/// Length of an ED25519-V3 address in characters.
pub const ED25519_ADDRESS_LEN: usize = 56;

const CHECKSUM_PREFIX: &[u8] = b".onion checksum";
const BASE32_ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";

/// Error type for address operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("unsupported onion key type: {0}")]
    UnsupportedScheme(String),
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),
    #[error("invalid private key length: expected at least {expected}, got {got}")]
    InvalidPrivateKeyLength { expected: usize, got: usize },
    #[error("invalid onion address: {0}")]
    InvalidAddress(String),
}

/// Key scheme of a rendezvous identity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum OnionScheme {
    /// Legacy 1024-bit RSA hidden service key.
    #[default]
    Rsa1024,
    /// Ed25519 v3 hidden service key.
    Ed25519V3,
}

impl OnionScheme {
    /// Key type tag as understood by the Tor control port and stored on disk.
    pub fn as_str(&self) -> &'static str {
        match self {
            OnionScheme::Rsa1024 => "RSA1024",
            OnionScheme::Ed25519V3 => "ED25519-V3",
        }
    }
}

impl fmt::Display for OnionScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OnionScheme {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RSA1024" => Ok(OnionScheme::Rsa1024),
            "ED25519-V3" => Ok(OnionScheme::Ed25519V3),
            other => Err(AddressError::UnsupportedScheme(other.to_string())),
        }
    }
}

/// Derive the onion address for `public_key` under `scheme`.
///
/// For `Rsa1024` the key is the PKCS#1 DER encoding of the RSA public key;
/// for `Ed25519V3` it is the raw 32-byte verifying key.
pub fn derive_address(scheme: OnionScheme, public_key: &[u8]) -> Result<String, AddressError> {
    match scheme {
        OnionScheme::Rsa1024 => rsa_address_from_der(public_key),
        OnionScheme::Ed25519V3 => {
            let key: [u8; 32] = public_key.try_into().map_err(|_| {
                AddressError::InvalidPublicKey(format!(
                    "ed25519 key must be 32 bytes, got {}",
                    public_key.len()
                ))
            })?;
            Ok(ed25519_address(&key))
        }
    }
}

/// Derive the legacy address of an RSA public key.
pub fn derive_rsa_address(public_key: &RsaPublicKey) -> Result<String, AddressError> {
    let der = public_key
        .to_pkcs1_der()
        .map_err(|e| AddressError::InvalidPublicKey(e.to_string()))?;
    Ok(rsa_address_digest(der.as_bytes()))
}

fn rsa_address_from_der(der: &[u8]) -> Result<String, AddressError> {
    // Reject bytes that are not an RSA public key before hashing them.
    RsaPublicKey::from_pkcs1_der(der).map_err(|e| AddressError::InvalidPublicKey(e.to_string()))?;
    Ok(rsa_address_digest(der))
}

fn rsa_address_digest(der: &[u8]) -> String {
    let hash = Sha1::digest(der);
    base32_encode(&hash[..hash.len() / 2])
}

/// Derive the v3 address of an Ed25519 public key.
pub fn ed25519_address(public_key: &[u8; 32]) -> String {
    let checksum = ed25519_checksum(public_key);
    let mut combined = [0u8; 35];
    combined[..32].copy_from_slice(public_key);
    combined[32..34].copy_from_slice(&checksum);
    combined[34] = ED25519_VERSION;
    base32_encode(&combined)
}

fn ed25519_checksum(public_key: &[u8; 32]) -> [u8; 2] {
    let mut hasher = Sha3_256::new();
    hasher.update(CHECKSUM_PREFIX);
    hasher.update(public_key);
    hasher.update([ED25519_VERSION]);
    let digest = hasher.finalize();
    [digest[0], digest[1]]
}

/// Recover the Ed25519 public key embedded in a v3 address, verifying the
/// checksum and version byte.
pub fn ed25519_public_key(onion: &str) -> Result<[u8; 32], AddressError> {
    if onion.len() != ED25519_ADDRESS_LEN {
        return Err(AddressError::InvalidAddress(format!(
            "v3 address must be {} chars, got {}",
            ED25519_ADDRESS_LEN,
            onion.len()
        )));
    }
    let decoded = base32_decode(onion)?;
    if decoded.len() != 35 {
        return Err(AddressError::InvalidAddress("bad decoded length".into()));
    }
    if decoded[34] != ED25519_VERSION {
        return Err(AddressError::InvalidAddress(format!(
            "unknown version byte {:#04x}",
            decoded[34]
        )));
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&decoded[..32]);
    if ed25519_checksum(&key) != decoded[32..34] {
        return Err(AddressError::InvalidAddress("checksum mismatch".into()));
    }
    Ok(key)
}

/// Check that `onion` is a well-formed address and report its scheme.
///
/// Legacy addresses carry no checksum, so only their length and alphabet can
/// be checked.
pub fn validate_address(onion: &str) -> Result<OnionScheme, AddressError> {
    match onion.len() {
        RSA1024_ADDRESS_LEN => {
            base32_decode(onion)?;
            Ok(OnionScheme::Rsa1024)
        }
        ED25519_ADDRESS_LEN => {
            ed25519_public_key(onion)?;
            Ok(OnionScheme::Ed25519V3)
        }
        n => Err(AddressError::InvalidAddress(format!("unexpected length {}", n))),
    }
}

/// Convert a stored private key into the base64 blob Tor expects in
/// `ADD_ONION <KeyType>:<blob>`.
///
/// - `Rsa1024`: the PKCS#1 DER bytes, base64-encoded as-is.
/// - `Ed25519V3`: the first 32 bytes are the seed; it is expanded with
///   SHA-512 and the lower half clamped into a scalar, giving the 64-byte
///   expanded secret key.
pub fn format_private_key_for_transport(
    scheme: OnionScheme,
    private_key: &[u8],
) -> Result<String, AddressError> {
    match scheme {
        OnionScheme::Rsa1024 => Ok(BASE64.encode(private_key)),
        OnionScheme::Ed25519V3 => {
            if private_key.len() < 32 {
                return Err(AddressError::InvalidPrivateKeyLength {
                    expected: 32,
                    got: private_key.len(),
                });
            }
            let mut expanded = Zeroizing::new([0u8; 64]);
            expanded.copy_from_slice(&Sha512::digest(&private_key[..32]));
            expanded[0] &= 248;
            expanded[31] &= 127;
            expanded[31] |= 64;
            Ok(BASE64.encode(&expanded[..]))
        }
    }
}

/// Lower-case RFC 4648 base32 without padding.
pub(crate) fn base32_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() * 8).div_ceil(5));
    let mut buffer: u64 = 0;
    let mut bits = 0;

    for &byte in data {
        buffer = (buffer << 8) | byte as u64;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}

pub(crate) fn base32_decode(s: &str) -> Result<Vec<u8>, AddressError> {
    let mut out = Vec::with_capacity(s.len() * 5 / 8);
    let mut buffer: u64 = 0;
    let mut bits = 0;

    for c in s.bytes() {
        let value = match c {
            b'a'..=b'z' => c - b'a',
            b'2'..=b'7' => c - b'2' + 26,
            _ => {
                return Err(AddressError::InvalidAddress(format!(
                    "invalid character {:?}",
                    c as char
                )))
            }
        };
        buffer = (buffer << 5) | value as u64;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((buffer >> bits) as u8);
        }
    }
    Ok(out)
}
