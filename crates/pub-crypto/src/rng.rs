//! Process-wide secure randomness.
//!
//! Nonces, session secrets and key generation all draw from a single
//! [`SecureRandom`] capability that is created once at startup and passed
//! down explicitly. Tests substitute a deterministic source.

use std::sync::Arc;

use rand_core::{CryptoRng, OsRng, RngCore};

/// A cryptographically secure source of random bytes.
pub trait SecureRandom: Send + Sync {
    /// Fill `dest` with random bytes.
    fn fill_bytes(&self, dest: &mut [u8]);
}

/// Randomness from the operating system CSPRNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsRandom;

impl SecureRandom for OsRandom {
    fn fill_bytes(&self, dest: &mut [u8]) {
        OsRng.fill_bytes(dest);
    }
}

/// Shared handle to the process randomness source.
pub type SharedRandom = Arc<dyn SecureRandom>;

/// The default, OS-backed random source.
pub fn os_random() -> SharedRandom {
    Arc::new(OsRandom)
}

/// Draw a fixed-size random array.
pub fn random_array<const N: usize>(rng: &dyn SecureRandom) -> [u8; N] {
    let mut out = [0u8; N];
    rng.fill_bytes(&mut out);
    out
}

/// Adapts a [`SecureRandom`] to the `rand_core` traits expected by key
/// generators (RSA, Ed25519, X25519).
pub struct RngAdapter<'a>(pub &'a dyn SecureRandom);

impl RngCore for RngAdapter<'_> {
    fn next_u32(&mut self) -> u32 {
        rand_core::impls::next_u32_via_fill(self)
    }

    fn next_u64(&mut self) -> u64 {
        rand_core::impls::next_u64_via_fill(self)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.fill_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.0.fill_bytes(dest);
        Ok(())
    }
}

impl CryptoRng for RngAdapter<'_> {}
