#![forbid(unsafe_code)]

pub mod address;
pub mod identity;
pub mod envelope;
pub mod rng;

#[cfg(test)]
mod proptests;

pub use address::{AddressError, OnionScheme};
pub use envelope::EnvelopeError;
pub use identity::{IdentityError, IdentityKeys, KeyPair};
pub use rng::{os_random, OsRandom, SecureRandom, SharedRandom};
