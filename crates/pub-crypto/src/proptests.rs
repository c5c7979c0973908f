#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use crate::address::{base32_decode, base32_encode, derive_address, ed25519_address, validate_address, OnionScheme};
    use crate::envelope::{open, seal, EnvelopeError};
    use crate::identity::{generate_encryption_keypair, KeyPair};
    use crate::rng::OsRandom;

    fn keypairs() -> (KeyPair, KeyPair) {
        (generate_encryption_keypair(&OsRandom), generate_encryption_keypair(&OsRandom))
    }

    proptest! {
        #[test]
        fn test_ed25519_address_deterministic(key in any::<[u8; 32]>()) {
            let a = derive_address(OnionScheme::Ed25519V3, &key).unwrap();
            let b = derive_address(OnionScheme::Ed25519V3, &key).unwrap();
            prop_assert_eq!(&a, &b);
            prop_assert_eq!(a.len(), 56);
            prop_assert_eq!(validate_address(&a).unwrap(), OnionScheme::Ed25519V3);
            prop_assert_eq!(a, ed25519_address(&key));
        }

        #[test]
        fn test_base32_decode_inverts_encode(data in proptest::collection::vec(any::<u8>(), 0..64)) {
            // Only whole 5-byte groups decode without trailing pad bits.
            let len = data.len() - data.len() % 5;
            let encoded = base32_encode(&data[..len]);
            prop_assert_eq!(base32_decode(&encoded).unwrap(), data[..len].to_vec());
        }

        #[test]
        fn test_seal_open_round_trip(message in proptest::collection::vec(any::<u8>(), 0..512)) {
            let (alice, bob) = keypairs();
            let sealed = seal(&message, &bob.public, &alice.private, &OsRandom).unwrap();
            prop_assert_eq!(open(&sealed, &alice.public, &bob.private).unwrap(), message);
        }

        #[test]
        fn test_single_byte_flip_detected(
            message in proptest::collection::vec(any::<u8>(), 1..128),
            index in any::<prop::sample::Index>(),
            mask in 1u8..=255,
        ) {
            let (alice, bob) = keypairs();
            let mut sealed = seal(&message, &bob.public, &alice.private, &OsRandom).unwrap();
            let i = index.index(sealed.len());
            sealed[i] ^= mask;
            prop_assert_eq!(
                open(&sealed, &alice.public, &bob.private),
                Err(EnvelopeError::AuthenticationFailed)
            );
        }

        #[test]
        fn test_random_bytes_never_open(junk in proptest::collection::vec(any::<u8>(), 0..256)) {
            let (alice, bob) = keypairs();
            prop_assert!(open(&junk, &alice.public, &bob.private).is_err());
        }
    }
}
