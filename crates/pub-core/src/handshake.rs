//! Subscribe handshake payload.
//!
//! The plaintext a requester seals for a peer is
//!
//! ```text
//! "subscribe" ":" <decimal unix seconds> ":" <32 raw secret bytes>
//! ```
//!
//! The secret is raw binary and may itself contain `:`, so the payload is
//! split into at most three fields and the third keeps everything after the
//! second colon.
//!
//! Every function here is pure: the current time is an argument.

use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

use pub_crypto::address::AddressError;
use pub_crypto::envelope::EnvelopeError;
use pub_crypto::rng::SecureRandom;

use crate::records::{SelfIdentity, SessionSecret, SESSION_SECRET_LEN};
use crate::store::StoreError;

/// Leading field of every subscribe payload.
pub const SUBSCRIBE_TAG: &[u8] = b"subscribe";

/// Maximum clock skew, in either direction, accepted between requester and
/// responder.
pub const REPLAY_WINDOW_SECS: i64 = 900;

/// Opaque reason shown to remote callers for every rejected request.
pub const REJECTED_REASON: &str = "subscription rejected";

/// Handshake failures.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("unsupported identity scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid peer address: {0}")]
    InvalidAddress(String),

    #[error("envelope authentication failed")]
    AuthenticationFailed,

    #[error("malformed payload: expected 3 fields, got {0}")]
    MalformedPayload(usize),

    #[error("bad payload tag")]
    BadTag,

    #[error("bad timestamp")]
    BadTimestamp,

    #[error("timestamp outside replay window (skew {skew_secs}s)")]
    TimestampOutOfRange { skew_secs: i64 },

    #[error("bad secret length: {0}")]
    BadSecretLength(usize),

    #[error("peer unreachable: {0}")]
    PeerUnreachable(String),

    #[error("subscription rejected by peer (status {status})")]
    SubscriptionRejected { status: u16 },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl HandshakeError {
    /// Only network failures may be retried, and only by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, HandshakeError::PeerUnreachable(_))
    }

    /// True for every failure to open or validate a request. These must be
    /// indistinguishable to the remote side.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            HandshakeError::AuthenticationFailed
                | HandshakeError::MalformedPayload(_)
                | HandshakeError::BadTag
                | HandshakeError::BadTimestamp
                | HandshakeError::TimestampOutOfRange { .. }
                | HandshakeError::BadSecretLength(_)
                | HandshakeError::SubscriptionRejected { .. }
        )
    }

    /// Text safe to return across the network.
    pub fn public_reason(&self) -> &'static str {
        match self {
            e if e.is_rejection() => REJECTED_REASON,
            HandshakeError::InvalidAddress(_) => "invalid peer address",
            HandshakeError::PeerUnreachable(_) => "peer unreachable",
            _ => "internal error",
        }
    }

    /// HTTP status a node answers with for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            e if e.is_rejection() => 403,
            HandshakeError::InvalidAddress(_) => 400,
            HandshakeError::PeerUnreachable(_) => 502,
            _ => 500,
        }
    }
}

impl From<AddressError> for HandshakeError {
    fn from(err: AddressError) -> Self {
        match err {
            AddressError::UnsupportedScheme(tag) => HandshakeError::UnsupportedScheme(tag),
            other => HandshakeError::InvalidAddress(other.to_string()),
        }
    }
}

impl From<EnvelopeError> for HandshakeError {
    fn from(_: EnvelopeError) -> Self {
        HandshakeError::AuthenticationFailed
    }
}

/// Current wall-clock time in unix seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Encode the subscribe plaintext.
pub fn build_payload(secret: &SessionSecret, now_unix: i64) -> Vec<u8> {
    let ts = now_unix.to_string();
    let mut out = Vec::with_capacity(SUBSCRIBE_TAG.len() + ts.len() + 2 + SESSION_SECRET_LEN);
    out.extend_from_slice(SUBSCRIBE_TAG);
    out.push(b':');
    out.extend_from_slice(ts.as_bytes());
    out.push(b':');
    out.extend_from_slice(secret.as_bytes());
    out
}

/// Decode and validate a subscribe plaintext received at `now_unix`.
pub fn parse_payload(payload: &[u8], now_unix: i64) -> Result<SessionSecret, HandshakeError> {
    let fields: Vec<&[u8]> = payload.splitn(3, |b| *b == b':').collect();
    if fields.len() != 3 {
        return Err(HandshakeError::MalformedPayload(fields.len()));
    }

    if fields[0] != SUBSCRIBE_TAG {
        return Err(HandshakeError::BadTag);
    }

    let ts: i64 = std::str::from_utf8(fields[1])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(HandshakeError::BadTimestamp)?;

    // An overflowing difference is as far out of range as it gets.
    let skew = now_unix.checked_sub(ts).unwrap_or(i64::MAX);
    if !(-REPLAY_WINDOW_SECS..=REPLAY_WINDOW_SECS).contains(&skew) {
        return Err(HandshakeError::TimestampOutOfRange { skew_secs: skew });
    }

    SessionSecret::from_slice(fields[2]).ok_or(HandshakeError::BadSecretLength(fields[2].len()))
}

/// Build and seal a subscribe request for the holder of `peer_box_key`.
pub fn seal_request(
    me: &SelfIdentity,
    peer_box_key: &[u8],
    secret: &SessionSecret,
    now_unix: i64,
    rng: &dyn SecureRandom,
) -> Result<Vec<u8>, HandshakeError> {
    let payload = zeroize::Zeroizing::new(build_payload(secret, now_unix));
    me.seal_for(&payload, peer_box_key, rng)
        .map_err(|e| HandshakeError::PeerUnreachable(format!("peer published an unusable box key: {}", e)))
}

/// Open a subscribe request sealed by the holder of `sender_box_key` and
/// return the session secret it carries.
pub fn open_request(
    me: &SelfIdentity,
    sender_box_key: &[u8],
    sealed: &[u8],
    now_unix: i64,
) -> Result<SessionSecret, HandshakeError> {
    let payload = zeroize::Zeroizing::new(me.open_from(sealed, sender_box_key)?);
    parse_payload(&payload, now_unix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pub_crypto::address::OnionScheme;
    use pub_crypto::rng::OsRandom;

    const NOW: i64 = 1_700_000_000;

    fn raw(tag: &[u8], ts: &str, secret: &[u8]) -> Vec<u8> {
        [tag, &b":"[..], ts.as_bytes(), &b":"[..], secret].concat()
    }

    #[test]
    fn test_payload_layout() {
        let secret = SessionSecret::new([0xAB; 32]);
        let payload = build_payload(&secret, NOW);
        assert!(payload.starts_with(b"subscribe:1700000000:"));
        assert_eq!(payload.len(), "subscribe:1700000000:".len() + 32);
        assert_eq!(parse_payload(&payload, NOW).unwrap(), secret);
    }

    #[test]
    fn test_secret_containing_colons() {
        let secret = SessionSecret::new([b':'; 32]);
        let payload = build_payload(&secret, NOW);
        assert_eq!(parse_payload(&payload, NOW).unwrap(), secret);
    }

    #[test]
    fn test_window_boundaries() {
        let secret = SessionSecret::new([1; 32]);
        for skew in [-900, -1, 0, 1, 900] {
            let payload = build_payload(&secret, NOW - skew);
            assert!(parse_payload(&payload, NOW).is_ok(), "skew {}", skew);
        }
        for skew in [-901, 901, 100_000] {
            let payload = build_payload(&secret, NOW - skew);
            assert!(
                matches!(
                    parse_payload(&payload, NOW),
                    Err(HandshakeError::TimestampOutOfRange { skew_secs }) if skew_secs == skew
                ),
                "skew {}",
                skew
            );
        }
    }

    #[test]
    fn test_extreme_timestamp() {
        let payload = raw(b"subscribe", &i64::MIN.to_string(), &[0; 32]);
        assert!(matches!(
            parse_payload(&payload, NOW),
            Err(HandshakeError::TimestampOutOfRange { .. })
        ));
    }

    #[test]
    fn test_bad_tag() {
        for tag in [&b"subscrib"[..], &b"Subscribe"[..], &b""[..], &b"subscribe "[..]] {
            assert!(matches!(
                parse_payload(&raw(tag, "1700000000", &[0; 32]), NOW),
                Err(HandshakeError::BadTag)
            ));
        }
    }

    #[test]
    fn test_bad_timestamp() {
        for ts in ["", "abc", "17e8", "1.5", " 1700000000"] {
            assert!(
                matches!(
                    parse_payload(&raw(b"subscribe", ts, &[0; 32]), NOW),
                    Err(HandshakeError::BadTimestamp)
                ),
                "ts {:?}",
                ts
            );
        }
    }

    #[test]
    fn test_bad_secret_length() {
        for len in [0usize, 31, 33] {
            let payload = raw(b"subscribe", "1700000000", &vec![7u8; len]);
            assert!(matches!(
                parse_payload(&payload, NOW),
                Err(HandshakeError::BadSecretLength(n)) if n == len
            ));
        }
    }

    #[test]
    fn test_too_few_fields() {
        assert!(matches!(
            parse_payload(b"subscribe", NOW),
            Err(HandshakeError::MalformedPayload(1))
        ));
        assert!(matches!(
            parse_payload(b"subscribe:1700000000", NOW),
            Err(HandshakeError::MalformedPayload(2))
        ));
    }

    #[test]
    fn test_sealed_request_round_trip() {
        let a = SelfIdentity::generate("a", "", OnionScheme::Ed25519V3, &OsRandom).unwrap();
        let b = SelfIdentity::generate("b", "", OnionScheme::Ed25519V3, &OsRandom).unwrap();
        let secret = SessionSecret::generate(&OsRandom);

        let sealed = seal_request(&a, &b.profile().box_key, &secret, NOW, &OsRandom).unwrap();
        let opened = open_request(&b, &a.profile().box_key, &sealed, NOW + 30).unwrap();
        assert_eq!(opened, secret);
    }

    #[test]
    fn test_garbage_is_authentication_failure() {
        let a = SelfIdentity::generate("a", "", OnionScheme::Ed25519V3, &OsRandom).unwrap();
        let b = SelfIdentity::generate("b", "", OnionScheme::Ed25519V3, &OsRandom).unwrap();
        let garbage = [0x5Au8; 96];
        assert!(matches!(
            open_request(&b, &a.profile().box_key, &garbage, NOW),
            Err(HandshakeError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_public_reason_is_opaque() {
        let rejected = [
            HandshakeError::AuthenticationFailed,
            HandshakeError::MalformedPayload(1),
            HandshakeError::BadTag,
            HandshakeError::BadTimestamp,
            HandshakeError::TimestampOutOfRange { skew_secs: 901 },
            HandshakeError::BadSecretLength(31),
        ];
        for err in &rejected {
            assert_eq!(err.public_reason(), REJECTED_REASON);
            assert!(!err.is_retryable());
        }
        assert!(HandshakeError::PeerUnreachable("timeout".into()).is_retryable());
        assert!(!HandshakeError::SubscriptionRejected { status: 403 }.is_retryable());
        assert!(!HandshakeError::UnsupportedScheme("DSA".into()).is_retryable());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(HandshakeError::BadTag.status_code(), 403);
        assert_eq!(HandshakeError::SubscriptionRejected { status: 500 }.status_code(), 403);
        assert_eq!(HandshakeError::InvalidAddress("x".into()).status_code(), 400);
        assert_eq!(HandshakeError::PeerUnreachable("x".into()).status_code(), 502);
        assert_eq!(
            HandshakeError::Store(StoreError::OperationFailed("disk".into())).status_code(),
            500
        );
    }

    #[test]
    fn test_unsupported_scheme_from_address_error() {
        let err: HandshakeError = AddressError::UnsupportedScheme("DSA".into()).into();
        assert!(matches!(err, HandshakeError::UnsupportedScheme(tag) if tag == "DSA"));
    }

    mod props {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #[test]
            fn test_payload_round_trip_within_window(secret in any::<[u8; 32]>(), skew in -900i64..=900) {
                let secret = SessionSecret::new(secret);
                let payload = build_payload(&secret, NOW - skew);
                prop_assert_eq!(parse_payload(&payload, NOW).unwrap(), secret);
            }

            #[test]
            fn test_parse_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..128), now in any::<i64>()) {
                let _ = parse_payload(&bytes, now);
            }
        }
    }
}
