//! Card-gateway webhook signature verification.
//!
//! HMAC-SHA256 over `<timestamp>.<payload>` with timestamp bounds to
//! reject replays. Comparison is constant-time.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::errors::AuthError;
use super::event::Gateway;

/// Maximum allowed age for a signed payload (5 minutes).
const MAX_PAYLOAD_AGE_SECS: i64 = 300;

/// Clock skew tolerated for timestamps ahead of our clock (1 minute).
const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// Parsed components of the card gateway's signature header.
///
/// Format: `t=<unix-seconds>,v1=<hex-hmac>[,...]`. Unknown schemes are
/// ignored for forward compatibility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub v1_signature: Vec<u8>,
}

impl SignatureHeader {
    pub fn parse(header: &str) -> Result<Self, AuthError> {
        let mut timestamp: Option<i64> = None;
        let mut v1_signature: Option<Vec<u8>> = None;

        for part in header.split(',') {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| AuthError::MalformedHeader("expected key=value parts".into()))?;

            match key {
                "t" => {
                    timestamp = Some(
                        value
                            .parse()
                            .map_err(|_| AuthError::MalformedHeader("invalid timestamp".into()))?,
                    );
                }
                "v1" => {
                    v1_signature = Some(hex::decode(value).map_err(|_| {
                        AuthError::MalformedHeader("v1 signature is not hex".into())
                    })?);
                }
                _ => {}
            }
        }

        Ok(SignatureHeader {
            timestamp: timestamp
                .ok_or_else(|| AuthError::MalformedHeader("missing timestamp".into()))?,
            v1_signature: v1_signature
                .ok_or_else(|| AuthError::MalformedHeader("missing v1 signature".into()))?,
        })
    }
}

/// Verifies card-gateway webhook deliveries.
///
/// The secret is optional at construction so deployments without the
/// card gateway can still boot, but verification fails closed:
/// a missing secret rejects every payload.
pub struct CardSignatureVerifier {
    secret: Option<SecretString>,
}

impl CardSignatureVerifier {
    pub fn new(secret: Option<SecretString>) -> Self {
        Self { secret }
    }

    /// Checks that `signature_header` authenticates `payload`.
    ///
    /// Parsing of the payload itself is the normalizer's job; this
    /// only establishes authenticity and freshness.
    pub fn verify(&self, payload: &[u8], signature_header: &str) -> Result<(), AuthError> {
        let secret = self
            .secret
            .as_ref()
            .ok_or(AuthError::MissingSecret(Gateway::Card))?;

        let header = SignatureHeader::parse(signature_header)?;
        validate_timestamp(header.timestamp)?;

        let expected = compute_signature(secret.expose_secret(), header.timestamp, payload);
        if !constant_time_compare(&expected, &header.v1_signature) {
            return Err(AuthError::InvalidSignature);
        }

        Ok(())
    }
}

fn validate_timestamp(timestamp: i64) -> Result<(), AuthError> {
    let now = chrono::Utc::now().timestamp();
    let age = now - timestamp;

    if age > MAX_PAYLOAD_AGE_SECS {
        return Err(AuthError::StalePayload { age_secs: age });
    }
    if age < -MAX_CLOCK_SKEW_SECS {
        return Err(AuthError::FutureTimestamp);
    }

    Ok(())
}

fn compute_signature(secret: &str, timestamp: i64, payload: &[u8]) -> Vec<u8> {
    let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));

    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(signed_payload.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

/// Timing attacks must not leak how much of the signature matched.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Builds a valid signature header for a payload. Used by fixtures.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let signature = hex::encode(compute_signature(secret, timestamp, payload));
    format!("t={timestamp},v1={signature}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SECRET: &str = "whsec_test_secret_12345";

    fn verifier() -> CardSignatureVerifier {
        CardSignatureVerifier::new(Some(SecretString::new(TEST_SECRET.into())))
    }

    // ══════════════════════════════════════════════════════════════
    // Header parsing
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn parse_header_with_v1() {
        let header_str = format!("t=1234567890,v1={}", "a".repeat(64));

        let header = SignatureHeader::parse(&header_str).unwrap();

        assert_eq!(header.timestamp, 1234567890);
        assert_eq!(header.v1_signature.len(), 32);
    }

    #[test]
    fn parse_header_ignores_unknown_schemes() {
        let header_str = format!("t=1234567890,v1={},v0=legacy00,scheme=hmac", "a".repeat(64));

        let header = SignatureHeader::parse(&header_str).unwrap();

        assert_eq!(header.timestamp, 1234567890);
    }

    #[test]
    fn parse_header_missing_timestamp_fails() {
        let header_str = format!("v1={}", "a".repeat(64));

        assert!(matches!(
            SignatureHeader::parse(&header_str),
            Err(AuthError::MalformedHeader(_))
        ));
    }

    #[test]
    fn parse_header_missing_v1_fails() {
        assert!(matches!(
            SignatureHeader::parse("t=1234567890"),
            Err(AuthError::MalformedHeader(_))
        ));
    }

    #[test]
    fn parse_header_bad_hex_fails() {
        assert!(matches!(
            SignatureHeader::parse("t=1234567890,v1=not_valid_hex"),
            Err(AuthError::MalformedHeader(_))
        ));
    }

    // ══════════════════════════════════════════════════════════════
    // Signature verification
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn verify_valid_signature() {
        let payload = br#"{"id":"evt_test123","type":"checkout.session.completed"}"#;
        let timestamp = chrono::Utc::now().timestamp();
        let header = sign_payload(TEST_SECRET, timestamp, payload);

        assert!(verifier().verify(payload, &header).is_ok());
    }

    #[test]
    fn verify_forged_signature_fails() {
        let payload = br#"{"id":"evt_test"}"#;
        let timestamp = chrono::Utc::now().timestamp();
        let header = format!("t={},v1={}", timestamp, "a".repeat(64));

        assert!(matches!(
            verifier().verify(payload, &header),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn verify_wrong_secret_fails() {
        let payload = br#"{"id":"evt_test"}"#;
        let timestamp = chrono::Utc::now().timestamp();
        let header = sign_payload("some_other_secret", timestamp, payload);

        assert!(matches!(
            verifier().verify(payload, &header),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn verify_tampered_payload_fails() {
        let original = br#"{"id":"evt_test"}"#;
        let tampered = br#"{"id":"evt_evil"}"#;
        let timestamp = chrono::Utc::now().timestamp();
        let header = sign_payload(TEST_SECRET, timestamp, original);

        assert!(matches!(
            verifier().verify(tampered, &header),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn verify_without_configured_secret_fails_closed() {
        let verifier = CardSignatureVerifier::new(None);
        let payload = br#"{"id":"evt_test"}"#;
        let timestamp = chrono::Utc::now().timestamp();
        let header = sign_payload(TEST_SECRET, timestamp, payload);

        assert!(matches!(
            verifier.verify(payload, &header),
            Err(AuthError::MissingSecret(Gateway::Card))
        ));
    }

    // ══════════════════════════════════════════════════════════════
    // Timestamp bounds
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn timestamp_within_window_accepted() {
        assert!(validate_timestamp(chrono::Utc::now().timestamp() - 120).is_ok());
    }

    #[test]
    fn timestamp_at_age_boundary_accepted() {
        assert!(validate_timestamp(chrono::Utc::now().timestamp() - 300).is_ok());
    }

    #[test]
    fn timestamp_past_age_boundary_rejected() {
        assert!(matches!(
            validate_timestamp(chrono::Utc::now().timestamp() - 301),
            Err(AuthError::StalePayload { .. })
        ));
    }

    #[test]
    fn timestamp_slightly_ahead_accepted() {
        assert!(validate_timestamp(chrono::Utc::now().timestamp() + 30).is_ok());
    }

    #[test]
    fn timestamp_far_ahead_rejected() {
        assert!(matches!(
            validate_timestamp(chrono::Utc::now().timestamp() + 120),
            Err(AuthError::FutureTimestamp)
        ));
    }

    // ══════════════════════════════════════════════════════════════
    // Constant-time comparison
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn constant_time_compare_equal() {
        assert!(constant_time_compare(&[1, 2, 3], &[1, 2, 3]));
    }

    #[test]
    fn constant_time_compare_unequal() {
        assert!(!constant_time_compare(&[1, 2, 3], &[1, 2, 4]));
    }

    #[test]
    fn constant_time_compare_length_mismatch() {
        assert!(!constant_time_compare(&[1, 2, 3], &[1, 2, 3, 4]));
    }
}
