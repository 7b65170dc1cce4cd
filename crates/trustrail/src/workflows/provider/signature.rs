//! Signature schemes on the two webhook boundaries.
//!
//! Provider requests and inbound provider events carry a keyed MD5 digest of
//! the request reference; outbound business notifications carry an
//! HMAC-SHA256 over the serialized payload with the per-business secret.

use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Digest sent in the `Signature` header of provider requests:
/// `hex(md5("{api_key};{request_ref}"))`.
pub fn request_signature(api_key: &str, request_ref: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(api_key.as_bytes());
    hasher.update(b";");
    hasher.update(request_ref.as_bytes());
    hex::encode(hasher.finalize())
}

/// Check the signature hash attached to an inbound provider event.
pub fn verify_event_signature(api_key: &str, request_ref: &str, received: &str) -> bool {
    request_signature(api_key, request_ref) == received
}

/// HMAC-SHA256 over the serialized notification payload.
pub fn notification_signature(payload: &str, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub fn verify_notification_signature(payload: &str, secret: &str, received: &str) -> bool {
    notification_signature(payload, secret) == received
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_signature_is_stable_hex() {
        let signature = request_signature("test-api-key", "req_0001");
        assert_eq!(signature.len(), 32);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(signature, request_signature("test-api-key", "req_0001"));
    }

    #[test]
    fn event_signature_rejects_other_references() {
        let signature = request_signature("test-api-key", "req_0001");
        assert!(verify_event_signature("test-api-key", "req_0001", &signature));
        assert!(!verify_event_signature("test-api-key", "req_0002", &signature));
        assert!(!verify_event_signature("other-key", "req_0001", &signature));
    }

    #[test]
    fn notification_signature_matches_rfc4231_case_1() {
        // RFC 4231 test case 1: key = 20 bytes of 0x0b, data = "Hi There".
        let key = "\u{0b}".repeat(20);
        assert_eq!(
            notification_signature("Hi There", &key),
            "b0344c61d8db38535ca8afceaf0bf12b881dc200c9833da726e9376c2e32cff7"
        );
    }

    #[test]
    fn notification_signature_round_trips() {
        let payload = r#"{"event":"application.approved"}"#;
        let signature = notification_signature(payload, "whsec_123");
        assert!(verify_notification_signature(payload, "whsec_123", &signature));
        assert!(!verify_notification_signature(payload, "whsec_456", &signature));
    }
}
