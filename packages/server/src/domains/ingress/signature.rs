//! Webhook signature verification using HMAC-SHA256.
//!
//! The platform signs each delivery with the tenant's channel secret
//! and sends the base64-encoded MAC in a header. Verification runs
//! against the raw request body bytes, before any JSON parsing: a
//! re-serialized body can differ byte-for-byte from what was signed.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Computes the HMAC-SHA256 signature of a payload using the secret.
pub fn compute_signature(payload: &[u8], secret: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Formats a signature as the platform's header value (base64).
pub fn encode_signature(signature: &[u8]) -> String {
    BASE64.encode(signature)
}

/// Verifies a webhook signature header against the raw payload.
///
/// Returns `false` for malformed headers; never panics. Comparison is
/// constant-time via the HMAC library.
pub fn verify_signature(payload: &[u8], signature_header: &str, secret: &[u8]) -> bool {
    let expected = match BASE64.decode(signature_header.trim()) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_signature_verifies() {
        let payload = b"{\"destination\":\"chan-1\",\"events\":[]}";
        let secret = b"channel-secret";
        let header = encode_signature(&compute_signature(payload, secret));
        assert!(verify_signature(payload, &header, secret));
    }

    #[test]
    fn wrong_secret_fails() {
        let payload = b"payload";
        let header = encode_signature(&compute_signature(payload, b"right"));
        assert!(!verify_signature(payload, &header, b"wrong"));
    }

    #[test]
    fn modified_payload_fails() {
        let header = encode_signature(&compute_signature(b"original", b"secret"));
        assert!(!verify_signature(b"tampered", &header, b"secret"));
    }

    #[test]
    fn malformed_header_fails_without_panic() {
        let payload = b"payload";
        let secret = b"secret";
        assert!(!verify_signature(payload, "", secret));
        assert!(!verify_signature(payload, "not base64 at all!!!", secret));
        assert!(!verify_signature(payload, "YWJj", secret)); // wrong length
    }

    #[test]
    fn signature_is_32_bytes() {
        assert_eq!(compute_signature(b"x", b"k").len(), 32);
    }

    #[test]
    fn raw_bytes_matter_not_json_equivalence() {
        // Same JSON value, different byte layout: signatures differ.
        let compact = b"{\"a\":1}";
        let spaced = b"{ \"a\": 1 }";
        let secret = b"secret";
        let header = encode_signature(&compute_signature(compact, secret));
        assert!(verify_signature(compact, &header, secret));
        assert!(!verify_signature(spaced, &header, secret));
    }
}
