//! Webhook signature verification.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Verify a tracker webhook signature using HMAC-SHA256.
///
/// `signature` is the hex-encoded value of the `X-Tracker-Signature`
/// header. Comparison is constant-time.
#[must_use]
pub fn verify_webhook_signature(body: &[u8], signature: &str, secret: &str) -> bool {
    let Ok(signature_bytes) = hex::decode(signature) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let computed = mac.finalize().into_bytes();

    computed.as_slice().ct_eq(&signature_bytes).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(body: &[u8], secret: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn valid_signature_passes() {
        let body = b"{\"webhookEvent\":\"issue_updated\"}";
        let signature = sign(body, "secret");
        assert!(verify_webhook_signature(body, &signature, "secret"));
    }

    #[test]
    fn wrong_secret_fails() {
        let body = b"{}";
        let signature = sign(body, "other");
        assert!(!verify_webhook_signature(body, &signature, "secret"));
    }

    #[test]
    fn malformed_hex_fails() {
        assert!(!verify_webhook_signature(b"{}", "not-hex", "secret"));
    }
}
