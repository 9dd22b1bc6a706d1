use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub fn hmac_sha256_hex(secret: &str, message: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub fn hmac_sha256_base64(secret: &str, message: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(message.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

/// Mailgun signs `timestamp.token` with the shared key, hex-encoded.
pub fn verify_mailgun(secret: &str, timestamp: &str, token: &str, signature: &str) -> bool {
    let expected = hmac_sha256_hex(secret, &format!("{timestamp}{token}"));
    constant_time_compare(&expected, signature)
}

/// SendGrid and Postmark style: the raw request body signed with the shared
/// secret, base64-encoded into a header.
pub fn verify_raw_body(secret: &str, body: &str, signature: &str) -> bool {
    let expected = hmac_sha256_base64(secret, body);
    constant_time_compare(&expected, signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_body_signature_round_trip() {
        let secret = "whsec_test";
        let body = r#"{"From":"a@b.c"}"#;
        let signature = hmac_sha256_base64(secret, body);
        assert!(verify_raw_body(secret, body, &signature));
    }

    #[test]
    fn test_tampered_body_rejected() {
        let secret = "whsec_test";
        let signature = hmac_sha256_base64(secret, "original");
        assert!(!verify_raw_body(secret, "tampered", &signature));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let signature = hmac_sha256_base64("secret-a", "body");
        assert!(!verify_raw_body("secret-b", "body", &signature));
    }

    #[test]
    fn test_mailgun_signature_round_trip() {
        let secret = "mg_key";
        let timestamp = "1700000000";
        let token = "abc123token";
        let signature = hmac_sha256_hex(secret, &format!("{timestamp}{token}"));
        assert!(verify_mailgun(secret, timestamp, token, &signature));
        assert!(!verify_mailgun(secret, "1700000001", token, &signature));
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc123", "abc123"));
        assert!(!constant_time_compare("abc123", "abc124"));
        assert!(!constant_time_compare("abc", "abcd"));
    }
}
