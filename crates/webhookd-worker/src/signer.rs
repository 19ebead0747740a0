/*!
 * Signer
 *
 * Produces the `x-signature` header value sent with every outbound
 * delivery, plus the exact serialized bytes so the caller transmits
 * precisely what was signed: canonicalisation means "the bytes on the
 * wire", nothing more.
 */

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum SignError {
    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Serialize `payload` and sign it, returning `(header_value, body_bytes)`.
pub fn sign(payload: &serde_json::Value, secret: &[u8]) -> Result<(String, Vec<u8>), SignError> {
    let body = serde_json::to_vec(payload)?;

    let mut mac =
        HmacSha256::new_from_slice(secret).expect("HMAC accepts a key of any length");
    mac.update(&body);
    let digest = mac.finalize().into_bytes();

    Ok((format!("sha256={}", hex::encode(digest)), body))
}

/// Constant-time verification, kept for test-only use. Verifying a
/// signature on the receiver side is not something this service does in
/// production, but the signature law is otherwise unfalsifiable in tests.
#[cfg(test)]
pub fn verify(body: &[u8], secret: &[u8], received_header: &str) -> bool {
    let mut mac =
        HmacSha256::new_from_slice(secret).expect("HMAC accepts a key of any length");
    mac.update(body);
    let digest = mac.finalize().into_bytes();
    let expected = format!("sha256={}", hex::encode(digest));

    expected.len() == received_header.len()
        && expected
            .as_bytes()
            .iter()
            .zip(received_header.as_bytes())
            .all(|(a, b)| a == b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn signature_has_sha256_prefix_and_is_deterministic() {
        let payload = json!({"event": "order.created", "id": 1});
        let (sig1, body1) = sign(&payload, b"secret").unwrap();
        let (sig2, body2) = sign(&payload, b"secret").unwrap();

        assert!(sig1.starts_with("sha256="));
        assert_eq!(sig1.len(), "sha256=".len() + 64);
        assert_eq!(sig1, sig2);
        assert_eq!(body1, body2);
    }

    #[test]
    fn verify_accepts_matching_signature_and_rejects_tampering() {
        let payload = json!({"event": "order.created", "id": 1});
        let (sig, body) = sign(&payload, b"secret").unwrap();

        assert!(verify(&body, b"secret", &sig));
        assert!(!verify(&body, b"wrong-secret", &sig));
        assert!(!verify(b"{\"event\":\"tampered\"}", b"secret", &sig));
    }
}
