//! HMAC-SHA256 Webhook Signature Verification
//!
//! Verifies the `X-Hub-Signature-256` header the platform attaches to every
//! event delivery. The signature is computed over the raw request bytes.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the delivery signature.
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";

/// Prefix of the signature header value.
const SIGNATURE_PREFIX: &str = "sha256=";

/// Sign a payload with HMAC-SHA256 and return the header value
/// (`sha256=<lowercase hex>`).
pub fn sign_payload(secret: &str, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    format!("{SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
}

/// Byte-wise comparison that does not exit early on the first mismatch.
///
/// Inputs of different length are rejected up front: the expected value has
/// a fixed length, so the length itself leaks nothing about the secret.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Verify a delivery signature.
///
/// - No secret (or an empty one) configured: returns `true`. Enforcement is
///   disabled, which is a security trade-off for unconfigured environments.
/// - Secret configured but header missing: returns `false`.
/// - Otherwise compares `sha256=HMAC(secret, body)` against the header in
///   constant time.
pub fn verify(secret: Option<&str>, body: &[u8], signature: Option<&str>) -> bool {
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        return true;
    };
    let Some(signature) = signature else {
        return false;
    };
    let expected = sign_payload(secret, body);
    constant_time_eq(expected.as_bytes(), signature.trim().as_bytes())
}

/// Verify a subscription handshake token in constant time.
pub fn verify_token_matches(expected: Option<&str>, provided: Option<&str>) -> bool {
    match (expected, provided) {
        (Some(expected), Some(provided)) if !expected.is_empty() => {
            constant_time_eq(expected.as_bytes(), provided.as_bytes())
        }
        _ => false,
    }
}

/// Owned verifier bound to the configured app secret.
#[derive(Clone, Default)]
pub struct SignatureVerifier {
    secret: Option<String>,
}

impl SignatureVerifier {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    /// Whether a secret is configured and signatures are checked.
    pub const fn is_enforced(&self) -> bool {
        self.secret.is_some()
    }

    pub fn verify(&self, body: &[u8], signature: Option<&str>) -> bool {
        verify(self.secret.as_deref(), body, signature)
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("enforced", &self.is_enforced())
            .finish()
    }
}
