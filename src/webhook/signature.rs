//! HMAC-SHA256 signature validation for GitHub webhooks.
//!
//! GitHub signs webhook payloads using HMAC-SHA256 with a shared secret.
//! The signature is provided in the `X-Hub-Signature-256` header in the
//! format: `sha256=<hex-encoded-signature>`.
//!
//! The comparison is constant-time (`subtle`) and the secret lives in a
//! `SecretString` so it never ends up in logs.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::warn;

use super::error::WebhookError;
use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Prefix of the signature header value.
const SIGNATURE_PREFIX: &str = "sha256=";

/// HMAC-SHA256 signature verifier for GitHub webhooks.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: SecretString,
}

impl SignatureVerifier {
    /// Recommended minimum secret length in bytes.
    pub const MIN_SECRET_LENGTH: usize = 32;

    /// Creates a verifier for the given shared secret.
    ///
    /// # Errors
    ///
    /// An empty secret is a configuration error: the service must not start
    /// without a usable secret.
    pub fn new(secret: SecretString) -> Result<Self> {
        let len = secret.expose_secret().len();
        if len == 0 {
            return Err(Error::Config("webhook secret must not be empty".to_string()));
        }
        if len < Self::MIN_SECRET_LENGTH {
            warn!(
                min_length = Self::MIN_SECRET_LENGTH,
                "webhook secret is shorter than recommended"
            );
        }
        Ok(Self { secret })
    }

    /// Verifies the HMAC-SHA256 signature of a webhook payload.
    ///
    /// `signature_header` is the raw value of `X-Hub-Signature-256`, if present.
    ///
    /// # Errors
    ///
    /// - `MissingSignature` when no header was sent
    /// - `InvalidSignatureFormat` when the prefix or hex encoding is wrong
    /// - `InvalidSignature` when the digest does not match
    pub fn verify(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
    ) -> std::result::Result<(), WebhookError> {
        let header = signature_header.ok_or(WebhookError::MissingSignature)?;

        let signature_hex = header.strip_prefix(SIGNATURE_PREFIX).ok_or_else(|| {
            WebhookError::InvalidSignatureFormat("missing sha256= prefix".into())
        })?;

        let expected_signature = hex::decode(signature_hex)
            .map_err(|e| WebhookError::InvalidSignatureFormat(format!("invalid hex: {e}")))?;

        let computed_signature = self.compute(payload);

        // ct_eq on slices of different lengths is false without early exit on content
        if computed_signature.ct_eq(&expected_signature).into() {
            Ok(())
        } else {
            warn!("webhook signature verification failed");
            Err(WebhookError::InvalidSignature)
        }
    }

    /// Returns the `sha256=<hex>` header value for a payload.
    #[must_use]
    pub fn sign(&self, payload: &[u8]) -> String {
        format!("{SIGNATURE_PREFIX}{}", hex::encode(self.compute(payload)))
    }

    fn compute(&self, payload: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier(secret: &str) -> SignatureVerifier {
        SignatureVerifier::new(SecretString::from(secret)).unwrap()
    }

    fn compute_expected_signature(secret: &str, payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(payload);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn test_valid_signature() {
        let v = verifier("s3cr3t");
        let signature = compute_expected_signature("s3cr3t", b"hello");

        assert!(v.verify(b"hello", Some(&signature)).is_ok());
    }

    #[test]
    fn test_known_digest() {
        // HMAC-SHA256(key="s3cr3t", msg="hello")
        let v = verifier("s3cr3t");
        assert_eq!(v.sign(b"hello"), compute_expected_signature("s3cr3t", b"hello"));
        assert!(v.verify(b"hello", Some("sha256=deadbeef")).is_err());
    }

    #[test]
    fn test_wrong_secret() {
        let v = verifier("test-secret-key");
        let signature = compute_expected_signature("wrong-secret", b"test payload");

        let result = v.verify(b"test payload", Some(&signature));
        assert!(matches!(result, Err(WebhookError::InvalidSignature)));
    }

    #[test]
    fn test_single_bit_flip_rejected() {
        let v = verifier("test-secret-key");
        let payload = b"{\"action\":\"created\"}";
        let good = v.sign(payload);
        let mut bytes = hex::decode(good.strip_prefix("sha256=").unwrap()).unwrap();

        for byte in 0..bytes.len() {
            for bit in 0..8 {
                bytes[byte] ^= 1 << bit;
                let flipped = format!("sha256={}", hex::encode(&bytes));
                assert!(
                    matches!(v.verify(payload, Some(&flipped)), Err(WebhookError::InvalidSignature)),
                    "bit {bit} of byte {byte} accepted"
                );
                bytes[byte] ^= 1 << bit;
            }
        }
    }

    #[test]
    fn test_body_modification_rejected() {
        let v = verifier("test-secret-key");
        let signature = v.sign(b"payload");
        assert!(v.verify(b"payload ", Some(&signature)).is_err());
    }

    #[test]
    fn test_missing_header() {
        let v = verifier("test-secret-key");
        assert!(matches!(
            v.verify(b"x", None),
            Err(WebhookError::MissingSignature)
        ));
    }

    #[test]
    fn test_missing_sha256_prefix() {
        let v = verifier("test-secret-key");

        let result = v.verify(b"test payload", Some("abcdef1234567890"));
        assert!(matches!(
            result,
            Err(WebhookError::InvalidSignatureFormat(_))
        ));
    }

    #[test]
    fn test_invalid_hex_in_signature() {
        let v = verifier("test-secret-key");

        let result = v.verify(b"test payload", Some("sha256=notvalidhex!!!"));
        assert!(matches!(
            result,
            Err(WebhookError::InvalidSignatureFormat(_))
        ));
    }

    #[test]
    fn test_truncated_signature_rejected() {
        let v = verifier("test-secret-key");
        let good = v.sign(b"payload");
        let truncated = &good[..good.len() - 2];

        assert!(matches!(
            v.verify(b"payload", Some(truncated)),
            Err(WebhookError::InvalidSignature)
        ));
    }

    #[test]
    fn test_empty_payload() {
        let v = verifier("test-secret-key");
        let signature = compute_expected_signature("test-secret-key", b"");

        assert!(v.verify(b"", Some(&signature)).is_ok());
    }

    #[test]
    fn test_empty_secret_is_config_error() {
        let result = SignatureVerifier::new(SecretString::from(""));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
