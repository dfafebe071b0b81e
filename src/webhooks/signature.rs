//! GitHub webhook signature verification using HMAC-SHA256.
//!
//! GitHub signs each delivery with the shared webhook secret and sends the
//! result in the `X-Hub-Signature-256` header as `sha256=<hex>`. Verification
//! happens on the raw body before anything is parsed; a delivery that fails it
//! is rejected no matter what it contains.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// Header is not `sha256=` followed by valid hex.
    #[error("malformed signature header")]
    Malformed,

    #[error("signature does not match payload")]
    Mismatch,

    #[error("webhook secret cannot key HMAC-SHA256")]
    InvalidKey,
}

/// Parses a GitHub signature header (e.g. `sha256=abc123...`) into raw bytes.
///
/// Returns `None` for malformed headers (missing prefix, invalid hex). Never panics.
///
/// ```
/// use repo_events::webhooks::parse_signature_header;
///
/// assert!(parse_signature_header("sha256=abcd1234").is_some());
/// assert!(parse_signature_header("sha1=abcd1234").is_none());
/// assert!(parse_signature_header("sha256=xyz").is_none());
/// ```
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    let hex_sig = header.strip_prefix("sha256=")?;
    hex::decode(hex_sig).ok()
}

/// Formats a signature as a GitHub-style header value, `sha256=<hex>`.
pub fn format_signature_header(signature: &[u8]) -> String {
    format!("sha256={}", hex::encode(signature))
}

/// The shared webhook secret. Its `Debug` output is redacted.
#[derive(Clone)]
pub struct WebhookSecret(Vec<u8>);

impl WebhookSecret {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        WebhookSecret(secret.into())
    }

    fn mac(&self) -> Result<HmacSha256, SignatureError> {
        HmacSha256::new_from_slice(&self.0).map_err(|_| SignatureError::InvalidKey)
    }

    /// Computes the raw HMAC-SHA256 of `payload`.
    pub fn compute(&self, payload: &[u8]) -> Result<Vec<u8>, SignatureError> {
        let mut mac = self.mac()?;
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    /// Computes the header value GitHub would send for `payload`.
    pub fn sign(&self, payload: &[u8]) -> Result<String, SignatureError> {
        Ok(format_signature_header(&self.compute(payload)?))
    }

    /// Checks `signature_header` against `payload` in constant time.
    pub fn verify(&self, payload: &[u8], signature_header: &str) -> Result<(), SignatureError> {
        let expected = parse_signature_header(signature_header).ok_or(SignatureError::Malformed)?;
        let mut mac = self.mac()?;
        mac.update(payload);
        mac.verify_slice(&expected)
            .map_err(|_| SignatureError::Mismatch)
    }
}

impl fmt::Debug for WebhookSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WebhookSecret(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // ========================================================================
    // Header parsing
    // ========================================================================

    #[test]
    fn parse_valid_header() {
        assert_eq!(
            parse_signature_header("sha256=1234abcd"),
            Some(vec![0x12, 0x34, 0xab, 0xcd])
        );
    }

    #[test]
    fn parse_uppercase_hex() {
        assert_eq!(
            parse_signature_header("sha256=ABCD1234"),
            Some(vec![0xab, 0xcd, 0x12, 0x34])
        );
    }

    #[test]
    fn parse_rejects_malformed() {
        assert_eq!(parse_signature_header(""), None);
        assert_eq!(parse_signature_header("1234abcd"), None);
        assert_eq!(parse_signature_header("sha1=1234abcd"), None);
        assert_eq!(parse_signature_header("sha256=abc"), None);
        assert_eq!(parse_signature_header("sha256=xyz"), None);
    }

    // ========================================================================
    // Verification
    // ========================================================================

    /// Known vector from GitHub's webhook validation documentation.
    #[test]
    fn github_documentation_example() {
        let secret = WebhookSecret::new("It's a Secret to Everybody");
        let header = "sha256=757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17";
        assert_eq!(secret.sign(b"Hello, World!").unwrap(), header);
        assert_eq!(secret.verify(b"Hello, World!", header), Ok(()));
    }

    #[test]
    fn wrong_secret_is_a_mismatch() {
        let header = WebhookSecret::new("correct").sign(b"payload").unwrap();
        assert_eq!(
            WebhookSecret::new("wrong").verify(b"payload", &header),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn malformed_headers_are_rejected_not_panicking() {
        let secret = WebhookSecret::new("secret");
        for header in ["", "sha256=invalid", "sha1=abc123", "not-a-header", "sha256=zzzz"] {
            assert_eq!(
                secret.verify(b"test", header),
                Err(SignatureError::Malformed),
                "{header:?}"
            );
        }
        // Well-formed but empty digest.
        assert_eq!(
            secret.verify(b"test", "sha256="),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn empty_payload_and_secret_sign() {
        let secret = WebhookSecret::new("");
        let header = secret.sign(b"").unwrap();
        assert_eq!(secret.verify(b"", &header), Ok(()));
    }

    #[test]
    fn debug_redacts_secret() {
        let secret = WebhookSecret::new("hunter2");
        assert!(!format!("{secret:?}").contains("hunter2"));
    }

    // ========================================================================
    // Property-based tests
    // ========================================================================

    proptest! {
        #[test]
        fn prop_sign_verify_roundtrip(payload: Vec<u8>, secret: Vec<u8>) {
            let secret = WebhookSecret::new(secret);
            let header = secret.sign(&payload).unwrap();
            prop_assert!(header.starts_with("sha256="));
            prop_assert_eq!(header.len(), "sha256=".len() + 64);
            prop_assert_eq!(secret.verify(&payload, &header), Ok(()));
        }

        /// Flipping any single byte of the body breaks verification.
        #[test]
        fn prop_single_byte_body_mutation_fails(
            payload in prop::collection::vec(any::<u8>(), 1..256),
            index: prop::sample::Index,
            flip in 1u8..=255,
            secret: Vec<u8>,
        ) {
            let secret = WebhookSecret::new(secret);
            let header = secret.sign(&payload).unwrap();

            let mut mutated = payload.clone();
            let i = index.index(mutated.len());
            mutated[i] ^= flip;

            prop_assert_eq!(secret.verify(&mutated, &header), Err(SignatureError::Mismatch));
        }

        /// Flipping any single byte of the digest breaks verification.
        #[test]
        fn prop_single_byte_signature_mutation_fails(
            payload: Vec<u8>,
            index: prop::sample::Index,
            flip in 1u8..=255,
            secret: Vec<u8>,
        ) {
            let secret = WebhookSecret::new(secret);
            let mut digest = secret.compute(&payload).unwrap();
            let i = index.index(digest.len());
            digest[i] ^= flip;

            let header = format_signature_header(&digest);
            prop_assert_eq!(secret.verify(&payload, &header), Err(SignatureError::Mismatch));
        }

        #[test]
        fn prop_format_parse_roundtrip(signature: [u8; 32]) {
            let header = format_signature_header(&signature);
            prop_assert_eq!(parse_signature_header(&header), Some(signature.to_vec()));
        }

        #[test]
        fn prop_malformed_header_no_panic(header: String, payload: Vec<u8>, secret: Vec<u8>) {
            let _ = parse_signature_header(&header);
            let _ = WebhookSecret::new(secret).verify(&payload, &header);
        }
    }
}
