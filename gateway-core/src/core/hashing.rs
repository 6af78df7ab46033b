// gateway-core/src/core/hashing.rs
// ============================================================================
// Module: Gateway Canonical Hashing & Signing
// Description: RFC 8785 JSON canonicalization, content hashing, and HMAC signing.
// Purpose: Provide deterministic digests for audit records and outbound signatures.
// Dependencies: hex, hmac, serde, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! Canonical JSON hashing (RFC 8785 / JCS) gives deterministic digests for
//! audit payload summaries. The same canonical-bytes helper backs outbound
//! HMAC signing: `HMAC-SHA256(secret, "<messageId>.<timestamp>.<body>")`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use hmac::Hmac;
use hmac::Mac;
use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Hash Algorithm
// ============================================================================

/// Supported hash algorithms for gateway content digests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    /// SHA-256 hashing.
    Sha256,
}

/// Default hash algorithm.
pub const DEFAULT_HASH_ALGORITHM: HashAlgorithm = HashAlgorithm::Sha256;

// ============================================================================
// SECTION: Hash Digest
// ============================================================================

/// Deterministic content hash representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashDigest {
    /// Hash algorithm identifier.
    pub algorithm: HashAlgorithm,
    /// Lowercase hex-encoded digest bytes.
    pub value: String,
}

impl HashDigest {
    /// Creates a new digest from raw bytes.
    #[must_use]
    pub fn new(algorithm: HashAlgorithm, bytes: &[u8]) -> Self {
        Self {
            algorithm,
            value: hex::encode(bytes),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when computing canonical hashes.
#[derive(Debug, Error)]
pub enum HashError {
    /// JSON canonicalization failed.
    #[error("failed to canonicalize json: {0}")]
    Canonicalization(String),
}

/// Errors raised when computing HMAC signatures.
#[derive(Debug, Error)]
pub enum SignatureError {
    /// The supplied secret was empty.
    #[error("signing secret must not be empty")]
    EmptySecret,
}

// ============================================================================
// SECTION: Hashing Helpers
// ============================================================================

/// Returns canonical JSON bytes for a serializable value using RFC 8785.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))
}

/// Hashes canonical JSON using the provided algorithm.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn hash_canonical_json<T: Serialize + ?Sized>(
    algorithm: HashAlgorithm,
    value: &T,
) -> Result<HashDigest, HashError> {
    let bytes = canonical_json_bytes(value)?;
    Ok(hash_bytes(algorithm, &bytes))
}

/// Hashes raw bytes using the provided algorithm.
#[must_use]
pub fn hash_bytes(algorithm: HashAlgorithm, bytes: &[u8]) -> HashDigest {
    match algorithm {
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(bytes);
            let digest = hasher.finalize();
            HashDigest::new(HashAlgorithm::Sha256, &digest)
        }
    }
}

// ============================================================================
// SECTION: Outbound Signing
// ============================================================================

type HmacSha256 = Hmac<Sha256>;

/// Builds the canonical message signed by outbound HMAC signatures:
/// `"<messageId>.<timestampSeconds>.<body>"`.
#[must_use]
pub fn signing_message(message_id: &str, timestamp_seconds: i64, body: &str) -> String {
    format!("{message_id}.{timestamp_seconds}.{body}")
}

/// Computes `HMAC-SHA256(secret, message)` and returns the base64-encoded digest.
///
/// # Errors
///
/// Returns [`SignatureError::EmptySecret`] when `secret` is empty.
pub fn hmac_sha256_base64(secret: &[u8], message: &str) -> Result<String, SignatureError> {
    if secret.is_empty() {
        return Err(SignatureError::EmptySecret);
    }
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret)
        .expect("HMAC accepts keys of any length");
    mac.update(message.as_bytes());
    let tag = mac.finalize().into_bytes();
    Ok(base64_encode(&tag))
}

/// Verifies that `signature` (base64) matches `HMAC-SHA256(secret, message)`.
#[must_use]
pub fn verify_hmac_sha256_base64(secret: &[u8], message: &str, signature: &str) -> bool {
    hmac_sha256_base64(secret, message)
        .map(|expected| constant_time_eq(expected.as_bytes(), signature.as_bytes()))
        .unwrap_or(false)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_round_trips() {
        let secret = b"super-secret";
        let message = signing_message("m-1", 1_700_000_000, "{\"a\":1}");
        let sig = hmac_sha256_base64(secret, &message).expect("signing succeeds");
        assert!(verify_hmac_sha256_base64(secret, &message, &sig));
    }

    #[test]
    fn signature_rejects_wrong_secret() {
        let message = signing_message("m-1", 1_700_000_000, "{\"a\":1}");
        let sig = hmac_sha256_base64(b"secret-one", &message).expect("signing succeeds");
        assert!(!verify_hmac_sha256_base64(b"secret-two", &message, &sig));
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert!(matches!(
            hmac_sha256_base64(b"", "m"),
            Err(SignatureError::EmptySecret)
        ));
    }
}
