//! Client secret derivation and verification
//!
//! Client secrets are not stored: they are derived from the client identifier
//! with a keyed MAC over the process-wide `OAUTH_SECRET_KEY`. Verification
//! recomputes the MAC and compares in constant time, so a secret can be
//! checked (or re-issued) from the `client_id` alone.

use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha384, Sha512};
use std::fmt;
use std::str::FromStr;

use crate::error::ClientError;

/// HMAC algorithm used for client secret derivation.
///
/// Selected by the `OAUTH_HMAC_ALGORITHM` configuration value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HmacAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl HmacAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            HmacAlgorithm::Sha256 => "sha256",
            HmacAlgorithm::Sha384 => "sha384",
            HmacAlgorithm::Sha512 => "sha512",
        }
    }
}

impl fmt::Display for HmacAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HmacAlgorithm {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" => Ok(HmacAlgorithm::Sha256),
            "sha384" => Ok(HmacAlgorithm::Sha384),
            "sha512" => Ok(HmacAlgorithm::Sha512),
            other => Err(ClientError::InternalError(anyhow::anyhow!(
                "Unsupported HMAC algorithm: {}",
                other
            ))),
        }
    }
}

/// Derive the secret for a client: `HMAC(algorithm, key, client_id)`, hex-encoded.
///
/// The derivation is deterministic, so the same `(key, client_id)` pair always
/// yields the same secret.
pub fn derive_client_secret(algorithm: HmacAlgorithm, key: &[u8], client_id: &str) -> String {
    let tag = match algorithm {
        HmacAlgorithm::Sha256 => {
            let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts any key length");
            mac.update(client_id.as_bytes());
            mac.finalize().into_bytes().to_vec()
        }
        HmacAlgorithm::Sha384 => {
            let mut mac = Hmac::<Sha384>::new_from_slice(key).expect("HMAC accepts any key length");
            mac.update(client_id.as_bytes());
            mac.finalize().into_bytes().to_vec()
        }
        HmacAlgorithm::Sha512 => {
            let mut mac = Hmac::<Sha512>::new_from_slice(key).expect("HMAC accepts any key length");
            mac.update(client_id.as_bytes());
            mac.finalize().into_bytes().to_vec()
        }
    };

    hex::encode(tag)
}

/// Verify a presented secret against the derivation for `client_id`.
///
/// Recomputes the MAC and compares in constant time.
pub fn verify_client_secret(
    algorithm: HmacAlgorithm,
    key: &[u8],
    client_id: &str,
    candidate: &str,
) -> bool {
    let expected = derive_client_secret(algorithm, key, client_id);
    constant_time_compare(&expected, candidate)
}

/// Derivation parameters bundled for call sites: the configured algorithm
/// plus the process-wide key.
#[derive(Clone)]
pub struct SecretDerivation {
    algorithm: HmacAlgorithm,
    key: Vec<u8>,
}

impl SecretDerivation {
    pub fn new(algorithm: HmacAlgorithm, key: &str) -> Self {
        Self {
            algorithm,
            key: key.as_bytes().to_vec(),
        }
    }

    pub fn derive(&self, client_id: &str) -> String {
        derive_client_secret(self.algorithm, &self.key, client_id)
    }

    pub fn verify(&self, client_id: &str, candidate: &str) -> bool {
        verify_client_secret(self.algorithm, &self.key, client_id, candidate)
    }

    /// The key also authenticates the dialog payload.
    pub fn key(&self) -> &[u8] {
        &self.key
    }
}

/// Default length for generated opaque values (256 bits of entropy).
pub const DEFAULT_TOKEN_LENGTH: usize = 43;

/// Generate a random URL-safe opaque value (authorization codes, client ids).
pub fn generate_opaque_token(length: usize) -> String {
    use rand::Rng;

    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Constant-time string comparison to prevent timing attacks
pub(crate) fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const KEY: &[u8] = b"test-oauth-secret-key";

    #[test]
    fn test_derive_is_deterministic() {
        let a = derive_client_secret(HmacAlgorithm::Sha512, KEY, "c1");
        let b = derive_client_secret(HmacAlgorithm::Sha512, KEY, "c1");
        assert_eq!(a, b);
    }

    #[test]
    fn test_derive_is_hex_encoded() {
        let secret = derive_client_secret(HmacAlgorithm::Sha256, KEY, "c1");
        assert_eq!(secret.len(), 64); // SHA-256 tag, hex
        assert!(secret.chars().all(|c| c.is_ascii_hexdigit()));

        let secret = derive_client_secret(HmacAlgorithm::Sha512, KEY, "c1");
        assert_eq!(secret.len(), 128); // SHA-512 tag, hex
    }

    #[test]
    fn test_verify_roundtrip() {
        let secret = derive_client_secret(HmacAlgorithm::Sha512, KEY, "c1");
        assert!(verify_client_secret(HmacAlgorithm::Sha512, KEY, "c1", &secret));
    }

    #[test]
    fn test_verify_rejects_other_client() {
        let secret = derive_client_secret(HmacAlgorithm::Sha512, KEY, "c1");
        assert!(!verify_client_secret(HmacAlgorithm::Sha512, KEY, "c2", &secret));
    }

    #[test]
    fn test_verify_rejects_other_key() {
        let secret = derive_client_secret(HmacAlgorithm::Sha512, KEY, "c1");
        assert!(!verify_client_secret(
            HmacAlgorithm::Sha512,
            b"another-key",
            "c1",
            &secret
        ));
    }

    #[test]
    fn test_algorithms_diverge() {
        let sha256 = derive_client_secret(HmacAlgorithm::Sha256, KEY, "c1");
        let sha512 = derive_client_secret(HmacAlgorithm::Sha512, KEY, "c1");
        assert_ne!(sha256, sha512);
    }

    #[test]
    fn test_algorithm_from_str() {
        assert_eq!("sha512".parse::<HmacAlgorithm>().unwrap(), HmacAlgorithm::Sha512);
        assert_eq!("SHA256".parse::<HmacAlgorithm>().unwrap(), HmacAlgorithm::Sha256);
        assert!("md5".parse::<HmacAlgorithm>().is_err());
    }

    #[test]
    fn test_generate_opaque_token_charset() {
        let token = generate_opaque_token(DEFAULT_TOKEN_LENGTH);
        assert_eq!(token.len(), DEFAULT_TOKEN_LENGTH);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_secret_derivation_bundle() {
        let derivation = SecretDerivation::new(HmacAlgorithm::Sha512, "test-oauth-secret-key");
        let secret = derivation.derive("c1");
        assert!(derivation.verify("c1", &secret));
        assert!(!derivation.verify("c2", &secret));
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("hello", "hello"));
        assert!(!constant_time_compare("hello", "world"));
        assert!(!constant_time_compare("hello", "hell"));
    }

    proptest! {
        #[test]
        fn prop_derived_secret_verifies_for_its_client(client_id in "[a-zA-Z0-9-]{1,40}") {
            let secret = derive_client_secret(HmacAlgorithm::Sha512, KEY, &client_id);
            prop_assert!(verify_client_secret(HmacAlgorithm::Sha512, KEY, &client_id, &secret));
        }

        #[test]
        fn prop_derived_secret_rejects_any_other_client(
            a in "[a-zA-Z0-9-]{1,40}",
            b in "[a-zA-Z0-9-]{1,40}",
        ) {
            prop_assume!(a != b);
            let secret = derive_client_secret(HmacAlgorithm::Sha512, KEY, &a);
            prop_assert!(!verify_client_secret(HmacAlgorithm::Sha512, KEY, &b, &secret));
        }
    }
}
