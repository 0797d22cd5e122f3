//! PKCE (Proof Key for Code Exchange) verification, RFC 7636.
//!
//! An authorization code created with a `code_challenge` can only be redeemed
//! by the party holding the matching `code_verifier`.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::utils::secret::constant_time_compare;

/// Minimum length for code_verifier as per RFC 7636
pub const CODE_VERIFIER_MIN_LENGTH: usize = 43;

/// Maximum length for code_verifier as per RFC 7636
pub const CODE_VERIFIER_MAX_LENGTH: usize = 128;

/// Transformation applied to the code verifier before comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeChallengeMethod {
    #[serde(rename = "plain")]
    Plain,
    S256,
}

impl CodeChallengeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeChallengeMethod::Plain => "plain",
            CodeChallengeMethod::S256 => "S256",
        }
    }
}

impl fmt::Display for CodeChallengeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodeChallengeMethod {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(CodeChallengeMethod::Plain),
            "S256" => Ok(CodeChallengeMethod::S256),
            _ => Err(()),
        }
    }
}

/// Verify a code_verifier against the stored code_challenge.
///
/// `S256` hashes the verifier and compares the base64url form; `plain`
/// compares byte-for-byte. Both comparisons are constant time.
pub fn verify_code_verifier(
    method: CodeChallengeMethod,
    code_verifier: &str,
    code_challenge: &str,
) -> bool {
    match method {
        CodeChallengeMethod::S256 => {
            let computed = compute_s256_challenge(code_verifier);
            constant_time_compare(&computed, code_challenge)
        }
        CodeChallengeMethod::Plain => constant_time_compare(code_verifier, code_challenge),
    }
}

/// Compute the S256 transform: `base64url(SHA-256(ASCII(verifier)))`, no padding.
pub fn compute_s256_challenge(code_verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code_verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Validate code_verifier format according to RFC 7636: 43..=128 characters
/// drawn from the unreserved URI set.
pub fn validate_code_verifier(verifier: &str) -> bool {
    let len = verifier.len();
    if !(CODE_VERIFIER_MIN_LENGTH..=CODE_VERIFIER_MAX_LENGTH).contains(&len) {
        return false;
    }

    verifier
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_' || c == '~')
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test vector from RFC 7636 Appendix B
    const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

    #[test]
    fn test_compute_s256_challenge_rfc_vector() {
        assert_eq!(compute_s256_challenge(VERIFIER), CHALLENGE);
    }

    #[test]
    fn test_verify_s256_valid() {
        assert!(verify_code_verifier(CodeChallengeMethod::S256, VERIFIER, CHALLENGE));
    }

    #[test]
    fn test_verify_s256_wrong_verifier() {
        assert!(!verify_code_verifier(
            CodeChallengeMethod::S256,
            "wrong_verifier_that_is_long_enough_to_check",
            CHALLENGE
        ));
    }

    #[test]
    fn test_verify_plain() {
        let v = "my_plain_code_verifier_that_is_at_least_43_chars";
        assert!(verify_code_verifier(CodeChallengeMethod::Plain, v, v));
        assert!(!verify_code_verifier(CodeChallengeMethod::Plain, v, CHALLENGE));
    }

    #[test]
    fn test_method_from_str() {
        assert_eq!("S256".parse::<CodeChallengeMethod>(), Ok(CodeChallengeMethod::S256));
        assert_eq!("plain".parse::<CodeChallengeMethod>(), Ok(CodeChallengeMethod::Plain));
        // Case matters: RFC 7636 registers "S256", not "s256"
        assert!("s256".parse::<CodeChallengeMethod>().is_err());
        assert!("S512".parse::<CodeChallengeMethod>().is_err());
    }

    #[test]
    fn test_validate_code_verifier_length_bounds() {
        assert!(validate_code_verifier(&"a".repeat(43)));
        assert!(validate_code_verifier(&"a".repeat(128)));
        assert!(!validate_code_verifier(&"a".repeat(42)));
        assert!(!validate_code_verifier(&"a".repeat(129)));
    }

    #[test]
    fn test_validate_code_verifier_charset() {
        assert!(validate_code_verifier("abcABC123-._~abcABC123-._~abcABC123-._~abcd"));
        assert!(!validate_code_verifier(
            "abcdefghijklmnopqrstuvwxyz0123456789+abcdef"
        ));
        assert!(!validate_code_verifier(
            "abcdefghijklmnopqrstuvwxyz0123456789 abcdef"
        ));
    }
}
