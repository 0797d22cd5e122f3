//! JWT signing and verification for issued credentials.
//!
//! Access and refresh tokens are compact JWS over the claim set
//! `{iss, aud, azp, sub, client_id, scope?, jti, exp}`. The `jti` is the
//! identifier of the persisted token record, which is how revocation finds
//! the record backing a presented token.

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::OAuthError;

/// Claim set carried by both access and refresh tokens.
///
/// `scope` is present on access tokens only. `aud` and `azp` are the client's
/// registered domain when it has one, otherwise the `client_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenClaims {
    /// Issuer - the server's own base URL
    pub iss: String,
    /// Audience
    pub aud: String,
    /// Authorized party
    pub azp: String,
    /// Subject - user id, or client_id for client_credentials
    pub sub: String,
    /// The client the token was issued to
    pub client_id: String,
    /// Granted scope (access tokens only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Identifier of the persisted token record
    pub jti: String,
    /// Expiration timestamp (Unix timestamp)
    pub exp: i64,
}

impl TokenClaims {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        issuer: &str,
        audience: &str,
        subject: &str,
        client_id: &str,
        scope: Option<String>,
        jti: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            iss: issuer.to_string(),
            aud: audience.to_string(),
            azp: audience.to_string(),
            sub: subject.to_string(),
            client_id: client_id.to_string(),
            scope,
            jti: jti.to_string(),
            exp: expires_at.timestamp(),
        }
    }

    /// The persisted record id backing this token.
    pub fn record_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.jti).ok()
    }
}

/// Signs and verifies token JWTs with the configured algorithm.
///
/// Symmetric (HS*) managers sign and verify with the shared secret;
/// asymmetric families take PEM key material for both directions.
#[derive(Clone)]
pub struct JwtManager {
    algorithm: Algorithm,
    encoding_key: Arc<EncodingKey>,
    decoding_key: Arc<DecodingKey>,
}

impl JwtManager {
    /// Create a manager for an HMAC (HS256/HS384/HS512) algorithm.
    pub fn from_secret(algorithm: Algorithm, secret: &str) -> anyhow::Result<Self> {
        if !matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            anyhow::bail!("{:?} requires PEM key material, not a shared secret", algorithm);
        }

        Ok(Self {
            algorithm,
            encoding_key: Arc::new(EncodingKey::from_secret(secret.as_bytes())),
            decoding_key: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
        })
    }

    /// Create a manager for an asymmetric algorithm from PEM key material.
    pub fn from_pem(
        algorithm: Algorithm,
        private_key_pem: &str,
        public_key_pem: &str,
    ) -> anyhow::Result<Self> {
        let (encoding_key, decoding_key) = match algorithm {
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => (
                EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
                    .map_err(|e| anyhow::anyhow!("Invalid RSA private key: {}", e))?,
                DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
                    .map_err(|e| anyhow::anyhow!("Invalid RSA public key: {}", e))?,
            ),
            Algorithm::ES256 | Algorithm::ES384 => (
                EncodingKey::from_ec_pem(private_key_pem.as_bytes())
                    .map_err(|e| anyhow::anyhow!("Invalid EC private key: {}", e))?,
                DecodingKey::from_ec_pem(public_key_pem.as_bytes())
                    .map_err(|e| anyhow::anyhow!("Invalid EC public key: {}", e))?,
            ),
            Algorithm::EdDSA => (
                EncodingKey::from_ed_pem(private_key_pem.as_bytes())
                    .map_err(|e| anyhow::anyhow!("Invalid Ed25519 private key: {}", e))?,
                DecodingKey::from_ed_pem(public_key_pem.as_bytes())
                    .map_err(|e| anyhow::anyhow!("Invalid Ed25519 public key: {}", e))?,
            ),
            hs => anyhow::bail!("{:?} takes a shared secret, not PEM key material", hs),
        };

        Ok(Self {
            algorithm,
            encoding_key: Arc::new(encoding_key),
            decoding_key: Arc::new(decoding_key),
        })
    }

    /// Parse an algorithm name (`HS512`, `RS256`, ...) from configuration.
    pub fn parse_algorithm(name: &str) -> anyhow::Result<Algorithm> {
        Algorithm::from_str(name).map_err(|_| anyhow::anyhow!("Unknown JWT algorithm: {}", name))
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Produce the compact JWS for a claim set.
    pub fn sign(&self, claims: &TokenClaims) -> Result<String, OAuthError> {
        let header = Header::new(self.algorithm);
        encode(&header, claims, &self.encoding_key)
            .map_err(|e| OAuthError::ServerError(format!("Token signing failed: {}", e)))
    }

    /// Verify signature and expiry, returning the embedded claims.
    ///
    /// Audience is per-client and checked against the store by the caller,
    /// not here.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, OAuthError> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = true;
        validation.validate_aud = false;

        decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| OAuthError::InvalidGrant("Invalid or expired token".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn manager() -> JwtManager {
        JwtManager::from_secret(Algorithm::HS256, "test-signing-secret").unwrap()
    }

    fn claims(expires_at: DateTime<Utc>) -> TokenClaims {
        TokenClaims::new(
            "https://auth.example.com",
            "https://app.example.com",
            "u1",
            "c1",
            Some("read write".to_string()),
            Uuid::new_v4(),
            expires_at,
        )
    }

    #[test]
    fn test_sign_verify_roundtrip() {
        let manager = manager();
        let claims = claims(Utc::now() + Duration::hours(1));

        let token = manager.sign(&claims).unwrap();
        let decoded = manager.verify(&token).unwrap();

        assert_eq!(decoded, claims);
    }

    #[test]
    fn test_expired_token_rejected() {
        let manager = manager();
        let claims = claims(Utc::now() - Duration::hours(1));

        let token = manager.sign(&claims).unwrap();
        assert!(manager.verify(&token).is_err());
    }

    #[test]
    fn test_tampered_token_rejected() {
        let manager = manager();
        let token = manager.sign(&claims(Utc::now() + Duration::hours(1))).unwrap();

        let mut tampered = token.clone();
        tampered.pop();
        assert!(manager.verify(&tampered).is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = manager().sign(&claims(Utc::now() + Duration::hours(1))).unwrap();

        let other = JwtManager::from_secret(Algorithm::HS256, "another-secret").unwrap();
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn test_refresh_claims_omit_scope() {
        let manager = manager();
        let mut c = claims(Utc::now() + Duration::hours(1));
        c.scope = None;

        let token = manager.sign(&c).unwrap();
        // The serialized payload must not carry a null scope member
        let payload = token.split('.').nth(1).unwrap();
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
        let json = String::from_utf8(URL_SAFE_NO_PAD.decode(payload).unwrap()).unwrap();
        assert!(!json.contains("\"scope\""));

        assert_eq!(manager.verify(&token).unwrap().scope, None);
    }

    #[test]
    fn test_record_id_resolves_jti() {
        let id = Uuid::new_v4();
        let c = TokenClaims::new(
            "https://auth.example.com",
            "c1",
            "c1",
            "c1",
            None,
            id,
            Utc::now() + Duration::hours(1),
        );
        assert_eq!(c.record_id(), Some(id));
    }

    #[test]
    fn test_from_secret_rejects_asymmetric_algorithms() {
        assert!(JwtManager::from_secret(Algorithm::RS256, "secret").is_err());
    }

    #[test]
    fn test_parse_algorithm() {
        assert_eq!(JwtManager::parse_algorithm("HS512").unwrap(), Algorithm::HS512);
        assert!(JwtManager::parse_algorithm("none").is_err());
    }
}
