//! Request/response shapes for the OAuth endpoints.
//!
//! Follows RFC 6749 (OAuth 2.0) and RFC 7636 (PKCE). Every field the
//! protocol marks conditional is optional here; requiredness is enforced in
//! the flow logic so that a missing field maps to the right protocol error
//! instead of a framework rejection.

use serde::{Deserialize, Serialize};

use crate::services::token::IssuedTokens;

/// Query parameters of GET /oauth/authorize.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeRequest {
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

/// Query parameters of GET /oauth/dialog.
#[derive(Debug, Clone, Deserialize)]
pub struct DialogRequest {
    /// Sealed payload handed out by the authorization endpoint.
    pub p: String,
}

/// Form body of POST /oauth/authorize (the dialog decision).
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeDecisionRequest {
    pub p: String,
    /// "allow" to grant; anything else cancels.
    pub decision: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Form body of POST /oauth/token.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub scope: Option<String>,
}

/// Success body of POST /oauth/token.
#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl From<IssuedTokens> for TokenResponse {
    fn from(issued: IssuedTokens) -> Self {
        Self {
            access_token: issued.access_token,
            token_type: issued.token_type,
            expires_in: issued.expires_in,
            refresh_token: issued.refresh_token,
        }
    }
}
