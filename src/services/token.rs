//! Token factory: mints the signed credentials for a successful grant.
//!
//! For a `(client, grant, scope, subject)` the factory persists an
//! AccessToken record, signs the access JWT over it, and conditionally does
//! the same for a RefreshToken. Persistence always precedes signing: the
//! JWT's `jti` is the record id, and a bearer must never hold a token whose
//! record has not committed.

use chrono::{Duration, Utc};
use serde::Serialize;
use sqlx::MySqlPool;
use std::sync::Arc;

use crate::config::Config;
use crate::error::OAuthError;
use crate::models::{GrantType, OAuthClient};
use crate::repositories::{AccessTokenRepository, RefreshTokenRepository};
use crate::utils::jwt::{JwtManager, TokenClaims};

/// Request-scoped data captured at the HTTP boundary and passed in
/// explicitly: the issuer URL for the `iss` claim and the caller's
/// user-agent for the token record.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub base_url: String,
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn from_headers(headers: &axum::http::HeaderMap, fallback_host: &str) -> Self {
        let scheme = headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("http");
        let host = headers
            .get(axum::http::header::HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(fallback_host);
        let user_agent = headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        Self {
            base_url: format!("{}://{}", scheme, host),
            user_agent,
        }
    }
}

/// Successful token endpoint payload.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedTokens {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

#[derive(Clone)]
pub struct TokenFactory {
    access_repo: AccessTokenRepository,
    refresh_repo: RefreshTokenRepository,
    jwt_manager: JwtManager,
    config: Arc<Config>,
}

impl TokenFactory {
    pub fn new(pool: MySqlPool, jwt_manager: JwtManager, config: Arc<Config>) -> Self {
        Self {
            access_repo: AccessTokenRepository::new(pool.clone()),
            refresh_repo: RefreshTokenRepository::new(pool),
            jwt_manager,
            config,
        }
    }

    /// Mint the credentials for a grant the caller has already validated at
    /// the protocol level.
    ///
    /// A refresh token is issued iff the grant is neither `client_credentials`
    /// nor `implicit` and the client is confidential.
    pub async fn new_access_token(
        &self,
        client: &OAuthClient,
        grant: GrantType,
        scope: Option<&str>,
        subject: &str,
        ctx: &RequestContext,
    ) -> Result<IssuedTokens, OAuthError> {
        if !grant_permitted(client, grant) {
            return Err(OAuthError::UnauthorizedClient);
        }

        let access_ttl = self
            .config
            .access_token_ttl
            .lookup(client.is_confidential(), client.internal);
        let expires_at = Utc::now() + Duration::seconds(access_ttl);

        let scope = scope.map(str::trim).filter(|s| !s.is_empty());

        let record = self
            .access_repo
            .create(
                client.id,
                subject,
                &client.name,
                scope,
                expires_at,
                ctx.user_agent.as_deref(),
            )
            .await?;

        let claims = TokenClaims::new(
            &ctx.base_url,
            client.audience(),
            subject,
            &client.client_id,
            scope.map(String::from),
            record.id,
            record.expires_at,
        );
        let access_token = self.jwt_manager.sign(&claims)?;

        let refresh_token = if issues_refresh_token(client, grant) {
            let refresh_ttl = self
                .config
                .refresh_token_ttl
                .lookup(client.is_confidential(), client.internal);
            let refresh_expires_at = Utc::now() + Duration::seconds(refresh_ttl);

            let refresh_record = self.refresh_repo.create(record.id, refresh_expires_at).await?;

            let refresh_claims = TokenClaims::new(
                &ctx.base_url,
                client.audience(),
                subject,
                &client.client_id,
                None,
                refresh_record.id,
                refresh_record.expires_at,
            );
            Some(self.jwt_manager.sign(&refresh_claims)?)
        } else {
            None
        };

        Ok(IssuedTokens {
            access_token,
            token_type: self.config.oauth_token_type.clone(),
            expires_in: access_ttl,
            refresh_token,
        })
    }
}

/// Whether a client may exercise a grant.
///
/// The back-channel-only grants are gated on the client type: a client that
/// can hold a secret may trade it for tokens and rotate refresh tokens.
/// User-delegated grants consult the derived grant set.
fn grant_permitted(client: &OAuthClient, grant: GrantType) -> bool {
    match grant {
        GrantType::ClientCredentials | GrantType::RefreshToken => client.is_confidential(),
        other => client.has_grant(other),
    }
}

/// A refresh token accompanies the access token iff the grant is neither
/// `client_credentials` nor `implicit` and the client is confidential.
fn issues_refresh_token(client: &OAuthClient, grant: GrantType) -> bool {
    !matches!(grant, GrantType::ClientCredentials | GrantType::Implicit)
        && client.is_confidential()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClientProfile, ClientType};
    use chrono::Utc;
    use uuid::Uuid;

    fn client(client_type: ClientType, grants: Vec<GrantType>) -> OAuthClient {
        let now = Utc::now();
        OAuthClient {
            id: Uuid::new_v4(),
            client_id: "c1".to_string(),
            name: "Acme".to_string(),
            client_profile: match client_type {
                ClientType::Confidential => ClientProfile::Web,
                ClientType::Public => ClientProfile::Native,
            },
            client_type,
            secret_key: None,
            grants,
            redirect_uris: vec![],
            scope: "read write".to_string(),
            internal: false,
            domaine: None,
            logo: None,
            description: None,
            legal_terms_accepted_at: None,
            revoked_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_grant_permitted_checks_grant_set() {
        let c = client(
            ClientType::Confidential,
            vec![GrantType::Implicit, GrantType::AuthorizationCode],
        );
        assert!(grant_permitted(&c, GrantType::AuthorizationCode));
        assert!(!grant_permitted(&c, GrantType::Password));
    }

    #[test]
    fn test_back_channel_grants_are_confidential_only() {
        let confidential = client(ClientType::Confidential, vec![GrantType::AuthorizationCode]);
        assert!(grant_permitted(&confidential, GrantType::RefreshToken));
        assert!(grant_permitted(&confidential, GrantType::ClientCredentials));

        let public = client(ClientType::Public, vec![GrantType::AuthorizationCode]);
        assert!(!grant_permitted(&public, GrantType::RefreshToken));
        assert!(!grant_permitted(&public, GrantType::ClientCredentials));
    }

    #[test]
    fn test_refresh_token_issuance_rule() {
        let confidential = client(
            ClientType::Confidential,
            vec![
                GrantType::AuthorizationCode,
                GrantType::Password,
                GrantType::ClientCredentials,
            ],
        );
        assert!(issues_refresh_token(&confidential, GrantType::AuthorizationCode));
        assert!(issues_refresh_token(&confidential, GrantType::Password));
        assert!(issues_refresh_token(&confidential, GrantType::RefreshToken));
        assert!(!issues_refresh_token(&confidential, GrantType::ClientCredentials));
        assert!(!issues_refresh_token(&confidential, GrantType::Implicit));

        let public = client(ClientType::Public, vec![GrantType::AuthorizationCode]);
        assert!(!issues_refresh_token(&public, GrantType::AuthorizationCode));
    }

    #[test]
    fn test_request_context_from_headers() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(axum::http::header::HOST, "auth.example.com".parse().unwrap());
        headers.insert("x-forwarded-proto", "https".parse().unwrap());
        headers.insert(axum::http::header::USER_AGENT, "curl/8.0".parse().unwrap());

        let ctx = RequestContext::from_headers(&headers, "127.0.0.1:3000");
        assert_eq!(ctx.base_url, "https://auth.example.com");
        assert_eq!(ctx.user_agent.as_deref(), Some("curl/8.0"));

        let ctx = RequestContext::from_headers(&axum::http::HeaderMap::new(), "127.0.0.1:3000");
        assert_eq!(ctx.base_url, "http://127.0.0.1:3000");
        assert_eq!(ctx.user_agent, None);
    }
}
