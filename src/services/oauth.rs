//! OAuth flow orchestration.
//!
//! Front channel: validate the authorize request, persist a pending
//! authorization code, hand the user agent to the login dialog, and turn the
//! dialog decision into a code (or error) redirect.
//!
//! Back channel: authenticate the client, dispatch on `grant_type`, and let
//! the token factory mint the response.

use sqlx::MySqlPool;
use std::sync::Arc;

use crate::config::{AppState, Config};
use crate::dto::oauth::TokenRequest;
use crate::error::OAuthError;
use crate::models::{AuthorizationCode, GrantType, OAuthClient};
use crate::repositories::{
    AccessTokenRepository, AuthorizationCodeRepository, OAuthClientRepository,
    RefreshTokenRepository,
};
use crate::services::auth::UserAuthService;
use crate::services::scope;
use crate::services::token::{IssuedTokens, RequestContext, TokenFactory};
use crate::utils::jwt::JwtManager;
use crate::utils::payload::{seal, unseal, DialogPayload};
use crate::utils::pkce::{validate_code_verifier, verify_code_verifier, CodeChallengeMethod};
use crate::utils::secret::SecretDerivation;

/// How a failed front-channel request is reported.
///
/// Before the `redirect_uri` has been matched against the client's
/// registration it cannot be trusted, so those failures render an error page.
/// Afterwards the error travels back on the redirect per RFC 6749 §4.1.2.1.
#[derive(Debug)]
pub enum AuthorizeRejection {
    Page(OAuthError),
    Redirect {
        redirect_uri: String,
        error: OAuthError,
        state: Option<String>,
    },
}

/// What the login dialog needs to render.
#[derive(Debug, Clone)]
pub struct DialogContext {
    pub client_name: String,
    pub scope: Option<String>,
    pub sealed_payload: String,
}

/// Outcome of the dialog decision.
#[derive(Debug)]
pub enum DecisionResult {
    Granted {
        redirect_uri: String,
        code: String,
        state: Option<String>,
    },
    Denied {
        redirect_uri: String,
        state: Option<String>,
    },
    /// Credentials did not check out; the dialog is re-rendered and the code
    /// stays pending.
    InvalidCredentials { context: DialogContext },
}

#[derive(Clone)]
pub struct OAuthService {
    client_repo: OAuthClientRepository,
    code_repo: AuthorizationCodeRepository,
    access_repo: AccessTokenRepository,
    refresh_repo: RefreshTokenRepository,
    auth_service: UserAuthService,
    token_factory: TokenFactory,
    jwt_manager: JwtManager,
    secrets: SecretDerivation,
    config: Arc<Config>,
}

impl OAuthService {
    pub fn new(pool: MySqlPool, jwt_manager: JwtManager, config: Arc<Config>) -> Self {
        let secrets = SecretDerivation::new(config.oauth_hmac_algorithm, &config.oauth_secret_key);

        Self {
            client_repo: OAuthClientRepository::new(pool.clone()),
            code_repo: AuthorizationCodeRepository::new(pool.clone()),
            access_repo: AccessTokenRepository::new(pool.clone()),
            refresh_repo: RefreshTokenRepository::new(pool.clone()),
            auth_service: UserAuthService::new(pool.clone()),
            token_factory: TokenFactory::new(pool, jwt_manager.clone(), config.clone()),
            jwt_manager,
            secrets,
            config,
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(state.pool.clone(), state.jwt_manager.clone(), state.config.clone())
    }

    // ========================================================================
    // Front channel
    // ========================================================================

    /// Validate an authorize request and persist the pending authorization
    /// code. Returns the sealed payload the dialog resumes from.
    #[allow(clippy::too_many_arguments)]
    pub async fn begin_authorization(
        &self,
        response_type: Option<&str>,
        client_id: Option<&str>,
        redirect_uri: Option<&str>,
        requested_scope: Option<&str>,
        state: Option<&str>,
        code_challenge: Option<&str>,
        code_challenge_method: Option<&str>,
    ) -> Result<String, AuthorizeRejection> {
        let client_id = client_id
            .filter(|s| !s.is_empty())
            .ok_or_else(|| page(OAuthError::InvalidRequest("client_id is required".to_string())))?;

        let client = self
            .client_repo
            .find_by_client_id(client_id)
            .await
            .map_err(page)?
            .ok_or_else(|| page(OAuthError::InvalidClient))?;
        if client.is_revoked() {
            return Err(page(OAuthError::InvalidClient));
        }

        let redirect_uri = redirect_uri
            .filter(|s| !s.is_empty())
            .ok_or_else(|| page(OAuthError::InvalidRequest("redirect_uri is required".to_string())))?;
        if !client.has_redirect_uri(redirect_uri) {
            return Err(page(OAuthError::InvalidRequest(
                "redirect_uri is not registered for this client".to_string(),
            )));
        }

        // The redirect target is trusted from here on
        let redirect = |error: OAuthError| AuthorizeRejection::Redirect {
            redirect_uri: redirect_uri.to_string(),
            error,
            state: state.map(String::from),
        };

        if response_type != Some("code") {
            return Err(redirect(OAuthError::InvalidRequest(
                "response_type must be code".to_string(),
            )));
        }

        let challenge_method = match code_challenge_method {
            Some(method) => Some(method.parse::<CodeChallengeMethod>().map_err(|_| {
                redirect(OAuthError::InvalidRequest(
                    "code_challenge_method must be plain or S256".to_string(),
                ))
            })?),
            None => None,
        };

        if let Some(requested) = requested_scope {
            if !scope::validate(&client.scope, requested) {
                return Err(redirect(OAuthError::InvalidScope(
                    "Requested scope exceeds the client's scope".to_string(),
                )));
            }
        }

        let code = self
            .code_repo
            .create(
                client.id,
                redirect_uri,
                requested_scope,
                state,
                code_challenge,
                challenge_method,
                self.config.authorization_code_ttl_secs,
            )
            .await
            .map_err(redirect)?;

        seal(&DialogPayload::new(code.id), self.secrets.key()).map_err(redirect)
    }

    /// Recover the pending authorization behind a sealed payload so the
    /// dialog can render.
    pub async fn dialog_context(&self, sealed_payload: &str) -> Result<DialogContext, OAuthError> {
        let (code, client) = self.load_pending(sealed_payload).await?;

        Ok(DialogContext {
            client_name: client.name,
            scope: code.scope,
            sealed_payload: sealed_payload.to_string(),
        })
    }

    /// Apply the dialog decision to the pending authorization code.
    pub async fn decide(
        &self,
        sealed_payload: &str,
        decision: Option<&str>,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<DecisionResult, AuthorizeRejection> {
        let (code, client) = self.load_pending(sealed_payload).await.map_err(page)?;

        let redirect = |error: OAuthError| AuthorizeRejection::Redirect {
            redirect_uri: code.redirect_uri.clone(),
            error,
            state: code.state.clone(),
        };

        if decision != Some("allow") {
            return Ok(DecisionResult::Denied {
                redirect_uri: code.redirect_uri.clone(),
                state: code.state.clone(),
            });
        }

        let retry = || DecisionResult::InvalidCredentials {
            context: DialogContext {
                client_name: client.name.clone(),
                scope: code.scope.clone(),
                sealed_payload: sealed_payload.to_string(),
            },
        };

        let (Some(username), Some(password)) = (username, password) else {
            return Ok(retry());
        };

        let user = match self.auth_service.authenticate(username, password).await {
            Ok(Some(user)) => user,
            Ok(None) => return Ok(retry()),
            Err(e) => return Err(redirect(e)),
        };

        let resolved = scope::merge(&user.scope, code.scope.as_deref(), &client.scope)
            .ok_or_else(|| {
                redirect(OAuthError::InvalidScope(
                    "Requested scope exceeds the client's scope".to_string(),
                ))
            })?;

        self.code_repo
            .attach_grant(code.id, user.id, &resolved)
            .await
            .map_err(redirect)?;

        Ok(DecisionResult::Granted {
            redirect_uri: code.redirect_uri.clone(),
            code: code.authorization_code.clone(),
            state: code.state.clone(),
        })
    }

    async fn load_pending(
        &self,
        sealed_payload: &str,
    ) -> Result<(AuthorizationCode, OAuthClient), OAuthError> {
        let payload = unseal(sealed_payload, self.secrets.key())?;

        let code = self
            .code_repo
            .find_by_id(payload.oauth_auth_code_id)
            .await?
            .ok_or_else(|| OAuthError::InvalidGrant("Unknown authorization request".to_string()))?;

        if code.is_revoked() {
            return Err(OAuthError::InvalidGrant(
                "Authorization request has been consumed".to_string(),
            ));
        }
        if code.is_expired() {
            return Err(OAuthError::InvalidGrant(
                "Authorization request has expired".to_string(),
            ));
        }

        let client = self
            .client_repo
            .find_by_id(code.client_id)
            .await?
            .ok_or(OAuthError::InvalidClient)?;
        if client.is_revoked() {
            return Err(OAuthError::InvalidClient);
        }

        Ok((code, client))
    }

    // ========================================================================
    // Back channel
    // ========================================================================

    /// Handle a token request: authenticate the client, dispatch on
    /// `grant_type`, and mint the response.
    ///
    /// `basic` carries credentials from the Authorization header; they take
    /// precedence over the body fields.
    pub async fn token(
        &self,
        basic: Option<(String, String)>,
        request: &TokenRequest,
        ctx: &RequestContext,
    ) -> Result<IssuedTokens, OAuthError> {
        let (client_id, client_secret) = match basic {
            Some((id, secret)) => (Some(id), Some(secret)),
            None => (request.client_id.clone(), request.client_secret.clone()),
        };

        let client_id = client_id
            .filter(|s| !s.is_empty())
            .ok_or_else(|| OAuthError::InvalidRequest("client_id is required".to_string()))?;

        let client = self
            .client_repo
            .find_by_client_id(&client_id)
            .await?
            .ok_or(OAuthError::InvalidClient)?;
        if client.is_revoked() {
            return Err(OAuthError::InvalidClient);
        }

        if let Some(requested) = request.scope.as_deref() {
            if !scope::validate(&client.scope, requested) {
                return Err(OAuthError::InvalidScope(
                    "Requested scope exceeds the client's scope".to_string(),
                ));
            }
        }

        if client.is_confidential() {
            let secret = client_secret
                .filter(|s| !s.is_empty())
                .ok_or_else(|| OAuthError::InvalidRequest("client_secret is required".to_string()))?;
            if !self.secrets.verify(&client.client_id, &secret) {
                return Err(OAuthError::InvalidClient);
            }
        }

        let grant_type = request
            .grant_type
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| OAuthError::InvalidRequest("grant_type is required".to_string()))?;

        match grant_type {
            "authorization_code" => self.grant_authorization_code(&client, request, ctx).await,
            "client_credentials" => self.grant_client_credentials(&client, request, ctx).await,
            "password" => self.grant_password(&client, request, ctx).await,
            "refresh_token" => self.grant_refresh_token(&client, request, ctx).await,
            _ => Err(OAuthError::UnsupportedGrantType),
        }
    }

    async fn grant_authorization_code(
        &self,
        client: &OAuthClient,
        request: &TokenRequest,
        ctx: &RequestContext,
    ) -> Result<IssuedTokens, OAuthError> {
        let code_value = request
            .code
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| OAuthError::InvalidRequest("code is required".to_string()))?;

        let code = self
            .code_repo
            .find_by_client_and_code(client.id, code_value)
            .await?
            .ok_or_else(|| OAuthError::InvalidGrant("Invalid authorization code".to_string()))?;

        if code.is_expired() {
            return Err(OAuthError::InvalidGrant(
                "Authorization code has expired".to_string(),
            ));
        }
        if code.is_revoked() {
            return Err(OAuthError::InvalidGrant(
                "Authorization code has already been redeemed".to_string(),
            ));
        }

        let redirect_uri = request
            .redirect_uri
            .as_deref()
            .ok_or_else(|| OAuthError::InvalidRequest("redirect_uri is required".to_string()))?;
        if redirect_uri != code.redirect_uri {
            return Err(OAuthError::InvalidGrant(
                "redirect_uri does not match the authorization request".to_string(),
            ));
        }

        if let Some(challenge) = code.code_challenge.as_deref() {
            let verifier = request
                .code_verifier
                .as_deref()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| OAuthError::InvalidRequest("code_verifier is required".to_string()))?;

            // Absent method means the client registered a plain challenge
            let method = code.code_challenge_method.unwrap_or(CodeChallengeMethod::Plain);
            if method == CodeChallengeMethod::S256 && !validate_code_verifier(verifier) {
                return Err(OAuthError::InvalidGrant(
                    "Malformed code_verifier".to_string(),
                ));
            }
            if !verify_code_verifier(method, verifier, challenge) {
                return Err(OAuthError::InvalidGrant(
                    "code_verifier does not match the challenge".to_string(),
                ));
            }
        }

        let subject = code
            .user_id
            .ok_or_else(|| OAuthError::InvalidGrant("Authorization was not completed".to_string()))?;

        // Single redemption: the conditional revoke commits before minting,
        // so a concurrent request for the same code loses here.
        self.code_repo.consume(code.id).await?;

        self.token_factory
            .new_access_token(
                client,
                GrantType::AuthorizationCode,
                code.scope.as_deref(),
                &subject.to_string(),
                ctx,
            )
            .await
    }

    async fn grant_client_credentials(
        &self,
        client: &OAuthClient,
        request: &TokenRequest,
        ctx: &RequestContext,
    ) -> Result<IssuedTokens, OAuthError> {
        if !client.is_confidential() {
            return Err(OAuthError::UnauthorizedClient);
        }

        // The client is its own principal
        let resolved = scope::merge(&client.scope, request.scope.as_deref(), &client.scope)
            .ok_or_else(|| {
                OAuthError::InvalidScope("Requested scope exceeds the client's scope".to_string())
            })?;

        self.token_factory
            .new_access_token(
                client,
                GrantType::ClientCredentials,
                Some(&resolved),
                &client.client_id,
                ctx,
            )
            .await
    }

    async fn grant_password(
        &self,
        client: &OAuthClient,
        request: &TokenRequest,
        ctx: &RequestContext,
    ) -> Result<IssuedTokens, OAuthError> {
        let username = request
            .username
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| OAuthError::InvalidRequest("username is required".to_string()))?;
        let password = request
            .password
            .as_deref()
            .ok_or_else(|| OAuthError::InvalidRequest("password is required".to_string()))?;

        let user = self
            .auth_service
            .authenticate(username, password)
            .await?
            .ok_or_else(|| OAuthError::InvalidGrant("Invalid resource owner credentials".to_string()))?;

        let resolved = scope::merge(&user.scope, request.scope.as_deref(), &client.scope)
            .ok_or_else(|| {
                OAuthError::InvalidScope("Requested scope exceeds the client's scope".to_string())
            })?;

        self.token_factory
            .new_access_token(
                client,
                GrantType::Password,
                Some(&resolved),
                &user.id.to_string(),
                ctx,
            )
            .await
    }

    async fn grant_refresh_token(
        &self,
        client: &OAuthClient,
        request: &TokenRequest,
        ctx: &RequestContext,
    ) -> Result<IssuedTokens, OAuthError> {
        let presented = request
            .refresh_token
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| OAuthError::InvalidRequest("refresh_token is required".to_string()))?;

        let claims = self.jwt_manager.verify(presented)?;
        let record_id = claims
            .record_id()
            .ok_or_else(|| OAuthError::InvalidGrant("Invalid refresh token".to_string()))?;

        let refresh = self
            .refresh_repo
            .find_by_id(record_id)
            .await?
            .ok_or_else(|| OAuthError::InvalidGrant("Invalid refresh token".to_string()))?;

        if refresh.is_expired() {
            return Err(OAuthError::InvalidGrant("Refresh token has expired".to_string()));
        }
        if refresh.is_revoked() {
            return Err(OAuthError::InvalidGrant("Refresh token has been revoked".to_string()));
        }

        let parent = self
            .access_repo
            .find_by_id(refresh.access_token_id)
            .await?
            .ok_or_else(|| OAuthError::InvalidGrant("Invalid refresh token".to_string()))?;

        if parent.client_id != client.id {
            return Err(OAuthError::InvalidGrant(
                "Refresh token was not issued to this client".to_string(),
            ));
        }

        let previous_scope = parent.scope.clone().unwrap_or_default();
        let next_scope = match request.scope.as_deref() {
            Some(requested) => {
                if !scope::is_subset(requested, &previous_scope) {
                    return Err(OAuthError::InvalidScope(
                        "Requested scope exceeds the scope of the refreshed token".to_string(),
                    ));
                }
                requested.to_string()
            }
            None => previous_scope,
        };

        // Rotate: the conditional revoke wins at most once under concurrent
        // refreshes, then the predecessor access token is revoked too.
        self.refresh_repo.consume(refresh.id).await?;
        self.access_repo.revoke(parent.id).await?;

        self.token_factory
            .new_access_token(
                client,
                GrantType::RefreshToken,
                Some(&next_scope),
                &parent.user_id,
                ctx,
            )
            .await
    }
}

fn page(error: OAuthError) -> AuthorizeRejection {
    AuthorizeRejection::Page(error)
}
