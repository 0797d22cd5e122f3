use chrono::{Duration, Utc};
use sqlx::MySqlPool;
use uuid::Uuid;

use crate::error::OAuthError;
use crate::models::AuthorizationCode;
use crate::utils::pkce::CodeChallengeMethod;
use crate::utils::secret::{generate_opaque_token, DEFAULT_TOKEN_LENGTH};

/// Repository for authorization code records.
#[derive(Clone)]
pub struct AuthorizationCodeRepository {
    pool: MySqlPool,
}

impl AuthorizationCodeRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Persist a pending authorization code for a validated front-channel
    /// request. The subject is attached later, when the dialog decision
    /// comes back.
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        client_id: Uuid,
        redirect_uri: &str,
        scope: Option<&str>,
        state: Option<&str>,
        code_challenge: Option<&str>,
        code_challenge_method: Option<CodeChallengeMethod>,
        expires_in_seconds: i64,
    ) -> Result<AuthorizationCode, OAuthError> {
        let id = Uuid::new_v4();
        let authorization_code = generate_opaque_token(DEFAULT_TOKEN_LENGTH);
        let expires_at = Utc::now() + Duration::seconds(expires_in_seconds);

        sqlx::query(
            r#"
            INSERT INTO oauth_auth_codes
            (id, authorization_code, client_id, scope, redirect_uri, state,
             code_challenge, code_challenge_method, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&authorization_code)
        .bind(client_id.to_string())
        .bind(scope)
        .bind(state)
        .bind(code_challenge)
        .bind(code_challenge_method.map(|m| m.as_str()))
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| OAuthError::ServerError("Failed to fetch created authorization code".to_string()))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<AuthorizationCode>, OAuthError> {
        let code = sqlx::query_as::<_, AuthorizationCode>(
            r#"
            SELECT id, authorization_code, client_id, user_id, scope, redirect_uri, state,
                   code_challenge, code_challenge_method, expires_at, revoked_at,
                   created_at, updated_at
            FROM oauth_auth_codes
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(code)
    }

    /// Find a code by its opaque value, scoped to the redeeming client.
    pub async fn find_by_client_and_code(
        &self,
        client_id: Uuid,
        code: &str,
    ) -> Result<Option<AuthorizationCode>, OAuthError> {
        let code = sqlx::query_as::<_, AuthorizationCode>(
            r#"
            SELECT id, authorization_code, client_id, user_id, scope, redirect_uri, state,
                   code_challenge, code_challenge_method, expires_at, revoked_at,
                   created_at, updated_at
            FROM oauth_auth_codes
            WHERE client_id = ? AND authorization_code = ?
            "#,
        )
        .bind(client_id.to_string())
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(code)
    }

    /// Attach the authenticated subject and the resolved scope after the
    /// resource owner approved the dialog.
    pub async fn attach_grant(
        &self,
        id: Uuid,
        user_id: Uuid,
        scope: &str,
    ) -> Result<(), OAuthError> {
        let result = sqlx::query(
            r#"
            UPDATE oauth_auth_codes
            SET user_id = ?, scope = ?
            WHERE id = ? AND revoked_at IS NULL
            "#,
        )
        .bind(user_id.to_string())
        .bind(scope)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(OAuthError::InvalidGrant(
                "Authorization code is no longer pending".to_string(),
            ));
        }

        Ok(())
    }

    /// Redeem the code: revoke it if it has not been revoked yet.
    ///
    /// The conditional update is what makes redemption single-use under
    /// concurrent token requests; zero affected rows means another request
    /// got there first.
    pub async fn consume(&self, id: Uuid) -> Result<(), OAuthError> {
        let result = sqlx::query(
            r#"
            UPDATE oauth_auth_codes
            SET revoked_at = NOW()
            WHERE id = ? AND revoked_at IS NULL
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(OAuthError::InvalidGrant(
                "Authorization code has already been redeemed".to_string(),
            ));
        }

        Ok(())
    }

    /// Delete expired authorization codes (cleanup)
    pub async fn delete_expired(&self) -> Result<u64, OAuthError> {
        let result = sqlx::query(
            r#"
            DELETE FROM oauth_auth_codes
            WHERE expires_at < NOW()
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(result.rows_affected())
    }
}
