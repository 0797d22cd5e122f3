use chrono::{DateTime, Utc};
use sqlx::MySqlPool;
use uuid::Uuid;

use crate::error::OAuthError;
use crate::models::AccessToken;

/// Repository for access token records.
///
/// The record must be durable before the JWT is signed: the token's `jti` is
/// the record id, and a bearer presenting the JWT before the commit would
/// look invalid.
#[derive(Clone)]
pub struct AccessTokenRepository {
    pool: MySqlPool,
}

impl AccessTokenRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        client_id: Uuid,
        user_id: &str,
        name: &str,
        scope: Option<&str>,
        expires_at: DateTime<Utc>,
        user_agent: Option<&str>,
    ) -> Result<AccessToken, OAuthError> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO oauth_access_tokens
            (id, client_id, user_id, name, scope, expires_at, user_agent)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(client_id.to_string())
        .bind(user_id)
        .bind(name)
        .bind(scope)
        .bind(expires_at)
        .bind(user_agent)
        .execute(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| OAuthError::ServerError("Failed to fetch created access token".to_string()))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<AccessToken>, OAuthError> {
        let token = sqlx::query_as::<_, AccessToken>(
            r#"
            SELECT id, client_id, user_id, name, scope, expires_at, user_agent,
                   revoked_at, created_at, updated_at
            FROM oauth_access_tokens
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(token)
    }

    /// Revoke an access token and cascade to any refresh token that holds it
    /// as parent. Idempotent.
    pub async fn revoke(&self, id: Uuid) -> Result<(), OAuthError> {
        sqlx::query(
            r#"
            UPDATE oauth_access_tokens
            SET revoked_at = NOW()
            WHERE id = ? AND revoked_at IS NULL
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        // Lifecycle invariant: a revoked parent leaves no live refresh token
        sqlx::query(
            r#"
            UPDATE oauth_refresh_tokens
            SET revoked_at = NOW()
            WHERE access_token_id = ? AND revoked_at IS NULL
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(())
    }

    /// Delete expired access tokens (cleanup)
    pub async fn delete_expired(&self) -> Result<u64, OAuthError> {
        let result = sqlx::query(
            r#"
            DELETE FROM oauth_access_tokens
            WHERE expires_at < NOW()
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(result.rows_affected())
    }
}
