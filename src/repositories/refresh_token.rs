use chrono::{DateTime, Utc};
use sqlx::MySqlPool;
use uuid::Uuid;

use crate::error::OAuthError;
use crate::models::RefreshToken;

/// Repository for refresh token records.
#[derive(Clone)]
pub struct RefreshTokenRepository {
    pool: MySqlPool,
}

impl RefreshTokenRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        access_token_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshToken, OAuthError> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO oauth_refresh_tokens (id, access_token_id, expires_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(access_token_id.to_string())
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| OAuthError::ServerError("Failed to fetch created refresh token".to_string()))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<RefreshToken>, OAuthError> {
        let token = sqlx::query_as::<_, RefreshToken>(
            r#"
            SELECT id, access_token_id, expires_at, revoked_at, created_at, updated_at
            FROM oauth_refresh_tokens
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(token)
    }

    /// Rotate the token out: revoke it if it is still live.
    ///
    /// Zero affected rows means the token was already rotated or revoked,
    /// which fails the grant; two concurrent refreshes redeem at most once.
    pub async fn consume(&self, id: Uuid) -> Result<(), OAuthError> {
        let result = sqlx::query(
            r#"
            UPDATE oauth_refresh_tokens
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
                "Refresh token has been revoked".to_string(),
            ));
        }

        Ok(())
    }

    /// Delete expired refresh tokens (cleanup)
    pub async fn delete_expired(&self) -> Result<u64, OAuthError> {
        let result = sqlx::query(
            r#"
            DELETE FROM oauth_refresh_tokens
            WHERE expires_at < NOW()
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(result.rows_affected())
    }
}
