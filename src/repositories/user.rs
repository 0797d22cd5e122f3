use sqlx::MySqlPool;
use uuid::Uuid;

use crate::error::OAuthError;
use crate::models::User;

/// Repository for resource-owner records consulted by the password grant and
/// the login dialog.
#[derive(Clone)]
pub struct UserRepository {
    pool: MySqlPool,
}

impl UserRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        username: &str,
        password_hash: &str,
        scope: &str,
    ) -> Result<User, OAuthError> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO users (id, username, password_hash, scope)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(username)
        .bind(password_hash)
        .bind(scope)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.code().map(|c| c == "23000").unwrap_or(false)
                    || db_err.message().contains("Duplicate entry")
                {
                    return OAuthError::InvalidRequest("Username already exists".to_string());
                }
            }
            OAuthError::ServerError(format!("Database error: {}", e))
        })?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| OAuthError::ServerError("Failed to fetch created user".to_string()))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, OAuthError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, password_hash, scope, is_active, created_at, updated_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(user)
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>, OAuthError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, password_hash, scope, is_active, created_at, updated_at
            FROM users
            WHERE username = ?
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(user)
    }
}
