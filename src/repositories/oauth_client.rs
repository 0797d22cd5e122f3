use sqlx::MySqlPool;
use uuid::Uuid;

use crate::error::{ClientError, OAuthError};
use crate::models::OAuthClient;
use crate::services::client_registry::{normalize, ClientDraft};
use crate::utils::secret::SecretDerivation;

/// Repository for OAuth client records.
///
/// The write path runs the registration derivation (profile, type, secret,
/// grants) before the INSERT; reads can rely on those fields being
/// consistent. `client_id`, `name`, and `domaine` uniqueness are enforced by
/// the schema and surfaced as typed errors.
#[derive(Clone)]
pub struct OAuthClientRepository {
    pool: MySqlPool,
}

impl OAuthClientRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Validate, derive, and persist a new client.
    pub async fn create(
        &self,
        draft: ClientDraft,
        secrets: &SecretDerivation,
    ) -> Result<OAuthClient, ClientError> {
        let client = normalize(draft, secrets)?;

        let id = Uuid::new_v4();
        let grants_json = serde_json::to_value(&client.grants)
            .map_err(|e| ClientError::InternalError(anyhow::anyhow!("Failed to serialize grants: {}", e)))?;
        let redirect_uris_json = serde_json::to_value(&client.redirect_uris)
            .map_err(|e| ClientError::InternalError(anyhow::anyhow!("Failed to serialize redirect_uris: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO oauth_clients
            (id, client_id, name, client_profile, client_type, secret_key, grants,
             redirect_uris, scope, internal, domaine, logo, description, legal_terms_accepted_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&client.client_id)
        .bind(&client.name)
        .bind(client.client_profile.as_str())
        .bind(client.client_type.as_str())
        .bind(&client.secret_key)
        .bind(&grants_json)
        .bind(&redirect_uris_json)
        .bind(&client.scope)
        .bind(client.internal)
        .bind(&client.domaine)
        .bind(&client.logo)
        .bind(&client.description)
        .bind(client.legal_terms_accepted_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.code().map(|c| c == "23000").unwrap_or(false)
                    || db_err.message().contains("Duplicate entry")
                {
                    let message = db_err.message();
                    if message.contains("uq_oauth_clients_name") {
                        return ClientError::NameAlreadyExists;
                    }
                    if message.contains("uq_oauth_clients_domaine") {
                        return ClientError::DomainAlreadyExists;
                    }
                    return ClientError::ClientIdAlreadyExists;
                }
            }
            ClientError::InternalError(anyhow::anyhow!("Database error: {}", e))
        })?;

        self.find_by_id(id)
            .await
            .map_err(|e| ClientError::InternalError(anyhow::anyhow!("{}", e)))?
            .ok_or_else(|| ClientError::InternalError(anyhow::anyhow!("Failed to fetch created client")))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<OAuthClient>, OAuthError> {
        let client = sqlx::query_as::<_, OAuthClient>(
            r#"
            SELECT id, client_id, name, client_profile, client_type, secret_key, grants,
                   redirect_uris, scope, internal, domaine, logo, description,
                   legal_terms_accepted_at, revoked_at, created_at, updated_at
            FROM oauth_clients
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(client)
    }

    /// Find a client by its public identifier, revoked or not.
    pub async fn find_by_client_id(&self, client_id: &str) -> Result<Option<OAuthClient>, OAuthError> {
        let client = sqlx::query_as::<_, OAuthClient>(
            r#"
            SELECT id, client_id, name, client_profile, client_type, secret_key, grants,
                   redirect_uris, scope, internal, domaine, logo, description,
                   legal_terms_accepted_at, revoked_at, created_at, updated_at
            FROM oauth_clients
            WHERE client_id = ?
            "#,
        )
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(client)
    }

    /// Update the mutable metadata of a client. Derived fields are not
    /// touchable through this path.
    pub async fn update_metadata(
        &self,
        id: Uuid,
        name: &str,
        redirect_uris: &[String],
        logo: Option<&str>,
        description: Option<&str>,
    ) -> Result<OAuthClient, ClientError> {
        let redirect_uris_json = serde_json::to_value(redirect_uris)
            .map_err(|e| ClientError::InternalError(anyhow::anyhow!("Failed to serialize redirect_uris: {}", e)))?;

        let result = sqlx::query(
            r#"
            UPDATE oauth_clients
            SET name = ?, redirect_uris = ?, logo = ?, description = ?
            WHERE id = ?
            "#,
        )
        .bind(name)
        .bind(&redirect_uris_json)
        .bind(logo)
        .bind(description)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| ClientError::InternalError(anyhow::anyhow!("Database error: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(ClientError::NotFound);
        }

        self.find_by_id(id)
            .await
            .map_err(|e| ClientError::InternalError(anyhow::anyhow!("{}", e)))?
            .ok_or(ClientError::NotFound)
    }

    /// Revoke a client. A revoked client is blocked from every flow.
    pub async fn revoke(&self, id: Uuid) -> Result<(), ClientError> {
        let result = sqlx::query(
            r#"
            UPDATE oauth_clients
            SET revoked_at = NOW()
            WHERE id = ? AND revoked_at IS NULL
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| ClientError::InternalError(anyhow::anyhow!("Database error: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(ClientError::NotFound);
        }

        Ok(())
    }
}
