use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Access Token - the persisted record behind a signed bearer token.
///
/// The record id is embedded in the JWT as `jti`, so revocation and refresh
/// find the record by identifier. `user_id` is the subject: a user id for
/// user-delegated grants, the `client_id` string for client_credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub id: Uuid,
    pub client_id: Uuid,
    pub user_id: String,
    pub name: String,
    pub scope: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row type for MySQL query results
#[derive(Debug, Clone, FromRow)]
pub struct AccessTokenRow {
    pub id: String,
    pub client_id: String,
    pub user_id: String,
    pub name: String,
    pub scope: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AccessTokenRow> for AccessToken {
    fn from(row: AccessTokenRow) -> Self {
        Self {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            client_id: Uuid::parse_str(&row.client_id).unwrap_or_default(),
            user_id: row.user_id,
            name: row.name,
            scope: row.scope,
            expires_at: row.expires_at,
            user_agent: row.user_agent,
            revoked_at: row.revoked_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> for AccessToken {
    fn from_row(row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
        Ok(AccessTokenRow::from_row(row)?.into())
    }
}

impl AccessToken {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}
