use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::utils::pkce::CodeChallengeMethod;

/// Authorization Code - single-use front-channel credential.
///
/// Created when the authorization request is validated, before the resource
/// owner has logged in; `user_id` and the resolved `scope` are attached when
/// the dialog decision comes back. Redemption revokes the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    pub id: Uuid,
    pub authorization_code: String,
    pub client_id: Uuid,
    pub user_id: Option<Uuid>,
    pub scope: Option<String>,
    pub redirect_uri: String,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<CodeChallengeMethod>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row type for MySQL query results
#[derive(Debug, Clone, FromRow)]
pub struct AuthorizationCodeRow {
    pub id: String,
    pub authorization_code: String,
    pub client_id: String,
    pub user_id: Option<String>,
    pub scope: Option<String>,
    pub redirect_uri: String,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<AuthorizationCodeRow> for AuthorizationCode {
    type Error = sqlx::Error;

    fn try_from(row: AuthorizationCodeRow) -> Result<Self, Self::Error> {
        let code_challenge_method = match row.code_challenge_method.as_deref() {
            Some(method) => Some(method.parse::<CodeChallengeMethod>().map_err(|_| {
                sqlx::Error::ColumnDecode {
                    index: "code_challenge_method".to_string(),
                    source: format!("unknown code challenge method: {}", method).into(),
                }
            })?),
            None => None,
        };

        Ok(Self {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            authorization_code: row.authorization_code,
            client_id: Uuid::parse_str(&row.client_id).unwrap_or_default(),
            user_id: row.user_id.and_then(|id| Uuid::parse_str(&id).ok()),
            scope: row.scope,
            redirect_uri: row.redirect_uri,
            state: row.state,
            code_challenge: row.code_challenge,
            code_challenge_method,
            expires_at: row.expires_at,
            revoked_at: row.revoked_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> for AuthorizationCode {
    fn from_row(row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
        AuthorizationCodeRow::from_row(row)?.try_into()
    }
}

impl AuthorizationCode {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}
