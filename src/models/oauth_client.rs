use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// How the application runs, declared at registration.
///
/// The profile drives the derived client type: server-side web applications
/// can hold a secret, user-agent-based and native applications cannot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClientProfile {
    Web,
    UserAgentBased,
    Native,
}

impl ClientProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientProfile::Web => "web",
            ClientProfile::UserAgentBased => "user-agent-based",
            ClientProfile::Native => "native",
        }
    }

    /// Derive the client type: `web` clients are confidential, the rest
    /// cannot protect a secret.
    pub fn client_type(&self) -> ClientType {
        match self {
            ClientProfile::Web => ClientType::Confidential,
            ClientProfile::UserAgentBased | ClientProfile::Native => ClientType::Public,
        }
    }

    /// Whether the client is expected to present a web-facing domain.
    pub fn requires_domain(&self) -> bool {
        matches!(self, ClientProfile::Web | ClientProfile::UserAgentBased)
    }
}

impl fmt::Display for ClientProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web" => Ok(ClientProfile::Web),
            "user-agent-based" => Ok(ClientProfile::UserAgentBased),
            "native" => Ok(ClientProfile::Native),
            other => Err(format!("unknown client profile: {}", other)),
        }
    }
}

/// RFC 6749 §2.1 client type, derived from the profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    Confidential,
    Public,
}

impl ClientType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientType::Confidential => "confidential",
            ClientType::Public => "public",
        }
    }
}

impl fmt::Display for ClientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confidential" => Ok(ClientType::Confidential),
            "public" => Ok(ClientType::Public),
            other => Err(format!("unknown client type: {}", other)),
        }
    }
}

/// OAuth grant types a client may exercise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    Implicit,
    AuthorizationCode,
    Password,
    ClientCredentials,
    RefreshToken,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::Implicit => "implicit",
            GrantType::AuthorizationCode => "authorization_code",
            GrantType::Password => "password",
            GrantType::ClientCredentials => "client_credentials",
            GrantType::RefreshToken => "refresh_token",
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GrantType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "implicit" => Ok(GrantType::Implicit),
            "authorization_code" => Ok(GrantType::AuthorizationCode),
            "password" => Ok(GrantType::Password),
            "client_credentials" => Ok(GrantType::ClientCredentials),
            "refresh_token" => Ok(GrantType::RefreshToken),
            other => Err(format!("unknown grant type: {}", other)),
        }
    }
}

/// OAuth Client - a registered application.
///
/// `client_type`, `secret_key` presence, and `grants` are derived from the
/// profile and the internal flag by the registry before persistence; readers
/// can rely on them being consistent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthClient {
    pub id: Uuid,
    pub client_id: String,
    pub name: String,
    pub client_profile: ClientProfile,
    pub client_type: ClientType,
    #[serde(skip_serializing)]
    pub secret_key: Option<String>,
    pub grants: Vec<GrantType>,
    pub redirect_uris: Vec<String>,
    pub scope: String,
    pub internal: bool,
    pub domaine: Option<String>,
    pub logo: Option<String>,
    pub description: Option<String>,
    pub legal_terms_accepted_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row type for MySQL query results
#[derive(Debug, Clone, FromRow)]
pub struct OAuthClientRow {
    pub id: String,
    pub client_id: String,
    pub name: String,
    pub client_profile: String,
    pub client_type: String,
    pub secret_key: Option<String>,
    pub grants: serde_json::Value,
    pub redirect_uris: serde_json::Value,
    pub scope: String,
    pub internal: bool,
    pub domaine: Option<String>,
    pub logo: Option<String>,
    pub description: Option<String>,
    pub legal_terms_accepted_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<OAuthClientRow> for OAuthClient {
    type Error = sqlx::Error;

    fn try_from(row: OAuthClientRow) -> Result<Self, Self::Error> {
        let decode = |column: &str, message: String| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: message.into(),
        };

        let client_profile = row
            .client_profile
            .parse()
            .map_err(|e: String| decode("client_profile", e))?;
        let client_type = row
            .client_type
            .parse()
            .map_err(|e: String| decode("client_type", e))?;
        let grants: Vec<GrantType> = serde_json::from_value(row.grants)
            .map_err(|e| decode("grants", e.to_string()))?;
        let redirect_uris: Vec<String> = serde_json::from_value(row.redirect_uris)
            .map_err(|e| decode("redirect_uris", e.to_string()))?;

        Ok(Self {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            client_id: row.client_id,
            name: row.name,
            client_profile,
            client_type,
            secret_key: row.secret_key,
            grants,
            redirect_uris,
            scope: row.scope,
            internal: row.internal,
            domaine: row.domaine,
            logo: row.logo,
            description: row.description,
            legal_terms_accepted_at: row.legal_terms_accepted_at,
            revoked_at: row.revoked_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> for OAuthClient {
    fn from_row(row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
        OAuthClientRow::from_row(row)?.try_into()
    }
}

impl OAuthClient {
    pub fn is_confidential(&self) -> bool {
        self.client_type == ClientType::Confidential
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    /// Check if a redirect URI is registered for this client
    pub fn has_redirect_uri(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|u| u == uri)
    }

    pub fn has_grant(&self, grant: GrantType) -> bool {
        self.grants.contains(&grant)
    }

    /// The `aud`/`azp` value for tokens issued to this client: the registered
    /// domain when present, else the client id.
    pub fn audience(&self) -> &str {
        self.domaine.as_deref().unwrap_or(&self.client_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_derives_type() {
        assert_eq!(ClientProfile::Web.client_type(), ClientType::Confidential);
        assert_eq!(ClientProfile::UserAgentBased.client_type(), ClientType::Public);
        assert_eq!(ClientProfile::Native.client_type(), ClientType::Public);
    }

    #[test]
    fn test_profile_domain_requirement() {
        assert!(ClientProfile::Web.requires_domain());
        assert!(ClientProfile::UserAgentBased.requires_domain());
        assert!(!ClientProfile::Native.requires_domain());
    }

    #[test]
    fn test_grant_type_wire_names() {
        assert_eq!(GrantType::AuthorizationCode.as_str(), "authorization_code");
        assert_eq!("client_credentials".parse(), Ok(GrantType::ClientCredentials));
        assert!("device_code".parse::<GrantType>().is_err());
    }

    #[test]
    fn test_grants_json_roundtrip() {
        let grants = vec![GrantType::Implicit, GrantType::AuthorizationCode, GrantType::Password];
        let json = serde_json::to_value(&grants).unwrap();
        assert_eq!(
            json,
            serde_json::json!(["implicit", "authorization_code", "password"])
        );
        let back: Vec<GrantType> = serde_json::from_value(json).unwrap();
        assert_eq!(back, grants);
    }
}
