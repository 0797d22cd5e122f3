//! Client registration rules.
//!
//! `normalize` is the pure derivation applied to every client write:
//! profile decides the client type, the type decides secret presence, and
//! the type plus the internal flag decide the grant set. The store invokes
//! it on its write path, so persisted clients are always consistent and the
//! rules are testable without a live store.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use url::Url;
use uuid::Uuid;

use crate::error::ClientError;
use crate::models::{ClientProfile, ClientType, GrantType};
use crate::services::scope;
use crate::utils::secret::SecretDerivation;

/// Client registration input, before derivation.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientDraft {
    pub name: String,
    pub client_profile: ClientProfile,
    pub internal: bool,
    pub scope: Option<String>,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    pub domaine: Option<String>,
    pub logo: Option<String>,
    pub description: Option<String>,
    pub legal_terms_accepted_at: Option<DateTime<Utc>>,
}

/// A draft with every derived field computed, ready for the INSERT.
#[derive(Debug, Clone)]
pub struct NormalizedClient {
    pub client_id: String,
    pub name: String,
    pub client_profile: ClientProfile,
    pub client_type: ClientType,
    pub secret_key: Option<String>,
    pub grants: Vec<GrantType>,
    pub redirect_uris: Vec<String>,
    pub scope: String,
    pub internal: bool,
    pub domaine: Option<String>,
    pub logo: Option<String>,
    pub description: Option<String>,
    pub legal_terms_accepted_at: Option<DateTime<Utc>>,
}

/// Grant set derived from the client type and the internal flag.
pub fn derive_grants(client_type: ClientType, internal: bool) -> Vec<GrantType> {
    match (client_type, internal) {
        (ClientType::Public, true) => vec![
            GrantType::Implicit,
            GrantType::AuthorizationCode,
            GrantType::Password,
        ],
        (ClientType::Public, false) => vec![GrantType::Implicit, GrantType::AuthorizationCode],
        (ClientType::Confidential, true) => vec![
            GrantType::Implicit,
            GrantType::AuthorizationCode,
            GrantType::Password,
            GrantType::ClientCredentials,
        ],
        (ClientType::Confidential, false) => {
            vec![GrantType::Implicit, GrantType::AuthorizationCode]
        }
    }
}

/// Validate a draft and compute its derived fields.
pub fn normalize(
    draft: ClientDraft,
    secrets: &SecretDerivation,
) -> Result<NormalizedClient, ClientError> {
    let name = draft.name.trim().to_string();
    if name.is_empty() {
        return Err(ClientError::NameRequired);
    }

    let client_type = draft.client_profile.client_type();

    let scope = match draft.scope.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ if draft.internal => scope::WILDCARD.to_string(),
        _ => return Err(ClientError::ScopeRequired),
    };
    if !draft.internal && scope.split_whitespace().any(|token| token == scope::WILDCARD) {
        return Err(ClientError::WildcardScopeForbidden);
    }

    for uri in &draft.redirect_uris {
        Url::parse(uri).map_err(|_| ClientError::InvalidUrl(uri.clone()))?;
    }

    let domaine = match draft.domaine.as_deref().map(str::trim) {
        Some(d) if !d.is_empty() => {
            Url::parse(d).map_err(|_| ClientError::InvalidUrl(d.to_string()))?;
            Some(d.to_string())
        }
        _ if draft.client_profile.requires_domain() => return Err(ClientError::DomainRequired),
        _ => None,
    };

    let client_id = Uuid::new_v4().to_string();
    let secret_key = match client_type {
        ClientType::Confidential => Some(secrets.derive(&client_id)),
        ClientType::Public => None,
    };

    Ok(NormalizedClient {
        client_id,
        name,
        client_profile: draft.client_profile,
        client_type,
        secret_key,
        grants: derive_grants(client_type, draft.internal),
        redirect_uris: draft.redirect_uris,
        scope,
        internal: draft.internal,
        domaine,
        logo: draft.logo,
        description: draft.description,
        legal_terms_accepted_at: draft.legal_terms_accepted_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::secret::HmacAlgorithm;

    fn secrets() -> SecretDerivation {
        SecretDerivation::new(HmacAlgorithm::Sha512, "test-oauth-secret-key")
    }

    fn draft(profile: ClientProfile, internal: bool) -> ClientDraft {
        ClientDraft {
            name: "Acme Dashboard".to_string(),
            client_profile: profile,
            internal,
            scope: Some("read write".to_string()),
            redirect_uris: vec!["https://app.example.com/cb".to_string()],
            domaine: Some("https://app.example.com".to_string()),
            logo: None,
            description: None,
            legal_terms_accepted_at: None,
        }
    }

    #[test]
    fn test_web_profile_is_confidential_with_secret() {
        let client = normalize(draft(ClientProfile::Web, false), &secrets()).unwrap();
        assert_eq!(client.client_type, ClientType::Confidential);
        let secret = client.secret_key.expect("confidential clients carry a secret");
        assert!(secrets().verify(&client.client_id, &secret));
    }

    #[test]
    fn test_native_profile_is_public_without_secret() {
        let mut d = draft(ClientProfile::Native, true);
        d.domaine = None;
        let client = normalize(d, &secrets()).unwrap();
        assert_eq!(client.client_type, ClientType::Public);
        assert_eq!(client.secret_key, None);
    }

    #[test]
    fn test_grant_table() {
        assert_eq!(
            derive_grants(ClientType::Public, true),
            vec![GrantType::Implicit, GrantType::AuthorizationCode, GrantType::Password]
        );
        assert_eq!(
            derive_grants(ClientType::Public, false),
            vec![GrantType::Implicit, GrantType::AuthorizationCode]
        );
        assert_eq!(
            derive_grants(ClientType::Confidential, true),
            vec![
                GrantType::Implicit,
                GrantType::AuthorizationCode,
                GrantType::Password,
                GrantType::ClientCredentials
            ]
        );
        assert_eq!(
            derive_grants(ClientType::Confidential, false),
            vec![GrantType::Implicit, GrantType::AuthorizationCode]
        );
    }

    #[test]
    fn test_name_is_required() {
        let mut d = draft(ClientProfile::Web, false);
        d.name = "   ".to_string();
        assert!(matches!(
            normalize(d, &secrets()),
            Err(ClientError::NameRequired)
        ));
    }

    #[test]
    fn test_external_client_requires_scope() {
        let mut d = draft(ClientProfile::Web, false);
        d.scope = None;
        assert!(matches!(
            normalize(d, &secrets()),
            Err(ClientError::ScopeRequired)
        ));
    }

    #[test]
    fn test_external_client_rejects_wildcard_scope() {
        let mut d = draft(ClientProfile::Web, false);
        d.scope = Some("read * write".to_string());
        assert!(matches!(
            normalize(d, &secrets()),
            Err(ClientError::WildcardScopeForbidden)
        ));
    }

    #[test]
    fn test_internal_client_defaults_to_wildcard_scope() {
        let mut d = draft(ClientProfile::Native, true);
        d.domaine = None;
        d.scope = None;
        let client = normalize(d, &secrets()).unwrap();
        assert_eq!(client.scope, "*");
    }

    #[test]
    fn test_redirect_uris_must_be_absolute_urls() {
        let mut d = draft(ClientProfile::Web, false);
        d.redirect_uris = vec!["/relative/path".to_string()];
        assert!(matches!(
            normalize(d, &secrets()),
            Err(ClientError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_web_profile_requires_domain() {
        let mut d = draft(ClientProfile::Web, false);
        d.domaine = None;
        assert!(matches!(
            normalize(d, &secrets()),
            Err(ClientError::DomainRequired)
        ));

        let mut d = draft(ClientProfile::UserAgentBased, false);
        d.domaine = None;
        assert!(matches!(
            normalize(d, &secrets()),
            Err(ClientError::DomainRequired)
        ));
    }

    #[test]
    fn test_generated_client_ids_are_unique() {
        let a = normalize(draft(ClientProfile::Web, false), &secrets()).unwrap();
        let b = normalize(draft(ClientProfile::Web, false), &secrets()).unwrap();
        assert_ne!(a.client_id, b.client_id);
    }
}
