//! Sealed payload passed between `/oauth/authorize` and the login dialog.
//!
//! The payload travels through the user agent as an opaque query parameter,
//! so it is authenticated: `base64url(json) + "." + base64url(HMAC-SHA256)`.
//! A tampered blob cannot point the dialog at a different pending
//! authorization code.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::error::OAuthError;

/// State the dialog needs to resume the authorization flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogPayload {
    #[serde(rename = "oauthAuthCodeId")]
    pub oauth_auth_code_id: Uuid,
}

impl DialogPayload {
    pub fn new(oauth_auth_code_id: Uuid) -> Self {
        Self { oauth_auth_code_id }
    }
}

/// Encode and authenticate a payload with the given key.
pub fn seal(payload: &DialogPayload, key: &[u8]) -> Result<String, OAuthError> {
    let json = serde_json::to_vec(payload)
        .map_err(|e| OAuthError::ServerError(format!("Failed to encode dialog payload: {}", e)))?;

    let body = URL_SAFE_NO_PAD.encode(&json);
    let tag = mac_tag(key, body.as_bytes());

    Ok(format!("{}.{}", body, URL_SAFE_NO_PAD.encode(tag)))
}

/// Verify and decode a sealed payload.
///
/// Any malformed or tampered input maps to `invalid_request`; the store is
/// never consulted for an unauthenticated identifier.
pub fn unseal(sealed: &str, key: &[u8]) -> Result<DialogPayload, OAuthError> {
    let invalid = || OAuthError::InvalidRequest("Invalid dialog payload".to_string());

    let (body, tag) = sealed.split_once('.').ok_or_else(invalid)?;

    let presented = URL_SAFE_NO_PAD.decode(tag).map_err(|_| invalid())?;
    let expected = mac_tag(key, body.as_bytes());
    if !constant_time_eq(&expected, &presented) {
        return Err(invalid());
    }

    let json = URL_SAFE_NO_PAD.decode(body).map_err(|_| invalid())?;
    serde_json::from_slice(&json).map_err(|_| invalid())
}

fn mac_tag(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"test-oauth-secret-key";

    #[test]
    fn test_seal_unseal_roundtrip() {
        let payload = DialogPayload::new(Uuid::new_v4());
        let sealed = seal(&payload, KEY).unwrap();
        assert_eq!(unseal(&sealed, KEY).unwrap(), payload);
    }

    #[test]
    fn test_sealed_form_is_url_safe() {
        let sealed = seal(&DialogPayload::new(Uuid::new_v4()), KEY).unwrap();
        assert!(sealed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'));
    }

    #[test]
    fn test_tampered_body_rejected() {
        let sealed = seal(&DialogPayload::new(Uuid::new_v4()), KEY).unwrap();
        let (body, tag) = sealed.split_once('.').unwrap();

        let other = seal(&DialogPayload::new(Uuid::new_v4()), KEY).unwrap();
        let (other_body, _) = other.split_once('.').unwrap();

        // Body from one payload, tag from another
        let spliced = format!("{}.{}", other_body, tag);
        assert!(unseal(&spliced, KEY).is_err());
        let _ = body;
    }

    #[test]
    fn test_wrong_key_rejected() {
        let sealed = seal(&DialogPayload::new(Uuid::new_v4()), KEY).unwrap();
        assert!(unseal(&sealed, b"another-key").is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(unseal("not-a-payload", KEY).is_err());
        assert!(unseal("a.b", KEY).is_err());
        assert!(unseal("", KEY).is_err());
    }
}
