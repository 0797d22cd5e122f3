//! HTTP endpoints for the OAuth flows.
//!
//! - GET  /oauth/authorize - front-channel authorization request
//! - GET  /oauth/dialog    - login dialog for the pending authorization
//! - POST /oauth/authorize - dialog form submission
//! - POST /oauth/token     - back-channel token issuance
//! - GET  /oauth/callback  - diagnostic echo
//! - POST /oauth/inspect, /oauth/purge - acknowledged stubs
//!
//! Handlers translate service results into HTTP: protocol errors become
//! `{error, error_description}` bodies or redirect query strings, and
//! front-channel failures on an untrusted redirect URI become an error page.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Form, Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::collections::HashMap;

use crate::config::AppState;
use crate::dto::oauth::{
    AuthorizeDecisionRequest, AuthorizeRequest, DialogRequest, TokenRequest, TokenResponse,
};
use crate::error::OAuthError;
use crate::services::oauth::{AuthorizeRejection, DecisionResult, DialogContext};
use crate::services::token::RequestContext;
use crate::services::OAuthService;

// ============================================================================
// Authorization endpoint (front channel)
// ============================================================================

/// GET /oauth/authorize
///
/// Validates the request, persists a pending authorization code, and sends
/// the user agent to the login dialog carrying the sealed payload.
pub async fn authorize_handler(
    State(state): State<AppState>,
    Query(req): Query<AuthorizeRequest>,
) -> Response {
    let service = OAuthService::from_state(&state);

    match service
        .begin_authorization(
            req.response_type.as_deref(),
            req.client_id.as_deref(),
            req.redirect_uri.as_deref(),
            req.scope.as_deref(),
            req.state.as_deref(),
            req.code_challenge.as_deref(),
            req.code_challenge_method.as_deref(),
        )
        .await
    {
        Ok(sealed) => {
            let target = format!("/oauth/dialog?p={}", urlencoding::encode(&sealed));
            Redirect::temporary(&target).into_response()
        }
        Err(rejection) => rejection_response(rejection),
    }
}

/// GET /oauth/dialog?p=<sealed>
///
/// Renders the login dialog for the pending authorization.
pub async fn dialog_handler(
    State(state): State<AppState>,
    Query(req): Query<DialogRequest>,
) -> Response {
    let service = OAuthService::from_state(&state);

    match service.dialog_context(&req.p).await {
        Ok(context) => {
            Html(render_dialog(&state.config.provider_name, &context, false)).into_response()
        }
        Err(error) => error_page(&error),
    }
}

/// POST /oauth/authorize
///
/// Consumes the dialog decision: authenticates the resource owner, attaches
/// the grant to the pending code, and redirects back to the client.
pub async fn authorize_decision_handler(
    State(state): State<AppState>,
    Form(req): Form<AuthorizeDecisionRequest>,
) -> Response {
    let service = OAuthService::from_state(&state);

    match service
        .decide(
            &req.p,
            req.decision.as_deref(),
            req.username.as_deref(),
            req.password.as_deref(),
        )
        .await
    {
        Ok(DecisionResult::Granted {
            redirect_uri,
            code,
            state: echo,
        }) => {
            let mut url = format!(
                "{}{}code={}",
                redirect_uri,
                query_separator(&redirect_uri),
                urlencoding::encode(&code)
            );
            if let Some(s) = &echo {
                url.push_str(&format!("&state={}", urlencoding::encode(s)));
            }
            Redirect::temporary(&url).into_response()
        }
        Ok(DecisionResult::Denied {
            redirect_uri,
            state: echo,
        }) => build_error_redirect(&redirect_uri, &OAuthError::AccessDenied, echo.as_deref()),
        Ok(DecisionResult::InvalidCredentials { context }) => {
            Html(render_dialog(&state.config.provider_name, &context, true)).into_response()
        }
        Err(rejection) => rejection_response(rejection),
    }
}

// ============================================================================
// Token endpoint (back channel)
// ============================================================================

/// POST /oauth/token
///
/// Client authentication comes from HTTP Basic or the form body; the grant
/// dispatch and every protocol check live in the service.
pub async fn token_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(req): Form<TokenRequest>,
) -> Result<Json<TokenResponse>, OAuthError> {
    let service = OAuthService::from_state(&state);

    let fallback_host = format!("{}:{}", state.config.server_host, state.config.server_port);
    let ctx = RequestContext::from_headers(&headers, &fallback_host);
    let basic = parse_basic_auth(&headers);

    let issued = service.token(basic, &req, &ctx).await?;
    Ok(Json(issued.into()))
}

// ============================================================================
// Diagnostics and stubs
// ============================================================================

/// GET /oauth/callback - echoes the redirect query back as JSON, for
/// checking a flow end to end without a real client.
pub async fn callback_handler(
    Query(params): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "endpoint": "callback",
        "query": params,
    }))
}

/// POST /oauth/inspect - acknowledged, not implemented.
pub async fn inspect_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_IMPLEMENTED,
        Json(serde_json::json!({ "error": "inspect is not implemented" })),
    )
}

/// POST /oauth/purge - acknowledged, not implemented.
pub async fn purge_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_IMPLEMENTED,
        Json(serde_json::json!({ "error": "purge is not implemented" })),
    )
}

// ============================================================================
// Helpers
// ============================================================================

/// Extract client credentials from an HTTP Basic Authorization header.
fn parse_basic_auth(headers: &HeaderMap) -> Option<(String, String)> {
    let header = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (client_id, client_secret) = decoded.split_once(':')?;
    Some((client_id.to_string(), client_secret.to_string()))
}

fn rejection_response(rejection: AuthorizeRejection) -> Response {
    match rejection {
        AuthorizeRejection::Page(error) => error_page(&error),
        AuthorizeRejection::Redirect {
            redirect_uri,
            error,
            state,
        } => build_error_redirect(&redirect_uri, &error, state.as_deref()),
    }
}

/// Error redirect per RFC 6749 §4.1.2.1.
fn build_error_redirect(redirect_uri: &str, error: &OAuthError, state: Option<&str>) -> Response {
    if let OAuthError::ServerError(cause) = error {
        tracing::error!(cause = %cause, "authorization request failed");
    }

    let mut url = format!(
        "{}{}error={}&error_description={}",
        redirect_uri,
        query_separator(redirect_uri),
        urlencoding::encode(error.code()),
        urlencoding::encode(&error.description())
    );
    if let Some(s) = state {
        url.push_str(&format!("&state={}", urlencoding::encode(s)));
    }

    Redirect::temporary(&url).into_response()
}

fn query_separator(url: &str) -> &'static str {
    if url.contains('?') {
        "&"
    } else {
        "?"
    }
}

/// Minimal error page for failures where the redirect URI is not trusted.
fn error_page(error: &OAuthError) -> Response {
    if let OAuthError::ServerError(cause) = error {
        tracing::error!(cause = %cause, "authorization request failed");
    }

    let body = format!(
        "<!DOCTYPE html>\n<html><head><title>Authorization error</title></head>\n\
         <body><h1>Authorization error</h1><p>{}: {}</p></body></html>",
        escape_html(error.code()),
        escape_html(&error.description())
    );

    (StatusCode::BAD_REQUEST, Html(body)).into_response()
}

/// Server-rendered login dialog.
///
/// Posts `{p, username, password, decision}` back to POST /oauth/authorize.
fn render_dialog(provider_name: &str, context: &DialogContext, failed_attempt: bool) -> String {
    let scope_line = match context.scope.as_deref().filter(|s| !s.is_empty()) {
        Some(scope) => format!(
            "<p><strong>{}</strong> requests access to: <code>{}</code></p>",
            escape_html(&context.client_name),
            escape_html(scope)
        ),
        None => format!(
            "<p><strong>{}</strong> requests access to your account.</p>",
            escape_html(&context.client_name)
        ),
    };

    let notice = if failed_attempt {
        "<p class=\"error\">Invalid username or password.</p>"
    } else {
        ""
    };

    format!(
        "<!DOCTYPE html>\n<html>\n<head><title>Sign in - {provider}</title></head>\n<body>\n\
         <h1>{provider}</h1>\n{scope_line}\n{notice}\n\
         <form method=\"post\" action=\"/oauth/authorize\">\n\
         <input type=\"hidden\" name=\"p\" value=\"{payload}\"/>\n\
         <label>Username <input type=\"text\" name=\"username\"/></label><br/>\n\
         <label>Password <input type=\"password\" name=\"password\"/></label><br/>\n\
         <button type=\"submit\" name=\"decision\" value=\"allow\">Sign in and allow</button>\n\
         <button type=\"submit\" name=\"decision\" value=\"deny\">Cancel</button>\n\
         </form>\n</body>\n</html>",
        provider = escape_html(provider_name),
        scope_line = scope_line,
        notice = notice,
        payload = escape_html(&context.sealed_payload),
    )
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_auth() {
        let mut headers = HeaderMap::new();
        // base64("c1:s3cret")
        headers.insert(header::AUTHORIZATION, "Basic YzE6czNjcmV0".parse().unwrap());

        assert_eq!(
            parse_basic_auth(&headers),
            Some(("c1".to_string(), "s3cret".to_string()))
        );
    }

    #[test]
    fn test_parse_basic_auth_rejects_other_schemes() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert_eq!(parse_basic_auth(&headers), None);

        assert_eq!(parse_basic_auth(&HeaderMap::new()), None);
    }

    #[test]
    fn test_parse_basic_auth_requires_colon() {
        let mut headers = HeaderMap::new();
        // base64("no-separator")
        headers.insert(
            header::AUTHORIZATION,
            "Basic bm8tc2VwYXJhdG9y".parse().unwrap(),
        );
        assert_eq!(parse_basic_auth(&headers), None);
    }

    #[test]
    fn test_query_separator() {
        assert_eq!(query_separator("https://app/cb"), "?");
        assert_eq!(query_separator("https://app/cb?x=1"), "&");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<script>\"&'"), "&lt;script&gt;&quot;&amp;&#39;");
    }

    #[test]
    fn test_render_dialog_escapes_client_name() {
        let context = DialogContext {
            client_name: "<b>Evil</b>".to_string(),
            scope: Some("read".to_string()),
            sealed_payload: "abc.def".to_string(),
        };

        let html = render_dialog("Provider", &context, false);
        assert!(html.contains("&lt;b&gt;Evil&lt;/b&gt;"));
        assert!(!html.contains("<b>Evil</b>"));
    }
}
