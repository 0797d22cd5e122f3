//! Scope validation and resolution.
//!
//! A scope is a string of whitespace-separated tokens, or the sentinel `*`
//! meaning "all scopes". The effective scope of an issued token is an
//! intersection over the subject's scope, the request's scope, and the
//! client's scope, with `*` absorbing into the other operand.

/// The sentinel granting every scope. Reserved for internal clients.
pub const WILDCARD: &str = "*";

/// Whether a scope string is the bare wildcard.
pub fn is_wildcard(scope: &str) -> bool {
    scope.trim() == WILDCARD
}

/// Validate a requested scope against a client's registered scope.
///
/// A client registered with `*` accepts any request that does not itself ask
/// for the wildcard. Otherwise every requested token must appear in the
/// client's scope.
pub fn validate(client_scope: &str, requested: &str) -> bool {
    if is_wildcard(client_scope) {
        return requested
            .split_whitespace()
            .all(|token| token != WILDCARD);
    }

    let allowed: Vec<&str> = client_scope.split_whitespace().collect();
    requested
        .split_whitespace()
        .all(|token| allowed.contains(&token))
}

/// Resolve the scope granted to an issued token.
///
/// Returns `None` when `request_scope` is present but not valid for the
/// client; callers translate that to `invalid_scope`.
pub fn merge(subject_scope: &str, request_scope: Option<&str>, client_scope: &str) -> Option<String> {
    match request_scope {
        Some(requested) => {
            if !validate(client_scope, requested) {
                return None;
            }
            if is_wildcard(requested) {
                return Some(subject_scope.to_string());
            }
            if is_wildcard(subject_scope) {
                return Some(requested.to_string());
            }
            Some(intersection(requested, subject_scope))
        }
        None => {
            if is_wildcard(client_scope) {
                return Some(subject_scope.to_string());
            }
            if is_wildcard(subject_scope) {
                return Some(client_scope.to_string());
            }
            Some(intersection(subject_scope, client_scope))
        }
    }
}

/// Whether every token of `narrower` appears in `broader`.
///
/// Used by the refresh grant to refuse scope escalation over the previous
/// token.
pub fn is_subset(narrower: &str, broader: &str) -> bool {
    if is_wildcard(broader) {
        return true;
    }

    let broader: Vec<&str> = broader.split_whitespace().collect();
    narrower
        .split_whitespace()
        .all(|token| broader.contains(&token))
}

/// Tokens of `a` that also appear in `b`, deduplicated, in `a`'s order.
fn intersection(a: &str, b: &str) -> String {
    let b_tokens: Vec<&str> = b.split_whitespace().collect();
    let mut seen: Vec<&str> = Vec::new();

    for token in a.split_whitespace() {
        if b_tokens.contains(&token) && !seen.contains(&token) {
            seen.push(token);
        }
    }

    seen.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn as_set(scope: &str) -> HashSet<&str> {
        scope.split_whitespace().collect()
    }

    #[test]
    fn test_validate_against_explicit_scope() {
        assert!(validate("read write admin", "read"));
        assert!(validate("read write admin", "read write"));
        assert!(!validate("read write", "read admin"));
    }

    #[test]
    fn test_validate_wildcard_client_accepts_anything_but_wildcard() {
        assert!(validate("*", "read write"));
        assert!(!validate("*", "*"));
        assert!(!validate("*", "read *"));
    }

    #[test]
    fn test_validate_wildcard_request_against_explicit_scope() {
        // "*" is only a valid request token when the client declares it
        assert!(!validate("read write", "*"));
    }

    #[test]
    fn test_merge_with_request_scope() {
        assert_eq!(
            merge("read write admin", Some("read write"), "read write profile").as_deref(),
            Some("read write")
        );
    }

    #[test]
    fn test_merge_request_intersects_subject() {
        let merged = merge("read", Some("read write"), "read write").unwrap();
        assert_eq!(as_set(&merged), as_set("read"));
    }

    #[test]
    fn test_merge_wildcard_subject_yields_request() {
        assert_eq!(
            merge("*", Some("read write"), "read write profile").as_deref(),
            Some("read write")
        );
    }

    #[test]
    fn test_merge_invalid_request_is_none() {
        assert_eq!(merge("read write", Some("admin"), "read write"), None);
        assert_eq!(merge("read", Some("*"), "read write"), None);
    }

    #[test]
    fn test_merge_without_request_wildcard_client() {
        assert_eq!(merge("read write", None, "*").as_deref(), Some("read write"));
    }

    #[test]
    fn test_merge_without_request_wildcard_subject() {
        assert_eq!(merge("*", None, "read write").as_deref(), Some("read write"));
    }

    #[test]
    fn test_merge_without_request_intersects() {
        let merged = merge("read admin", None, "read write").unwrap();
        assert_eq!(as_set(&merged), as_set("read"));
    }

    #[test]
    fn test_merge_intersection_is_commutative_as_sets() {
        let ab = merge("read write admin", None, "write read profile").unwrap();
        let ba = merge("write read profile", None, "read write admin").unwrap();
        assert_eq!(as_set(&ab), as_set(&ba));
    }

    #[test]
    fn test_intersection_deduplicates() {
        assert_eq!(intersection("read read write", "read write"), "read write");
    }

    #[test]
    fn test_is_subset() {
        assert!(is_subset("read", "read write"));
        assert!(is_subset("read write", "read write"));
        assert!(!is_subset("read admin", "read write"));
        assert!(is_subset("anything at all", "*"));
        assert!(is_subset("", "read"));
    }
}
