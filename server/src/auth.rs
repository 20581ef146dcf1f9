//! Session guard: resolves the caller's identity and gates every order-data
//! route behind the email allow-list.
//!
//! The identity provider itself is external; a session request carries the
//! profile the provider resolved. With no provider configured the guard
//! hands out a deterministic demo identity instead, so the system works
//! offline. Provider authentication is necessary but not sufficient: the
//! email must also match the allow-list, checked at sign-in and again on
//! every guarded request.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

pub const DEMO_UID: &str = "demo-user";
pub const DEMO_EMAIL: &str = "demo@bagcraft.com";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub uid: String,
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default, rename = "photoURL")]
    pub photo_url: Option<String>,
}

pub fn demo_user() -> AuthUser {
    AuthUser {
        uid: DEMO_UID.to_string(),
        email: Some(DEMO_EMAIL.to_string()),
        display_name: Some("Demo User".to_string()),
        photo_url: None,
    }
}

/// Case-insensitive, whitespace-trimmed match. A missing email always fails.
pub fn is_email_allowed(allowed: &[String], email: Option<&str>) -> bool {
    let Some(email) = email else {
        return false;
    };
    let normalized = email.trim().to_lowercase();

    allowed
        .iter()
        .any(|entry| entry.trim().to_lowercase() == normalized)
}

/// Provider error codes mapped to the messages shown to the user.
pub fn provider_error_message(code: &str) -> &'static str {
    match code {
        "auth/user-not-found" => "No account found with this email address.",
        "auth/wrong-password" => "Incorrect password. Please try again.",
        "auth/email-already-in-use" => "An account with this email already exists.",
        "auth/weak-password" => "Password should be at least 6 characters long.",
        "auth/invalid-email" => "Please enter a valid email address.",
        "auth/too-many-requests" => "Too many failed attempts. Please try again later.",
        "auth/network-request-failed" => "Network error. Please check your connection.",
        "auth/invalid-action-code" => "The sign-in link is invalid or has expired.",
        _ => "An error occurred. Please try again.",
    }
}

pub fn new_session_token() -> String {
    Uuid::new_v4().to_string()
}

pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
}

/// Middleware in front of every order-data route. The allow-list is
/// re-checked here so a delisted email loses access without a restart.
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers())
        .ok_or_else(|| AppError::Auth("missing session token".to_string()))?;

    let user = state
        .sessions
        .lock()
        .unwrap()
        .get(&token)
        .cloned()
        .ok_or_else(|| AppError::Auth("invalid or expired session".to_string()))?;

    if !is_email_allowed(&state.config.allowed_emails, user.email.as_deref()) {
        let who = user.email.unwrap_or(user.uid);
        return Err(AppError::Forbidden(format!("{who} is not authorized")));
    }

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::{demo_user, is_email_allowed, provider_error_message};

    fn allow_list() -> Vec<String> {
        vec!["foo@example.com".to_string(), "demo@bagcraft.com".to_string()]
    }

    #[test]
    fn allow_list_match_ignores_case_and_whitespace() {
        assert!(is_email_allowed(&allow_list(), Some("Foo@Example.com ")));
        assert!(is_email_allowed(&allow_list(), Some("foo@example.com")));
        assert!(!is_email_allowed(&allow_list(), Some("bar@example.com")));
    }

    #[test]
    fn missing_email_always_fails() {
        assert!(!is_email_allowed(&allow_list(), None));
        assert!(!is_email_allowed(&[], Some("foo@example.com")));
    }

    #[test]
    fn demo_identity_is_deterministic() {
        assert_eq!(demo_user(), demo_user());
        assert!(is_email_allowed(&allow_list(), demo_user().email.as_deref()));
    }

    #[test]
    fn provider_codes_map_to_friendly_messages() {
        assert_eq!(
            provider_error_message("auth/wrong-password"),
            "Incorrect password. Please try again."
        );
        assert_eq!(
            provider_error_message("auth/of-the-future"),
            "An error occurred. Please try again."
        );
    }
}
