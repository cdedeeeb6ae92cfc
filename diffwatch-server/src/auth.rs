//! Basic-auth guard for everything under `/api`, populated from
//! `BASIC_AUTH_CREDS`. Grounded on the teacher's `axum::middleware::from_fn`
//! auth guard shape (`ferrex_server::handlers::users::auth::middleware`),
//! simplified from bearer-token session lookup to a static credential map
//! since spec.md §6 only names comma-separated `user:pass` pairs, not a
//! session/user model for the HTTP layer.

use std::collections::HashMap;

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use base64::Engine;

use crate::state::AppState;

pub async fn basic_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if check_authorization_header(header_value, &state.config.basic_auth_creds) {
        Ok(next.run(request).await)
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

fn check_authorization_header(header_value: &str, creds: &HashMap<String, String>) -> bool {
    let Some(encoded) = header_value.strip_prefix("Basic ") else {
        return false;
    };
    let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded) else {
        return false;
    };
    let Ok(credentials) = String::from_utf8(decoded) else {
        return false;
    };
    let Some((user, pass)) = credentials.split_once(':') else {
        return false;
    };
    creds.get(user).is_some_and(|expected| expected == pass)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> HashMap<String, String> {
        HashMap::from([("admin".to_string(), "password".to_string())])
    }

    fn basic_header(user: &str, pass: &str) -> String {
        let raw = format!("{user}:{pass}");
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(raw)
        )
    }

    #[test]
    fn accepts_matching_credentials() {
        assert!(check_authorization_header(&basic_header("admin", "password"), &creds()));
    }

    #[test]
    fn rejects_wrong_password() {
        assert!(!check_authorization_header(&basic_header("admin", "wrong"), &creds()));
    }

    #[test]
    fn rejects_unknown_user() {
        assert!(!check_authorization_header(&basic_header("nobody", "password"), &creds()));
    }

    #[test]
    fn rejects_non_basic_scheme() {
        assert!(!check_authorization_header("Bearer sometoken", &creds()));
    }
}
