use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use crudkit_telemetry::{report, LogSeverity};
use secrecy::{ExposeSecret, SecretString};

pub const INVALID_TOKEN: &str = "Invalid token";

/// Shared token every request must present in `Authorization`.
#[derive(Clone)]
pub struct TokenAuth {
    token: Arc<SecretString>,
}

impl TokenAuth {
    pub fn new(token: SecretString) -> Self {
        Self {
            token: Arc::new(token),
        }
    }
}

/// The header may carry the token bare or as the credential of any scheme.
pub fn token_matches(header: Option<&str>, token: &str) -> bool {
    if token.is_empty() {
        return false;
    }
    let Some(value) = header else {
        return false;
    };
    let mut parts = value.trim().splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let credential = parts.next().map(str::trim).unwrap_or_default();
    scheme == token || credential == token
}

pub async fn require_token(State(auth): State<TokenAuth>, request: Request, next: Next) -> Response {
    let header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if token_matches(header, auth.token.expose_secret()) {
        return next.run(request).await;
    }
    report(LogSeverity::Warning, INVALID_TOKEN, Some(&request.uri().path()));
    (StatusCode::UNAUTHORIZED, INVALID_TOKEN).into_response()
}
