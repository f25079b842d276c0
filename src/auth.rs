//! API key authentication middleware
//!
//! Optional: when `PRASHNA_API_KEYS` is unset the middleware is a pass-through,
//! which suits local and single-tenant deploys. When set, every protected
//! route requires a matching `X-API-Key` header.

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::env;

/// API key authentication errors
#[derive(Debug)]
pub enum AuthError {
    MissingApiKey,
    InvalidApiKey,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingApiKey => (StatusCode::UNAUTHORIZED, "Missing X-API-Key header"),
            AuthError::InvalidApiKey => (StatusCode::UNAUTHORIZED, "Invalid API key"),
        };
        (status, message).into_response()
    }
}

/// Constant-time string comparison to prevent timing attacks
///
/// Leaks only the length of the shorter string, which is acceptable for API
/// keys where lengths are not secret.
fn constant_time_compare(a: &str, b: &str) -> bool {
    let mut result = (a.len() ^ b.len()) as u8;

    let min_len = std::cmp::min(a.len(), b.len());
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();

    for i in 0..min_len {
        result |= a_bytes[i] ^ b_bytes[i];
    }

    result == 0
}

fn configured_keys() -> Vec<String> {
    env::var("PRASHNA_API_KEYS")
        .map(|keys| {
            keys.split(',')
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Middleware validating `X-API-Key` against the configured key set.
pub async fn auth_middleware(req: Request, next: Next) -> Result<Response, AuthError> {
    let keys = configured_keys();
    if keys.is_empty() {
        // Auth not configured: open instance
        return Ok(next.run(req).await);
    }

    let presented = req
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingApiKey)?;

    if keys.iter().any(|k| constant_time_compare(k, presented)) {
        Ok(next.run(req).await)
    } else {
        Err(AuthError::InvalidApiKey)
    }
}
