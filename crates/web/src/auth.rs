//! API key authentication
//!
//! Keys arrive in the `X-API-Key` header and are compared as SHA-256
//! digests so the comparison is fixed-width regardless of key length. An
//! empty key list disables auth entirely (local development).

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::server::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// SHA-256 digest of an API key
pub fn key_digest(key: &str) -> [u8; 32] {
    Sha256::digest(key.as_bytes()).into()
}

/// Whether the provided key matches any configured digest. Scans the whole
/// list unconditionally so timing does not reveal which key matched.
pub fn key_matches(digests: &[[u8; 32]], provided: &str) -> bool {
    let candidate = key_digest(provided);
    let mut matched = false;
    for digest in digests {
        let mut diff = 0u8;
        for (a, b) in digest.iter().zip(candidate.iter()) {
            diff |= a ^ b;
        }
        matched |= diff == 0;
    }
    matched
}

pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if state.key_digests.is_empty() {
        return next.run(request).await;
    }

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match provided {
        Some(key) if key_matches(&state.key_digests, key) => next.run(request).await,
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Invalid or missing API key" })),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_key_is_accepted() {
        let digests = vec![key_digest("secret-1"), key_digest("secret-2")];
        assert!(key_matches(&digests, "secret-1"));
        assert!(key_matches(&digests, "secret-2"));
    }

    #[test]
    fn wrong_key_is_rejected() {
        let digests = vec![key_digest("secret-1")];
        assert!(!key_matches(&digests, "secret-2"));
        assert!(!key_matches(&digests, ""));
    }

    #[test]
    fn empty_digest_list_matches_nothing() {
        assert!(!key_matches(&[], "anything"));
    }
}
