//! Header extraction helpers.

use axum::http::{HeaderMap, header};

/// Pull the bearer token out of the `Authorization` header.
///
/// Absence (or a malformed header) is `None`, not an immediate 401: the
/// credential verifier owns the missing-credential decision, and
/// optional-auth routes proceed anonymously.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() { None } else { Some(token) }
}
