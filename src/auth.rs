//! Static bearer token validation
//!
//! The relay has exactly one credential, configured at startup. Validation
//! happens inside the handler rather than as a middleware layer because a
//! rejection must be rendered in the shape the caller asked for (event stream
//! or JSON envelope).

use std::borrow::Cow;

use axum::http::{header, HeaderMap};
use sha2::{Digest, Sha256};

use crate::error::{AuthFailure, SchemeProblem};

/// Read the raw `Authorization` header, if present
///
/// Non-ASCII bytes are decoded lossily so a present header is never mistaken
/// for a missing one.
pub fn authorization_header(headers: &HeaderMap) -> Option<Cow<'_, str>> {
    headers
        .get(header::AUTHORIZATION)
        .map(|value| String::from_utf8_lossy(value.as_bytes()))
}

/// Check an `Authorization` header value against the configured key
///
/// An empty header counts as missing. The header must split on single spaces
/// into exactly `Bearer` and the token.
pub fn validate_credentials(auth_header: Option<&str>, expected_key: &str) -> Result<(), AuthFailure> {
    let auth_header = match auth_header {
        Some(value) if !value.is_empty() => value,
        _ => return Err(AuthFailure::Missing),
    };

    let mut parts = auth_header.split(' ');
    let (scheme, token) = match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) => (scheme, token),
        _ => return Err(AuthFailure::MalformedScheme(SchemeProblem::Shape)),
    };

    if scheme != "Bearer" {
        return Err(AuthFailure::MalformedScheme(SchemeProblem::NotBearer));
    }

    if token != expected_key {
        return Err(AuthFailure::InvalidKey);
    }

    Ok(())
}

/// Fingerprint of a presented token for logging
pub fn token_fingerprint(auth_header: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(auth_header.as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}
