//! Locating the presented token in an inbound request.

use axum_extra::extract::cookie::CookieJar;
use http::{header, HeaderMap};

use crate::session::ACCESS_TOKEN_COOKIE;

/// Where a candidate token was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Cookie,
    Header,
}

/// A token found in a request, not yet verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenCandidate {
    pub token: String,
    pub source: TokenSource,
}

/// Extracts the Bearer token from the Authorization header.
///
/// Returns `None` if the header is missing, is not valid text, does not use
/// the `Bearer` scheme, or carries an empty token.
#[must_use]
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|val| val.to_str().ok())
        .and_then(|val| val.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(ToString::to_string)
}

/// Extracts the access token from the session cookie.
#[must_use]
pub fn extract_cookie_token(headers: &HeaderMap) -> Option<String> {
    CookieJar::from_headers(headers)
        .get(ACCESS_TOKEN_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
}

/// Picks the token to verify: the session cookie wins over the header.
#[must_use]
pub fn find_candidate(headers: &HeaderMap) -> Option<TokenCandidate> {
    if let Some(token) = extract_cookie_token(headers) {
        return Some(TokenCandidate {
            token,
            source: TokenSource::Cookie,
        });
    }

    extract_bearer_token(headers).map(|token| TokenCandidate {
        token,
        source: TokenSource::Header,
    })
}
