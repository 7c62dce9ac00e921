//! Error types for OIDC authentication.

use axum_core::{
    body::Body,
    response::{IntoResponse, Response},
};
use http::{header, HeaderValue, StatusCode};

/// Errors that can occur while exchanging or verifying tokens.
///
/// The variants are diagnostic categories for logs and tests. They never
/// reach a client as-is; see [`OidcError::rejection`].
#[derive(Debug, thiserror::Error)]
pub enum OidcError {
    #[error("OIDC configuration error: {0}")]
    Configuration(String),
    #[error("client secret is not configured")]
    MissingClientSecret,
    #[error("authorization code is missing")]
    MissingAuthorizationCode,
    #[error("provider rejected the authorization code with status {status}")]
    ExchangeRejected { status: u16 },
    #[error("token exchange failed: {0}")]
    ExchangeTransport(String),
    #[error("JWKS fetch error: {0}")]
    KeyFetch(String),
    #[error("malformed token: {0}")]
    MalformedToken(String),
    #[error("token signature is invalid")]
    SignatureInvalid,
    #[error("token is expired")]
    Expired,
    #[error("token issuer does not match the provider")]
    IssuerMismatch,
    #[error("token audience does not match")]
    AudienceMismatch,
    #[error("no token presented")]
    Unauthenticated,
}

impl OidcError {
    /// Collapses the error into the response a client is allowed to see.
    #[must_use]
    pub fn rejection(&self) -> AuthRejection {
        match self {
            Self::Unauthenticated => AuthRejection::Unauthenticated,
            Self::MissingAuthorizationCode => AuthRejection::BadRequest,
            Self::Configuration(_)
            | Self::MissingClientSecret
            | Self::ExchangeRejected { .. }
            | Self::ExchangeTransport(_) => AuthRejection::ExchangeFailed,
            Self::KeyFetch(_)
            | Self::MalformedToken(_)
            | Self::SignatureInvalid
            | Self::Expired
            | Self::IssuerMismatch
            | Self::AudienceMismatch => AuthRejection::AuthenticationFailed,
        }
    }
}

impl IntoResponse for OidcError {
    fn into_response(self) -> Response {
        self.rejection().into_response()
    }
}

/// A client-visible authentication failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    /// No token was presented.
    Unauthenticated,
    /// A token was presented but could not be verified.
    AuthenticationFailed,
    /// The login callback could not be completed.
    ExchangeFailed,
    /// The login callback carried no authorization code.
    BadRequest,
}

impl AuthRejection {
    /// HTTP status sent for this rejection.
    #[must_use]
    pub fn status(self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::Unauthenticated | Self::AuthenticationFailed | Self::ExchangeFailed => {
                StatusCode::UNAUTHORIZED
            }
        }
    }

    /// The generic message sent as `{"error": ...}`.
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::Unauthenticated => "Authentication required",
            Self::AuthenticationFailed => "Authentication failed",
            Self::ExchangeFailed => "Token exchange failed",
            Self::BadRequest => "Authorization code is required",
        }
    }
}

impl std::fmt::Display for AuthRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message() }).to_string();

        Response::builder()
            .status(self.status())
            .header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(Body::from(body))
            .unwrap_or_else(|_| {
                let mut response = Response::new(Body::empty());
                *response.status_mut() = self.status();
                response
            })
    }
}
