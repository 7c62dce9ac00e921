//! Request-time authentication as a pure pipeline step.
//!
//! [`AuthMiddleware::authenticate`] looks at a request's headers and returns
//! either [`AuthOutcome::Continue`] with the caller's identity or
//! [`AuthOutcome::ShortCircuit`] with the response to send instead. The
//! surrounding HTTP layer decides how to compose that; see
//! [`crate::layer::OidcAuthLayer`] for the tower adapter.

use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use http::HeaderMap;
use tracing::debug;

use crate::{
    error::{AuthRejection, OidcError},
    identity::Identity,
    session::{CookieSessionManager, CookieWriteOps},
    token::{find_candidate, TokenSource},
    validation::TokenVerifier,
};

/// What an authenticated request carries forward.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub identity: Identity,
    pub source: TokenSource,
    /// Cookie writes to attach to the response. Empty unless the token came
    /// from the Authorization header.
    pub cookie_writes: CookieWriteOps,
}

/// Result of authenticating one request.
#[derive(Debug, Clone)]
pub enum AuthOutcome {
    Continue(AuthContext),
    ShortCircuit(AuthRejection),
}

impl AuthOutcome {
    /// The authenticated identity, if the request may continue.
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Continue(context) => Some(&context.identity),
            Self::ShortCircuit(_) => None,
        }
    }
}

/// Authenticates requests with one shared [`TokenVerifier`].
#[derive(Debug, Clone)]
pub struct AuthMiddleware {
    verifier: Arc<TokenVerifier>,
    sessions: CookieSessionManager,
}

impl AuthMiddleware {
    /// Creates a new middleware step around a shared verifier.
    #[must_use]
    pub fn new(verifier: Arc<TokenVerifier>, sessions: CookieSessionManager) -> Self {
        Self { verifier, sessions }
    }

    /// The verifier this step authenticates with.
    #[must_use]
    pub fn verifier(&self) -> &Arc<TokenVerifier> {
        &self.verifier
    }

    /// Authenticates a request from its headers.
    ///
    /// The `auth_token` cookie is preferred over an `Authorization: Bearer`
    /// header. A verified header token is also returned as a cookie write so
    /// the browser can use the cookie from then on.
    pub async fn authenticate(&self, headers: &HeaderMap) -> AuthOutcome {
        let Some(candidate) = find_candidate(headers) else {
            debug!("No token in cookie or Authorization header");
            return AuthOutcome::ShortCircuit(OidcError::Unauthenticated.rejection());
        };

        match self.verifier.verify_token(&candidate.token).await {
            Ok(verified) => {
                let cookie_writes = match candidate.source {
                    TokenSource::Cookie => CookieWriteOps::default(),
                    TokenSource::Header => self.write_back(&candidate.token, verified.expires_at),
                };
                debug!(sub = %verified.identity.id, source = ?candidate.source, "Request authenticated");

                AuthOutcome::Continue(AuthContext {
                    identity: verified.identity,
                    source: candidate.source,
                    cookie_writes,
                })
            }
            Err(err) => {
                debug!(error = %err, source = ?candidate.source, "Token verification failed");
                AuthOutcome::ShortCircuit(err.rejection())
            }
        }
    }

    /// Cookie for a header-supplied token, living no longer than the token.
    fn write_back(&self, token: &str, expires_at: u64) -> CookieWriteOps {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let remaining = expires_at.saturating_sub(now);
        if remaining == 0 {
            return CookieWriteOps::default();
        }

        self.sessions
            .issue_access_token(token, Duration::from_secs(remaining))
    }
}
