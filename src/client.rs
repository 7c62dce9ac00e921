//! One-stop wiring of the verifier, exchange and cookie components.

use std::sync::Arc;

use axum_core::{
    body::Body,
    response::{IntoResponse, Response},
};
use http::{header, HeaderValue, StatusCode};
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    cache::KeySetCache,
    config::{AuthenticationConfigProvider, OidcConfig},
    error::OidcError,
    exchange::TokenExchangeService,
    identity::Identity,
    layer::OidcAuthLayer,
    middleware::AuthMiddleware,
    session::{CookieSessionManager, CookieWriteOps},
    validation::TokenVerifier,
};

/// Result of a completed login callback.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub identity: Identity,
    /// Lifetime of the issued access token in seconds.
    pub expires_in: u64,
    pub cookies: CookieWriteOps,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginBody<'a> {
    message: &'static str,
    user: &'a Identity,
    expires_in: u64,
}

impl IntoResponse for LoginOutcome {
    fn into_response(self) -> Response {
        let body = LoginBody {
            message: "Authentication successful",
            user: &self.identity,
            expires_in: self.expires_in,
        };
        let Ok(body) = serde_json::to_vec(&body) else {
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        };

        let mut response = Response::new(Body::from(body));
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.cookies.apply(response.headers_mut());
        response
    }
}

/// OIDC integration for one provider and client.
///
/// Construct once at startup and share; every handle it gives out points at
/// the same key cache and verifier.
#[derive(Debug, Clone)]
pub struct OidcAuth {
    verifier: Arc<TokenVerifier>,
    exchange: TokenExchangeService,
    sessions: CookieSessionManager,
    middleware: Arc<AuthMiddleware>,
}

impl OidcAuth {
    /// Validates `config` and builds the shared components.
    pub fn new(config: OidcConfig) -> Result<Self, OidcError> {
        config.validate()?;
        if config.client_secret.is_none() {
            warn!("Client secret is not configured; code exchange will fail");
        }
        Self::with_provider(&config)
    }

    /// Builds the components from any configuration provider.
    pub fn with_provider(
        config: &(impl AuthenticationConfigProvider + ?Sized),
    ) -> Result<Self, OidcError> {
        let client = reqwest::Client::builder()
            .timeout(config.get_http_timeout())
            .build()
            .map_err(|e| OidcError::Configuration(format!("Failed to create HTTP client: {e}")))?;

        let keys = Arc::new(KeySetCache::from_config(client.clone(), config));
        let verifier = Arc::new(TokenVerifier::from_config(keys, config));
        let exchange = TokenExchangeService::from_config(client, config);
        let sessions = CookieSessionManager::from_config(config);
        let middleware = Arc::new(AuthMiddleware::new(Arc::clone(&verifier), sessions));

        info!(
            provider = %config.get_provider_url(),
            client_id = %config.get_client_id(),
            "OIDC authentication initialised"
        );

        Ok(Self {
            verifier,
            exchange,
            sessions,
            middleware,
        })
    }

    /// The shared token verifier.
    #[must_use]
    pub fn verifier(&self) -> &Arc<TokenVerifier> {
        &self.verifier
    }

    /// The service used by the login callback.
    #[must_use]
    pub fn exchange_service(&self) -> &TokenExchangeService {
        &self.exchange
    }

    /// The cookie shaper used for login and logout.
    #[must_use]
    pub fn sessions(&self) -> CookieSessionManager {
        self.sessions
    }

    /// The per-request authentication step behind [`OidcAuth::layer`].
    #[must_use]
    pub fn middleware(&self) -> Arc<AuthMiddleware> {
        Arc::clone(&self.middleware)
    }

    /// A tower layer that protects the routes it wraps.
    #[must_use]
    pub fn layer(&self) -> OidcAuthLayer {
        OidcAuthLayer::new(self.middleware())
    }

    /// Completes a login callback: exchanges `code`, verifies the access
    /// token, and prepares the session cookies.
    pub async fn handle_token_exchange(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<LoginOutcome, OidcError> {
        if code.trim().is_empty() {
            return Err(OidcError::MissingAuthorizationCode);
        }

        let token_set = self.exchange.exchange(code, redirect_uri).await?;
        let identity = self.verifier.verify(&token_set.access_token).await?;
        let cookies = self.sessions.issue(&token_set);

        info!(sub = %identity.id, "Login completed");

        Ok(LoginOutcome {
            identity,
            expires_in: token_set.expires_in,
            cookies,
        })
    }

    /// Cookie writes that end the session.
    #[must_use]
    pub fn logout(&self) -> CookieWriteOps {
        self.sessions.clear()
    }
}
