//! Authorization-code exchange against the provider's token endpoint.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    config::{token_endpoint, AuthenticationConfigProvider},
    error::OidcError,
};

/// Tokens returned by a successful code exchange.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds.
    pub expires_in: u64,
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// The OAuth error fields of a rejected exchange; logged, never returned.
#[derive(Debug, Deserialize)]
struct ProviderError {
    error: String,
}

/// Exchanges one-time authorization codes for tokens.
///
/// Exchanges are never retried: a code is single-use, so a failed exchange is
/// final and the browser has to start a new login.
#[derive(Clone)]
pub struct TokenExchangeService {
    client: reqwest::Client,
    token_endpoint: String,
    client_id: String,
    client_secret: Option<String>,
}

impl TokenExchangeService {
    /// Creates a new service posting codes to `token_endpoint`.
    ///
    /// `client` must be built with a request timeout
    /// ([`reqwest::ClientBuilder::timeout`]); the exchange adds none of its
    /// own. [`OidcAuth`](crate::OidcAuth) builds one from the configured
    /// HTTP timeout.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        token_endpoint: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: Option<String>,
    ) -> Self {
        Self {
            client,
            token_endpoint: token_endpoint.into(),
            client_id: client_id.into(),
            client_secret,
        }
    }

    /// Creates a new service for the provider described by `config`.
    ///
    /// The `client` must carry a request timeout; see [`TokenExchangeService::new`].
    #[must_use]
    pub fn from_config(
        client: reqwest::Client,
        config: &(impl AuthenticationConfigProvider + ?Sized),
    ) -> Self {
        Self::new(
            client,
            token_endpoint(&config.get_provider_url()),
            config.get_client_id(),
            config.get_client_secret(),
        )
    }

    /// The token endpoint codes are posted to.
    #[must_use]
    pub fn token_endpoint(&self) -> &str {
        &self.token_endpoint
    }

    /// Exchanges `code` for a [`TokenSet`].
    ///
    /// Fails with [`OidcError::MissingClientSecret`] before any network call
    /// when no secret is configured, and with
    /// [`OidcError::ExchangeRejected`] when the provider refuses the code.
    pub async fn exchange(&self, code: &str, redirect_uri: &str) -> Result<TokenSet, OidcError> {
        let Some(client_secret) = self.client_secret.as_deref() else {
            warn!("Client secret is not configured, refusing code exchange");
            return Err(OidcError::MissingClientSecret);
        };

        debug!(
            endpoint = %self.token_endpoint,
            client_id = %self.client_id,
            redirect_uri = %redirect_uri,
            "Exchanging authorization code"
        );

        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", client_secret),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];

        let response = self
            .client
            .post(&self.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| OidcError::ExchangeTransport(format!("Failed to reach token endpoint: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let reason = response
                .json::<ProviderError>()
                .await
                .map(|body| body.error)
                .unwrap_or_else(|_| "unknown".to_string());
            warn!(status = status.as_u16(), reason = %reason, "Token endpoint rejected the code");
            return Err(OidcError::ExchangeRejected {
                status: status.as_u16(),
            });
        }

        let token_set: TokenSet = response
            .json()
            .await
            .map_err(|e| OidcError::ExchangeTransport(format!("Failed to parse token response: {e}")))?;

        info!(
            expires_in = token_set.expires_in,
            refresh_token = token_set.refresh_token.is_some(),
            "Authorization code exchanged"
        );

        Ok(token_set)
    }
}

impl std::fmt::Debug for TokenExchangeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenExchangeService")
            .field("token_endpoint", &self.token_endpoint)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{config_for, CLIENT_SECRET, TOKEN_PATH};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::{
        matchers::{body_string_contains, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn service_for(server: &MockServer) -> TokenExchangeService {
        TokenExchangeService::from_config(reqwest::Client::new(), &config_for(server))
    }

    #[tokio::test]
    async fn test_exchange_posts_form_and_parses_token_set() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("client_id=web-app"))
            .and(body_string_contains(format!("client_secret={CLIENT_SECRET}")))
            .and(body_string_contains("code=valid-code"))
            .and(body_string_contains("redirect_uri=https%3A%2F%2Fapp%2Fcb"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "access-token",
                "refresh_token": "refresh-token",
                "expires_in": 3600,
                "refresh_expires_in": 1800,
                "token_type": "Bearer",
                "scope": "openid email profile",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let token_set = service_for(&server)
            .exchange("valid-code", "https://app/cb")
            .await
            .unwrap();

        assert_eq!(token_set.access_token, "access-token");
        assert_eq!(token_set.refresh_token.as_deref(), Some("refresh-token"));
        assert_eq!(token_set.expires_in, 3600);
    }

    #[tokio::test]
    async fn test_missing_secret_fails_before_network_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut config = config_for(&server);
        config.client_secret = None;
        let service = TokenExchangeService::from_config(reqwest::Client::new(), &config);

        let err = service.exchange("valid-code", "https://app/cb").await.unwrap_err();
        assert!(matches!(err, OidcError::MissingClientSecret));
    }

    #[tokio::test]
    async fn test_rejected_code_carries_status_only() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "Code not valid",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = service_for(&server)
            .exchange("reused-code", "https://app/cb")
            .await
            .unwrap_err();

        assert!(matches!(err, OidcError::ExchangeRejected { status: 400 }));
        assert!(!err.to_string().contains("Code not valid"));
    }

    #[tokio::test]
    async fn test_timeout_is_a_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .unwrap();
        let service = TokenExchangeService::from_config(client, &config_for(&server));

        let err = service.exchange("valid-code", "https://app/cb").await.unwrap_err();
        assert!(matches!(err, OidcError::ExchangeTransport(_)));
    }

    #[tokio::test]
    async fn test_unparseable_success_body_is_a_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = service_for(&server)
            .exchange("valid-code", "https://app/cb")
            .await
            .unwrap_err();
        assert!(matches!(err, OidcError::ExchangeTransport(_)));
    }

    #[test]
    fn test_debug_hides_tokens() {
        let token_set = TokenSet {
            access_token: "access-token".into(),
            refresh_token: Some("refresh-token".into()),
            expires_in: 60,
        };
        let printed = format!("{token_set:?}");
        assert!(!printed.contains("access-token"));
        assert!(!printed.contains("refresh-token"));
    }
}
