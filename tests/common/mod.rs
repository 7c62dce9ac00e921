//! Simulated identity provider for the integration tests.

use std::time::Duration;

use axum_oidc_session::OidcConfig;
use jsonwebtoken::{encode, get_current_timestamp, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

const REALM: &str = "/realms/test";

pub struct Provider {
    server: MockServer,
}

impl Provider {
    /// Starts a provider whose key endpoint is expected to be hit `fetches` times.
    pub async fn start(fetches: u64) -> Self {
        let server = MockServer::start().await;
        let jwks: Value = serde_json::from_str(include_str!("../fixtures/jwks.json")).unwrap();
        Mock::given(method("GET"))
            .and(path(format!("{REALM}/protocol/openid-connect/certs")))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks))
            .expect(fetches)
            .mount(&server)
            .await;
        Self { server }
    }

    pub fn config(&self) -> OidcConfig {
        OidcConfig::new(self.url(), "web-app")
            .with_client_secret("client-secret")
            .with_http_timeout(Duration::from_secs(5))
    }

    /// A token the provider itself would have issued.
    pub fn token(&self, lifetime_secs: i64) -> String {
        self.sign(lifetime_secs, include_str!("../fixtures/provider_key.pem"))
    }

    /// A well-formed token signed by a key the provider never published.
    pub fn forged_token(&self, lifetime_secs: i64) -> String {
        self.sign(lifetime_secs, include_str!("../fixtures/rogue_key.pem"))
    }

    pub async fn accept_code(&self, access_token: &str, expires_in: u64) {
        Mock::given(method("POST"))
            .and(path(format!("{REALM}/protocol/openid-connect/token")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": access_token,
                "refresh_token": "refresh-token",
                "expires_in": expires_in,
                "token_type": "Bearer",
            })))
            .mount(&self.server)
            .await;
    }

    fn url(&self) -> String {
        format!("{}{REALM}", self.server.uri())
    }

    /// Signs a Keycloak-shaped access token carrying claims beyond the
    /// identity fields.
    fn sign(&self, lifetime_secs: i64, pem: &str) -> String {
        let now = get_current_timestamp();
        let claims = json!({
            "iss": self.url(),
            "aud": "account",
            "sub": "user-1",
            "iat": now,
            "exp": now.saturating_add_signed(lifetime_secs),
            "email": "ada@example.com",
            "name": "Ada Lovelace",
            "preferred_username": "ada",
            "realm_access": { "roles": ["admin", "offline_access"] },
            "groups": ["/engineering"],
        });
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some("signing-key-1".to_string());
        encode(&header, &claims, &EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap()).unwrap()
    }
}
