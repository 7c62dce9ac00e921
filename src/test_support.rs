//! Fixtures shared by the unit tests: a simulated provider and signed tokens.

use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::{
    cache::KeySetCache,
    config::OidcConfig,
    validation::TokenVerifier,
};

pub const ISSUER_PATH: &str = "/realms/test";
pub const CERTS_PATH: &str = "/realms/test/protocol/openid-connect/certs";
pub const TOKEN_PATH: &str = "/realms/test/protocol/openid-connect/token";
pub const KID: &str = "signing-key-1";
pub const AUDIENCE: &str = "account";
pub const CLIENT_ID: &str = "web-app";
pub const CLIENT_SECRET: &str = "client-secret";

pub const PROVIDER_KEY: &str = include_str!("../tests/fixtures/provider_key.pem");
const ROGUE_KEY: &str = include_str!("../tests/fixtures/rogue_key.pem");
const JWKS: &str = include_str!("../tests/fixtures/jwks.json");

pub fn jwks_document() -> Value {
    serde_json::from_str(JWKS).unwrap()
}

pub fn provider_url(server: &MockServer) -> String {
    format!("{}{ISSUER_PATH}", server.uri())
}

pub fn config_for(server: &MockServer) -> OidcConfig {
    OidcConfig::new(provider_url(server), CLIENT_ID)
        .with_client_secret(CLIENT_SECRET)
        .with_http_timeout(Duration::from_secs(5))
}

/// Starts a provider whose key endpoint serves the fixture key set.
pub async fn mock_provider() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CERTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_document()))
        .mount(&server)
        .await;
    server
}

pub fn verifier_for(server: &MockServer) -> TokenVerifier {
    let config = config_for(server);
    let keys = Arc::new(KeySetCache::from_config(reqwest::Client::new(), &config));
    TokenVerifier::from_config(keys, &config)
}

pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Claims a Keycloak access token for `user-1` would carry.
pub fn claims(server: &MockServer, exp: u64) -> Value {
    json!({
        "iss": provider_url(server),
        "aud": AUDIENCE,
        "sub": "user-1",
        "exp": exp,
        "iat": now(),
        "email": "ada@example.com",
        "name": "Ada Lovelace",
        "preferred_username": "ada",
    })
}

pub fn provider_key() -> EncodingKey {
    EncodingKey::from_rsa_pem(PROVIDER_KEY.as_bytes()).unwrap()
}

pub fn rogue_key() -> EncodingKey {
    EncodingKey::from_rsa_pem(ROGUE_KEY.as_bytes()).unwrap()
}

pub fn sign_with_kid(claims: &Value, kid: &str, key: &EncodingKey) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    encode(&header, claims, key).unwrap()
}

/// Signs `claims` with the key the provider publishes.
pub fn sign(claims: &Value) -> String {
    sign_with_kid(claims, KID, &provider_key())
}

