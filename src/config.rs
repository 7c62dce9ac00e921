//! Configuration types and traits for OIDC authentication.

use std::{fmt, time::Duration};

use crate::error::OidcError;

/// Default TTL for the cached key set (1 hour)
pub const DEFAULT_JWKS_TTL: Duration = Duration::from_secs(3600);
/// Default timeout for calls to the provider (10 seconds)
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
/// Audience Keycloak stamps on access tokens issued to confidential clients.
pub const DEFAULT_AUDIENCE: &str = "account";

const TOKEN_PATH: &str = "/protocol/openid-connect/token";
const CERTS_PATH: &str = "/protocol/openid-connect/certs";

/// Trait for providing `OIDC` authentication configuration.
pub trait AuthenticationConfigProvider {
    /// Returns the URL of the `OIDC` provider, including the realm.
    ///
    /// This is also the exact value expected in the `iss` claim, such as
    /// `https://auth.example.com/realms/main`.
    fn get_provider_url(&self) -> String;

    /// Returns the client id registered with the provider.
    fn get_client_id(&self) -> String;

    /// Returns the client secret used for the code exchange, if configured.
    fn get_client_secret(&self) -> Option<String>;

    /// Returns the audience expected in the `aud` claim.
    fn get_audience(&self) -> String {
        DEFAULT_AUDIENCE.to_string()
    }

    /// Returns the TTL (time-to-live) for the cached `JWKS`.
    /// Defaults to 1 hour if not implemented.
    fn get_jwks_cache_ttl(&self) -> Duration {
        DEFAULT_JWKS_TTL
    }

    /// Returns how long past its TTL a cached key set may still be used when
    /// a refresh fails. Defaults to zero: a failed refresh is terminal.
    fn get_stale_keys_grace(&self) -> Duration {
        Duration::ZERO
    }

    /// Returns the timeout applied to every outbound provider call.
    fn get_http_timeout(&self) -> Duration {
        DEFAULT_HTTP_TIMEOUT
    }

    /// Returns the leeway applied to `exp`/`nbf` checks.
    fn get_clock_skew(&self) -> Duration {
        Duration::ZERO
    }

    /// Returns `true` when running in a production deployment, where
    /// session cookies must only travel over secure transport.
    fn is_production(&self) -> bool {
        false
    }
}

/// Builds the provider's token endpoint URL.
#[must_use]
pub fn token_endpoint(provider_url: &str) -> String {
    format!("{}{TOKEN_PATH}", provider_url.trim_end_matches('/'))
}

/// Builds the provider's signing-key endpoint URL.
#[must_use]
pub fn jwks_endpoint(provider_url: &str) -> String {
    format!("{}{CERTS_PATH}", provider_url.trim_end_matches('/'))
}

/// Plain configuration for an OIDC client, usable wherever an
/// [`AuthenticationConfigProvider`] is expected.
#[derive(Clone)]
pub struct OidcConfig {
    pub provider_url: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub audience: String,
    pub jwks_cache_ttl: Duration,
    pub stale_keys_grace: Duration,
    pub http_timeout: Duration,
    pub clock_skew: Duration,
    pub production: bool,
}

impl OidcConfig {
    /// Creates a configuration with defaults for everything but the provider
    /// and client id.
    #[must_use]
    pub fn new(provider_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            provider_url: provider_url.into(),
            client_id: client_id.into(),
            client_secret: None,
            audience: DEFAULT_AUDIENCE.to_string(),
            jwks_cache_ttl: DEFAULT_JWKS_TTL,
            stale_keys_grace: Duration::ZERO,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            clock_skew: Duration::ZERO,
            production: false,
        }
    }

    /// Sets the confidential client secret used for code exchange.
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Sets the audience tokens must carry in `aud`.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = audience.into();
        self
    }

    /// Sets how long a fetched key set stays fresh.
    #[must_use]
    pub fn with_jwks_cache_ttl(mut self, ttl: Duration) -> Self {
        self.jwks_cache_ttl = ttl;
        self
    }

    /// Sets how long past its TTL a key set may stand in for a failed refresh.
    #[must_use]
    pub fn with_stale_keys_grace(mut self, grace: Duration) -> Self {
        self.stale_keys_grace = grace;
        self
    }

    /// Sets the timeout for every call to the provider.
    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Sets the clock skew tolerated on `exp` and `nbf`.
    #[must_use]
    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    /// Marks the deployment as production, which makes cookies secure.
    #[must_use]
    pub fn production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }

    /// Reads the configuration from the process environment.
    ///
    /// See [`OidcConfig::from_lookup`] for the variables consulted.
    pub fn from_env() -> Result<Self, OidcError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// Recognised keys: `OIDC_PROVIDER_URL`, `OIDC_CLIENT_ID` (both required),
    /// `OIDC_CLIENT_SECRET`, `OIDC_AUDIENCE`, `OIDC_JWKS_CACHE_TTL_SECS`,
    /// `OIDC_STALE_KEYS_GRACE_SECS`, `OIDC_HTTP_TIMEOUT_SECS`,
    /// `OIDC_CLOCK_SKEW_SECS` and `APP_ENV` (`production` enables secure
    /// cookies).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, OidcError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| OidcError::Configuration(format!("{name} is required")))
        };
        let seconds = |name: &str, default: Duration| -> Result<Duration, OidcError> {
            match lookup(name) {
                None => Ok(default),
                Some(raw) => raw.trim().parse::<u64>().map(Duration::from_secs).map_err(|e| {
                    OidcError::Configuration(format!("{name} must be a number of seconds: {e}"))
                }),
            }
        };

        let mut config = Self::new(required("OIDC_PROVIDER_URL")?, required("OIDC_CLIENT_ID")?);
        config.client_secret = lookup("OIDC_CLIENT_SECRET").filter(|s| !s.is_empty());
        if let Some(audience) = lookup("OIDC_AUDIENCE").filter(|a| !a.is_empty()) {
            config.audience = audience;
        }
        config.jwks_cache_ttl = seconds("OIDC_JWKS_CACHE_TTL_SECS", DEFAULT_JWKS_TTL)?;
        config.stale_keys_grace = seconds("OIDC_STALE_KEYS_GRACE_SECS", Duration::ZERO)?;
        config.http_timeout = seconds("OIDC_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT)?;
        config.clock_skew = seconds("OIDC_CLOCK_SKEW_SECS", Duration::ZERO)?;
        config.production = lookup("APP_ENV").is_some_and(|env| env.eq_ignore_ascii_case("production"));
        Ok(config)
    }

    /// Checks the values every component relies on.
    pub fn validate(&self) -> Result<(), OidcError> {
        if self.provider_url.trim().is_empty() {
            return Err(OidcError::Configuration("provider URL is required".into()));
        }
        if !self.provider_url.starts_with("http://") && !self.provider_url.starts_with("https://") {
            return Err(OidcError::Configuration(format!(
                "provider URL must be an http(s) URL, got {}",
                self.provider_url
            )));
        }
        if self.client_id.trim().is_empty() {
            return Err(OidcError::Configuration("client id is required".into()));
        }
        if self.http_timeout.is_zero() {
            return Err(OidcError::Configuration("HTTP timeout must be non-zero".into()));
        }
        Ok(())
    }
}

impl fmt::Debug for OidcConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OidcConfig")
            .field("provider_url", &self.provider_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("audience", &self.audience)
            .field("jwks_cache_ttl", &self.jwks_cache_ttl)
            .field("stale_keys_grace", &self.stale_keys_grace)
            .field("http_timeout", &self.http_timeout)
            .field("clock_skew", &self.clock_skew)
            .field("production", &self.production)
            .finish()
    }
}

impl AuthenticationConfigProvider for OidcConfig {
    fn get_provider_url(&self) -> String {
        self.provider_url.clone()
    }

    fn get_client_id(&self) -> String {
        self.client_id.clone()
    }

    fn get_client_secret(&self) -> Option<String> {
        self.client_secret.clone()
    }

    fn get_audience(&self) -> String {
        self.audience.clone()
    }

    fn get_jwks_cache_ttl(&self) -> Duration {
        self.jwks_cache_ttl
    }

    fn get_stale_keys_grace(&self) -> Duration {
        self.stale_keys_grace
    }

    fn get_http_timeout(&self) -> Duration {
        self.http_timeout
    }

    fn get_clock_skew(&self) -> Duration {
        self.clock_skew
    }

    fn is_production(&self) -> bool {
        self.production
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_endpoints_tolerate_trailing_slash() {
        assert_eq!(
            token_endpoint("https://auth.example.com/realms/main/"),
            "https://auth.example.com/realms/main/protocol/openid-connect/token"
        );
        assert_eq!(
            jwks_endpoint("https://auth.example.com/realms/main"),
            "https://auth.example.com/realms/main/protocol/openid-connect/certs"
        );
    }

    #[test]
    fn test_from_lookup_applies_defaults() {
        let config = OidcConfig::from_lookup(lookup(&[
            ("OIDC_PROVIDER_URL", "https://auth.example.com/realms/main"),
            ("OIDC_CLIENT_ID", "web-app"),
        ]))
        .unwrap();

        assert_eq!(config.client_secret, None);
        assert_eq!(config.get_audience(), DEFAULT_AUDIENCE);
        assert_eq!(config.get_jwks_cache_ttl(), DEFAULT_JWKS_TTL);
        assert_eq!(config.get_stale_keys_grace(), Duration::ZERO);
        assert!(!config.is_production());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_reads_overrides() {
        let config = OidcConfig::from_lookup(lookup(&[
            ("OIDC_PROVIDER_URL", "https://auth.example.com/realms/main"),
            ("OIDC_CLIENT_ID", "web-app"),
            ("OIDC_CLIENT_SECRET", "s3cret"),
            ("OIDC_AUDIENCE", "api"),
            ("OIDC_JWKS_CACHE_TTL_SECS", "60"),
            ("OIDC_STALE_KEYS_GRACE_SECS", "300"),
            ("APP_ENV", "Production"),
        ]))
        .unwrap();

        assert_eq!(config.get_client_secret().as_deref(), Some("s3cret"));
        assert_eq!(config.get_audience(), "api");
        assert_eq!(config.get_jwks_cache_ttl(), Duration::from_secs(60));
        assert_eq!(config.get_stale_keys_grace(), Duration::from_secs(300));
        assert!(config.is_production());
    }

    #[test]
    fn test_from_lookup_requires_provider_and_client() {
        let err = OidcConfig::from_lookup(lookup(&[("OIDC_CLIENT_ID", "web-app")])).unwrap_err();
        assert!(matches!(err, OidcError::Configuration(msg) if msg.contains("OIDC_PROVIDER_URL")));

        let err = OidcConfig::from_lookup(lookup(&[
            ("OIDC_PROVIDER_URL", "https://auth.example.com"),
            ("OIDC_JWKS_CACHE_TTL_SECS", "soon"),
            ("OIDC_CLIENT_ID", "web-app"),
        ]))
        .unwrap_err();
        assert!(matches!(err, OidcError::Configuration(_)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(OidcConfig::new("", "web-app").validate().is_err());
        assert!(OidcConfig::new("auth.example.com", "web-app").validate().is_err());
        assert!(OidcConfig::new("https://auth.example.com", " ").validate().is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = OidcConfig::new("https://auth.example.com", "web-app").with_client_secret("s3cret");
        let printed = format!("{config:?}");
        assert!(!printed.contains("s3cret"));
        assert!(printed.contains("<redacted>"));
    }
}
