//! Signing-key caching for OIDC token verification.
//!
//! [`KeySetCache`] owns the provider's key set. A refresh always produces a
//! complete [`KeySet`] which replaces the previous one in a single swap, so a
//! verification either sees the old set or the new one, never a mix.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, RwLock,
    },
    time::{Duration, Instant},
};

use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    config::{jwks_endpoint, AuthenticationConfigProvider},
    error::OidcError,
    jwks::fetch_key_set,
};

/// A public key from the provider together with the algorithms it may verify.
#[derive(Clone)]
pub struct VerificationKey {
    key: DecodingKey,
    algorithms: Vec<Algorithm>,
}

impl VerificationKey {
    /// Creates a new key that verifies only `algorithms`.
    #[must_use]
    pub fn new(key: DecodingKey, algorithms: Vec<Algorithm>) -> Self {
        Self { key, algorithms }
    }

    /// The key material handed to `jsonwebtoken`.
    #[must_use]
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }

    /// Algorithms this key may verify.
    #[must_use]
    pub fn algorithms(&self) -> &[Algorithm] {
        &self.algorithms
    }

    /// Whether a token signed with `alg` may be checked against this key.
    #[must_use]
    pub fn permits(&self, alg: Algorithm) -> bool {
        self.algorithms.contains(&alg)
    }
}

/// An immutable snapshot of the provider's signing keys, addressed by key id.
pub struct KeySet {
    keys: HashMap<String, VerificationKey>,
    fetched_at: Instant,
    ttl: Duration,
}

impl KeySet {
    /// Creates a new key set fetched at `fetched_at`, fresh for `ttl`.
    #[must_use]
    pub fn new(keys: HashMap<String, VerificationKey>, fetched_at: Instant, ttl: Duration) -> Self {
        Self {
            keys,
            fetched_at,
            ttl,
        }
    }

    /// Returns the key with id `kid`, if the set has one.
    #[must_use]
    pub fn get(&self, kid: &str) -> Option<&VerificationKey> {
        self.keys.get(kid)
    }

    /// Number of usable keys in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set has no usable keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// When the set was fetched from the provider.
    #[must_use]
    pub fn fetched_at(&self) -> Instant {
        self.fetched_at
    }

    /// A set is stale once more than its TTL has elapsed since the fetch.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.fetched_at.elapsed() > self.ttl
    }

    /// Whether the set may still stand in for a failed refresh.
    fn is_within_grace(&self, grace: Duration) -> bool {
        self.fetched_at.elapsed() <= self.ttl.saturating_add(grace)
    }
}

impl fmt::Debug for KeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kids: Vec<&String> = self.keys.keys().collect();
        kids.sort();
        f.debug_struct("KeySet")
            .field("kids", &kids)
            .field("fetched_at", &self.fetched_at)
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Fetches and caches the provider's signing keys.
///
/// Concurrent callers that find the cache stale share a single fetch: the
/// first one performs it while the others wait on the refresh guard and then
/// adopt whatever that fetch produced.
pub struct KeySetCache {
    client: reqwest::Client,
    jwks_uri: String,
    ttl: Duration,
    stale_grace: Duration,
    current: RwLock<Option<Arc<KeySet>>>,
    refresh_guard: Mutex<()>,
    /// Number of completed fetch attempts, successful or not.
    attempts: AtomicU64,
}

impl KeySetCache {
    /// Creates an empty cache for the keys at `jwks_uri`.
    ///
    /// `client` must be built with a request timeout
    /// ([`reqwest::ClientBuilder::timeout`]); a fetch adds none of its own.
    /// [`OidcAuth`](crate::OidcAuth) builds one from the configured HTTP
    /// timeout.
    #[must_use]
    pub fn new(client: reqwest::Client, jwks_uri: impl Into<String>, ttl: Duration) -> Self {
        Self {
            client,
            jwks_uri: jwks_uri.into(),
            ttl,
            stale_grace: Duration::ZERO,
            current: RwLock::new(None),
            refresh_guard: Mutex::new(()),
            attempts: AtomicU64::new(0),
        }
    }

    /// Creates a cache for the provider described by `config`.
    ///
    /// The `client` must carry a request timeout; see [`KeySetCache::new`].
    #[must_use]
    pub fn from_config(
        client: reqwest::Client,
        config: &(impl AuthenticationConfigProvider + ?Sized),
    ) -> Self {
        Self::new(
            client,
            jwks_endpoint(&config.get_provider_url()),
            config.get_jwks_cache_ttl(),
        )
        .with_stale_grace(config.get_stale_keys_grace())
    }

    /// Allows a stale key set to be served for up to `grace` past its TTL
    /// while the provider's key endpoint is failing.
    #[must_use]
    pub fn with_stale_grace(mut self, grace: Duration) -> Self {
        self.stale_grace = grace;
        self
    }

    /// The key endpoint this cache fetches from.
    #[must_use]
    pub fn jwks_uri(&self) -> &str {
        &self.jwks_uri
    }

    /// Returns the cached key set without touching the network.
    #[must_use]
    pub fn cached(&self) -> Option<Arc<KeySet>> {
        self.current.read().ok().and_then(|current| current.clone())
    }

    /// Returns the current key set, fetching it first if the cache is empty
    /// or stale.
    ///
    /// A failed fetch never clears the cache. The stale set is returned
    /// instead of the error only while it is within the configured grace.
    pub async fn get_keys(&self) -> Result<Arc<KeySet>, OidcError> {
        if let Some(fresh) = self.fresh() {
            return Ok(fresh);
        }

        let observed = self.attempts.load(Ordering::Acquire);
        let _guard = self.refresh_guard.lock().await;

        if let Some(fresh) = self.fresh() {
            return Ok(fresh);
        }
        if self.attempts.load(Ordering::Acquire) != observed {
            // A fetch finished while we waited and still left nothing fresh.
            return self.stale_fallback().ok_or_else(|| {
                OidcError::KeyFetch("concurrent JWKS refresh did not produce a key set".into())
            });
        }

        // Dropping this future mid-fetch releases the guard without touching
        // `current` or `attempts`; the next waiter fetches instead.
        let outcome = fetch_key_set(&self.client, &self.jwks_uri, self.ttl).await;
        self.attempts.fetch_add(1, Ordering::AcqRel);

        match outcome {
            Ok(key_set) => {
                let key_set = Arc::new(key_set);
                if let Ok(mut current) = self.current.write() {
                    *current = Some(Arc::clone(&key_set));
                }
                info!(url = %self.jwks_uri, key_count = key_set.len(), "JWKS cache refreshed");
                Ok(key_set)
            }
            Err(err) => match self.stale_fallback() {
                Some(stale) => {
                    warn!(url = %self.jwks_uri, error = %err, "JWKS refresh failed, serving stale keys");
                    Ok(stale)
                }
                None => {
                    warn!(url = %self.jwks_uri, error = %err, "JWKS refresh failed");
                    Err(err)
                }
            },
        }
    }

    fn fresh(&self) -> Option<Arc<KeySet>> {
        self.cached().filter(|keys| !keys.is_stale())
    }

    fn stale_fallback(&self) -> Option<Arc<KeySet>> {
        let stale = self.cached()?;
        if stale.is_within_grace(self.stale_grace) {
            Some(stale)
        } else {
            debug!(url = %self.jwks_uri, "Cached JWKS is past its grace period");
            None
        }
    }
}

impl fmt::Debug for KeySetCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySetCache")
            .field("jwks_uri", &self.jwks_uri)
            .field("ttl", &self.ttl)
            .field("stale_grace", &self.stale_grace)
            .field("current", &self.cached())
            .finish()
    }
}
