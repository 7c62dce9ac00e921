//! Token signature and claim verification.

use std::sync::Arc;

use jsonwebtoken::{
    decode, decode_header, errors::ErrorKind, get_current_timestamp, DecodingKey, Validation,
};
use serde::Deserialize;
use tracing::debug;

use crate::{
    cache::KeySetCache, config::AuthenticationConfigProvider, error::OidcError, identity::Identity,
};

/// The only claims ever read out of a verified token.
///
/// `iss`, `aud` and `exp` are checked by `jsonwebtoken` itself; everything
/// not named here is ignored during deserialization.
#[derive(Debug, Deserialize)]
struct ProjectedClaims {
    sub: String,
    /// NumericDate; may carry a fractional part.
    exp: f64,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    preferred_username: Option<String>,
}

/// The expiry of a token whose signature has not been checked yet.
#[derive(Debug, Deserialize)]
struct UnverifiedExpiry {
    #[serde(default)]
    exp: Option<f64>,
}

/// Outcome of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub identity: Identity,
    /// The token's `exp` claim, in seconds since the Unix epoch.
    pub expires_at: u64,
}

/// Verifies bearer tokens against the provider's signing keys.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    keys: Arc<KeySetCache>,
    issuer: String,
    audience: String,
    leeway: u64,
}

impl TokenVerifier {
    /// Creates a verifier that accepts tokens from `issuer` for `audience`,
    /// with no clock-skew leeway.
    #[must_use]
    pub fn new(keys: Arc<KeySetCache>, issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            keys,
            issuer: issuer.into(),
            audience: audience.into(),
            leeway: 0,
        }
    }

    /// Creates a verifier expecting the issuer and audience from `config`.
    #[must_use]
    pub fn from_config(
        keys: Arc<KeySetCache>,
        config: &(impl AuthenticationConfigProvider + ?Sized),
    ) -> Self {
        Self::new(keys, config.get_provider_url(), config.get_audience())
            .with_leeway(config.get_clock_skew().as_secs())
    }

    /// Seconds of clock skew tolerated on `exp` and `nbf`.
    #[must_use]
    pub fn with_leeway(mut self, seconds: u64) -> Self {
        self.leeway = seconds;
        self
    }

    /// The key cache this verifier reads from.
    #[must_use]
    pub fn key_cache(&self) -> &Arc<KeySetCache> {
        &self.keys
    }

    /// Verifies `token` and projects it into an [`Identity`].
    pub async fn verify(&self, token: &str) -> Result<Identity, OidcError> {
        self.verify_token(token).await.map(|verified| verified.identity)
    }

    /// Verifies `token`, also returning its expiry.
    ///
    /// Steps: parse the header, reject a token already past `exp`, select the
    /// key by `kid` from the current key set, check the signature, then `iss`,
    /// `aud`, `exp` and `nbf`.
    ///
    /// A token past `exp` fails with [`OidcError::Expired`] whatever its
    /// signature or other claims, and never causes a key fetch.
    pub async fn verify_token(&self, token: &str) -> Result<VerifiedToken, OidcError> {
        let header = decode_header(token)
            .map_err(|e| OidcError::MalformedToken(format!("Failed to decode JWT header: {e}")))?;

        debug!(kid = ?header.kid, alg = ?header.alg, "Verifying token");

        if self.is_past_expiry(token) {
            debug!("Token is past its expiry");
            return Err(OidcError::Expired);
        }

        let key_set = self.keys.get_keys().await?;

        let kid = header.kid.as_deref().ok_or(OidcError::SignatureInvalid)?;
        let key = key_set.get(kid).ok_or_else(|| {
            debug!(kid = %kid, "No signing key for token kid");
            OidcError::SignatureInvalid
        })?;
        if !key.permits(header.alg) {
            debug!(kid = %kid, alg = ?header.alg, "Algorithm not permitted for key");
            return Err(OidcError::SignatureInvalid);
        }

        let mut validation = Validation::new(header.alg);
        validation.leeway = self.leeway;
        validation.validate_nbf = true;
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        let claims = decode::<ProjectedClaims>(token, key.decoding_key(), &validation)
            .map_err(classify)?
            .claims;

        Ok(VerifiedToken {
            identity: Identity {
                id: claims.sub,
                email: claims.email,
                name: claims.name,
                preferred_username: claims.preferred_username,
            },
            // Saturates: negative or NaN becomes 0.
            expires_at: claims.exp.floor() as u64,
        })
    }

    /// Reads `exp` without checking the signature. Only ever used to reject.
    fn is_past_expiry(&self, token: &str) -> bool {
        let mut validation = Validation::default();
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let Ok(data) = decode::<UnverifiedExpiry>(token, &DecodingKey::from_secret(&[]), &validation)
        else {
            return false;
        };
        let deadline = get_current_timestamp().saturating_sub(self.leeway);
        data.claims
            .exp
            .is_some_and(|exp| exp.is_finite() && (exp.floor() as u64) < deadline)
    }
}

fn classify(err: jsonwebtoken::errors::Error) -> OidcError {
    match err.kind() {
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidAlgorithmName
        | ErrorKind::InvalidKeyFormat
        | ErrorKind::InvalidRsaKey(_)
        | ErrorKind::InvalidEcdsaKey => OidcError::SignatureInvalid,
        // `nbf` in the future lands here too: outside the validity window.
        ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature => OidcError::Expired,
        ErrorKind::InvalidIssuer => OidcError::IssuerMismatch,
        ErrorKind::InvalidAudience => OidcError::AudienceMismatch,
        _ => OidcError::MalformedToken(err.to_string()),
    }
}
