//! JWKS (JSON Web Key Set) fetching and conversion into verification keys.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use jsonwebtoken::{
    jwk::{AlgorithmParameters, EllipticCurve, Jwk, KeyAlgorithm, PublicKeyUse},
    Algorithm, DecodingKey,
};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{
    cache::{KeySet, VerificationKey},
    error::OidcError,
};

const RSA_ALGORITHMS: [Algorithm; 6] = [
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
];

/// Key set document as served by the provider.
///
/// Keys are kept as raw JSON so that one entry using an algorithm we do not
/// know cannot poison the whole document.
#[derive(Debug, Deserialize)]
struct RawJwkSet {
    keys: Vec<serde_json::Value>,
}

/// Fetches the provider's `JWKS` and builds a complete [`KeySet`] from it.
pub async fn fetch_key_set(
    client: &reqwest::Client,
    jwks_uri: &str,
    ttl: Duration,
) -> Result<KeySet, OidcError> {
    debug!(url = %jwks_uri, "Fetching JWKS");

    let response = client
        .get(jwks_uri)
        .send()
        .await
        .map_err(|e| OidcError::KeyFetch(format!("Failed to fetch JWKS: {e}")))?;

    if !response.status().is_success() {
        return Err(OidcError::KeyFetch(format!(
            "JWKS endpoint returned status {}",
            response.status()
        )));
    }

    let jwks: RawJwkSet = response
        .json()
        .await
        .map_err(|e| OidcError::KeyFetch(format!("Failed to parse JWKS: {e}")))?;

    key_set_from_jwks(jwks.keys, ttl)
}

/// Converts raw JWK entries into a [`KeySet`] stamped with the current time.
///
/// Encryption keys, symmetric keys, keys without a `kid` and keys that fail
/// to parse are skipped. A document with no usable key is an error.
pub fn key_set_from_jwks(
    entries: Vec<serde_json::Value>,
    ttl: Duration,
) -> Result<KeySet, OidcError> {
    let mut keys = HashMap::new();

    for entry in entries {
        let jwk: Jwk = match serde_json::from_value(entry) {
            Ok(jwk) => jwk,
            Err(e) => {
                warn!(error = %e, "Failed to parse JWK, skipping");
                continue;
            }
        };

        if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
            continue;
        }

        let Some(kid) = jwk.common.key_id.clone() else {
            debug!("JWK without kid, skipping");
            continue;
        };

        match verification_key(&jwk) {
            Ok(key) => {
                debug!(kid = %kid, algorithms = ?key.algorithms(), "Loaded JWK");
                keys.insert(kid, key);
            }
            Err(reason) => warn!(kid = %kid, reason = %reason, "Unusable JWK, skipping"),
        }
    }

    if keys.is_empty() {
        return Err(OidcError::KeyFetch("No usable signing keys in JWKS".into()));
    }

    Ok(KeySet::new(keys, Instant::now(), ttl))
}

/// Builds the decoding key for a JWK together with the algorithms it may verify.
fn verification_key(jwk: &Jwk) -> Result<VerificationKey, String> {
    let family: Vec<Algorithm> = match &jwk.algorithm {
        AlgorithmParameters::RSA(_) => RSA_ALGORITHMS.to_vec(),
        AlgorithmParameters::EllipticCurve(params) => match params.curve {
            EllipticCurve::P256 => vec![Algorithm::ES256],
            EllipticCurve::P384 => vec![Algorithm::ES384],
            ref curve => return Err(format!("unsupported EC curve {curve:?}")),
        },
        AlgorithmParameters::OctetKeyPair(params) => match params.curve {
            EllipticCurve::Ed25519 => vec![Algorithm::EdDSA],
            ref curve => return Err(format!("unsupported OKP curve {curve:?}")),
        },
        AlgorithmParameters::OctetKey(_) => {
            return Err("symmetric keys are never accepted for verification".into())
        }
    };

    let algorithms = match &jwk.common.key_algorithm {
        None => family,
        Some(declared) => {
            let alg = signing_algorithm(declared)
                .ok_or_else(|| format!("{declared:?} is not a signing algorithm"))?;
            if !family.contains(&alg) {
                return Err(format!("declared algorithm {alg:?} does not match the key type"));
            }
            vec![alg]
        }
    };

    let key = DecodingKey::from_jwk(jwk).map_err(|e| format!("invalid key material: {e}"))?;

    Ok(VerificationKey::new(key, algorithms))
}

fn signing_algorithm(alg: &KeyAlgorithm) -> Option<Algorithm> {
    match alg {
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    }
}
