//! The verified caller identity handed to protected handlers.

use axum_core::extract::FromRequestParts;
use http::request::Parts;
use serde::{Deserialize, Serialize};

use crate::error::AuthRejection;

/// Minimal identity projected from a verified token.
///
/// Only the subject and three profile claims are ever copied out of a token;
/// roles, groups and any other claim stay behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// The token's `sub` claim.
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub preferred_username: Option<String>,
}

impl<S: Sync> FromRequestParts<S> for Identity {
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or(AuthRejection::Unauthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Request;

    fn identity() -> Identity {
        Identity {
            id: "user-1".into(),
            email: Some("ada@example.com".into()),
            name: Some("Ada Lovelace".into()),
            preferred_username: Some("ada".into()),
        }
    }

    #[tokio::test]
    async fn test_extractor_reads_request_extensions() {
        let (mut parts, ()) = Request::builder().body(()).unwrap().into_parts();
        parts.extensions.insert(identity());

        let extracted = Identity::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(extracted, identity());
    }

    #[tokio::test]
    async fn test_extractor_rejects_anonymous_request() {
        let (mut parts, ()) = Request::builder().body(()).unwrap().into_parts();

        let result = Identity::from_request_parts(&mut parts, &()).await;
        assert_eq!(result.unwrap_err(), AuthRejection::Unauthenticated);
    }

    #[test]
    fn test_serialized_fields() {
        let value = serde_json::to_value(identity()).unwrap();
        let mut keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, ["email", "id", "name", "preferred_username"]);
    }
}
