//! OpenID Connect authentication for axum services.
//!
//! Turns a one-time authorization code into session cookies and turns a
//! presented token (from the `auth_token` cookie or an `Authorization: Bearer`
//! header) into a verified [`Identity`].
//!
//! ```no_run
//! use axum_oidc_session::{OidcAuth, OidcConfig};
//!
//! # fn main() -> Result<(), axum_oidc_session::OidcError> {
//! let auth = OidcAuth::new(OidcConfig::from_env()?)?;
//! let layer = auth.layer();
//! # let _ = layer;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod exchange;
pub mod identity;
pub mod jwks;
pub mod layer;
pub mod middleware;
pub mod session;
pub mod token;
pub mod validation;

#[cfg(test)]
pub(crate) mod test_support;

pub use cache::{KeySet, KeySetCache};
pub use client::{LoginOutcome, OidcAuth};
pub use config::{AuthenticationConfigProvider, OidcConfig};
pub use error::{AuthRejection, OidcError};
pub use exchange::{TokenExchangeService, TokenSet};
pub use identity::Identity;
pub use layer::{OidcAuthLayer, OidcAuthService};
pub use middleware::{AuthContext, AuthMiddleware, AuthOutcome};
pub use session::{CookieSessionManager, CookieWriteOps};
pub use token::{TokenCandidate, TokenSource};
pub use validation::{TokenVerifier, VerifiedToken};
