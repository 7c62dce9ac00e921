//! Session cookies carrying the provider's tokens.

use std::{convert::Infallible, time::Duration};

use axum_core::response::{IntoResponseParts, ResponseParts};
use axum_extra::extract::cookie::{Cookie, SameSite};
use http::{header, HeaderMap, HeaderValue};
use time::OffsetDateTime;
use tracing::warn;

use crate::{config::AuthenticationConfigProvider, exchange::TokenSet};

/// Cookie holding the access token.
pub const ACCESS_TOKEN_COOKIE: &str = "auth_token";
/// Cookie holding the refresh token.
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";
/// Lifetime of the refresh-token cookie (30 days).
pub const REFRESH_TOKEN_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Cookie writes for the HTTP layer to apply to a response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CookieWriteOps {
    cookies: Vec<Cookie<'static>>,
}

impl CookieWriteOps {
    /// Whether there is nothing to write.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Number of cookie writes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    /// Iterates over the cookie writes in the order they are applied.
    pub fn iter(&self) -> impl Iterator<Item = &Cookie<'static>> {
        self.cookies.iter()
    }

    /// Returns the write for the cookie called `name`, if any.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Cookie<'static>> {
        self.cookies.iter().find(|cookie| cookie.name() == name)
    }

    fn push(&mut self, cookie: Cookie<'static>) {
        self.cookies.push(cookie);
    }

    /// Appends one `Set-Cookie` header per write.
    ///
    /// A cookie that cannot be expressed as a header value is skipped and
    /// logged; the remaining writes are still applied.
    pub fn apply(&self, headers: &mut HeaderMap) {
        for cookie in &self.cookies {
            match HeaderValue::from_str(&cookie.to_string()) {
                Ok(value) => {
                    headers.append(header::SET_COOKIE, value);
                }
                Err(e) => warn!(cookie = cookie.name(), error = %e, "Skipping unencodable cookie"),
            }
        }
    }
}

impl IntoResponseParts for CookieWriteOps {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        self.apply(res.headers_mut());
        Ok(res)
    }
}

/// Shapes the session cookies. Never reads requests or calls the network.
#[derive(Debug, Clone, Copy)]
pub struct CookieSessionManager {
    secure: bool,
}

impl CookieSessionManager {
    /// `secure` restricts the cookies to secure transport; set it in production.
    #[must_use]
    pub fn new(secure: bool) -> Self {
        Self { secure }
    }

    /// Creates a new manager with secure cookies in production.
    #[must_use]
    pub fn from_config(config: &(impl AuthenticationConfigProvider + ?Sized)) -> Self {
        Self::new(config.is_production())
    }

    /// Writes for a fresh login: the access token for as long as it is valid,
    /// and the refresh token, when present, for [`REFRESH_TOKEN_MAX_AGE`].
    #[must_use]
    pub fn issue(&self, token_set: &TokenSet) -> CookieWriteOps {
        let mut ops = self.issue_access_token(
            &token_set.access_token,
            Duration::from_secs(token_set.expires_in),
        );
        if let Some(refresh_token) = &token_set.refresh_token {
            ops.push(self.cookie(REFRESH_TOKEN_COOKIE, refresh_token.clone(), REFRESH_TOKEN_MAX_AGE));
        }
        ops
    }

    /// Write for the access-token cookie alone.
    #[must_use]
    pub fn issue_access_token(&self, access_token: &str, max_age: Duration) -> CookieWriteOps {
        let mut ops = CookieWriteOps::default();
        ops.push(self.cookie(ACCESS_TOKEN_COOKIE, access_token.to_string(), max_age));
        ops
    }

    /// Writes that expire both session cookies immediately.
    #[must_use]
    pub fn clear(&self) -> CookieWriteOps {
        let mut ops = CookieWriteOps::default();
        for name in [ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE] {
            let mut cookie = self.cookie(name, String::new(), Duration::ZERO);
            cookie.set_expires(OffsetDateTime::UNIX_EPOCH);
            ops.push(cookie);
        }
        ops
    }

    fn cookie(&self, name: &'static str, value: String, max_age: Duration) -> Cookie<'static> {
        let seconds = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);

        Cookie::build((name, value))
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Strict)
            .path("/")
            .max_age(time::Duration::seconds(seconds))
            .build()
    }
}
