//! Axum layer and service implementation for OIDC authentication.

use std::{future::Future, pin::Pin, sync::Arc};

use axum_core::{
    extract::Request,
    response::{IntoResponse, Response},
};
use tower::{BoxError, Layer, Service};

use crate::middleware::{AuthMiddleware, AuthOutcome};

/// A layer that authenticates every request before it reaches the inner
/// service.
///
/// Authenticated requests get the caller's [`Identity`](crate::Identity) in
/// their extensions. Anything else is answered with a generic `401` and never
/// reaches the inner service.
#[derive(Clone)]
pub struct OidcAuthLayer {
    middleware: Arc<AuthMiddleware>,
}

impl OidcAuthLayer {
    /// Creates a new layer running `middleware` on each request.
    #[must_use]
    pub fn new(middleware: Arc<AuthMiddleware>) -> Self {
        Self { middleware }
    }
}

impl<S> Layer<S> for OidcAuthLayer {
    type Service = OidcAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        OidcAuthService {
            inner,
            middleware: Arc::clone(&self.middleware),
        }
    }
}

/// The service produced by [`OidcAuthLayer`].
#[derive(Clone)]
pub struct OidcAuthService<S> {
    inner: S,
    middleware: Arc<AuthMiddleware>,
}

impl<S> Service<Request> for OidcAuthService<S>
where
    S: Service<Request, Response = Response> + Send + 'static + Clone,
    S::Future: Send + 'static,
    S::Error: Into<BoxError>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let middleware = Arc::clone(&self.middleware);
        // Take the instance that was driven to readiness, leave a clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let (mut parts, body) = req.into_parts();

            let context = match middleware.authenticate(&parts.headers).await {
                AuthOutcome::Continue(context) => context,
                AuthOutcome::ShortCircuit(rejection) => return Ok(rejection.into_response()),
            };

            parts.extensions.insert(context.identity);

            let mut response = inner.call(Request::from_parts(parts, body)).await?;
            context.cookie_writes.apply(response.headers_mut());
            Ok(response)
        })
    }
}
