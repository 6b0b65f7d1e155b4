//! Admin allowlist check
//!
//! Every `/api/admin/*` request must carry an `X-Admin-Email` header naming
//! an address on the configured allowlist. An empty allowlist admits nobody.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{extract::Request, response::IntoResponse, response::Response};
use lv_common::config::AdminAllowlist;
use tower::{Layer, Service};

use crate::error::ApiError;

/// Header carrying the caller's admin e-mail
pub const ADMIN_EMAIL_HEADER: &str = "x-admin-email";

/// Tower layer enforcing the admin allowlist
#[derive(Clone)]
pub struct AdminAuthLayer {
    allowlist: Arc<AdminAllowlist>,
}

impl AdminAuthLayer {
    pub fn new(allowlist: Arc<AdminAllowlist>) -> Self {
        Self { allowlist }
    }
}

impl<S> Layer<S> for AdminAuthLayer {
    type Service = AdminAuth<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AdminAuth {
            inner,
            allowlist: self.allowlist.clone(),
        }
    }
}

/// Service produced by [`AdminAuthLayer`]
#[derive(Clone)]
pub struct AdminAuth<S> {
    inner: S,
    allowlist: Arc<AdminAllowlist>,
}

/// Check the request's admin header against the allowlist
pub fn authorize(allowlist: &AdminAllowlist, request: &Request) -> Result<(), ApiError> {
    let email = request
        .headers()
        .get(ADMIN_EMAIL_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::Forbidden("Missing X-Admin-Email header".to_string()))?;

    if allowlist.is_authorized(email) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!("{} is not an admin", email)))
    }
}

impl<S> Service<Request> for AdminAuth<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let verdict = authorize(&self.allowlist, &request);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            match verdict {
                Ok(()) => inner.call(request).await,
                Err(error) => {
                    tracing::warn!(
                        path = %request.uri().path(),
                        error = %error,
                        "Rejected admin request"
                    );
                    Ok(error.into_response())
                }
            }
        })
    }
}
