//! Per-request authentication: resolve the authenticated user from
//! request context; if absent, 401.
//!
//! The concrete user/account model is an external collaborator here —
//! only its interface matters. This module generalizes an API-key
//! middleware into a bearer-token checker that, on success, inserts an
//! [`AuthenticatedUser`] into the request extensions; handlers then pull
//! it out via the `FromRequestParts` extractor below. A path that doesn't
//! require auth (or auth disabled entirely) still gets an anonymous
//! `AuthenticatedUser` so the extractor always has an identity to yield.

use std::collections::HashSet;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::config::AuthConfig;
use crate::error::UploadError;

/// The identity resolved for a request once a bearer token has been
/// validated. Opaque beyond the token itself — the concrete user/account
/// model lives outside this system's scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub token: String,
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = UploadError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or(UploadError::Unauthorized)
    }
}

/// Bearer-token checker, wired in front of the upload routes.
#[derive(Clone)]
pub struct BearerAuth {
    valid_tokens: Arc<HashSet<String>>,
    enabled: bool,
    protected_paths: Arc<Vec<String>>,
    public_paths: Arc<Vec<String>>,
}

impl BearerAuth {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            valid_tokens: Arc::new(config.tokens.iter().cloned().collect()),
            enabled: config.enabled,
            protected_paths: Arc::new(config.protected_paths.clone()),
            public_paths: Arc::new(config.public_paths.clone()),
        }
    }

    pub fn layer(&self) -> BearerAuthLayer {
        BearerAuthLayer { auth: self.clone() }
    }

    fn requires_auth(&self, path: &str) -> bool {
        if !self.enabled {
            return false;
        }
        if self.public_paths.iter().any(|p| path.starts_with(p.as_str())) {
            return false;
        }
        if self.protected_paths.is_empty() {
            return true;
        }
        self.protected_paths.iter().any(|p| path.starts_with(p.as_str()))
    }

    fn validate(&self, token: &str) -> bool {
        self.valid_tokens.contains(token)
    }
}

#[derive(Clone)]
pub struct BearerAuthLayer {
    auth: BearerAuth,
}

impl<S> Layer<S> for BearerAuthLayer {
    type Service = BearerAuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        BearerAuthMiddleware {
            inner,
            auth: self.auth.clone(),
        }
    }
}

#[derive(Clone)]
pub struct BearerAuthMiddleware<S> {
    inner: S,
    auth: BearerAuth,
}

impl<S> Service<Request<Body>> for BearerAuthMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future =
        std::pin::Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let path = req.uri().path().to_string();

        if !self.auth.requires_auth(&path) {
            req.extensions_mut().insert(AuthenticatedUser {
                token: String::new(),
            });
            let mut inner = self.inner.clone();
            return Box::pin(async move { inner.call(req).await });
        }

        let token = extract_bearer_token(&req);
        let auth = self.auth.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            match token {
                Some(token) if auth.validate(&token) => {
                    debug!(path = %path, "bearer token accepted");
                    req.extensions_mut().insert(AuthenticatedUser { token });
                    inner.call(req).await
                }
                Some(_) => {
                    warn!(path = %path, "invalid bearer token");
                    Ok(unauthorized_response())
                }
                None => {
                    warn!(path = %path, "missing bearer token");
                    Ok(unauthorized_response())
                }
            }
        })
    }
}

fn extract_bearer_token<B>(req: &Request<B>) -> Option<String> {
    req.headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::to_string)
}

fn unauthorized_response() -> Response {
    UploadError::Unauthorized.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(enabled: bool, protected: Vec<&str>, public: Vec<&str>) -> AuthConfig {
        AuthConfig {
            enabled,
            tokens: vec!["secret123".to_string()],
            protected_paths: protected.into_iter().map(String::from).collect(),
            public_paths: public.into_iter().map(String::from).collect(),
        }
    }

    #[test]
    fn disabled_auth_requires_nothing() {
        let auth = BearerAuth::new(&config(false, vec![], vec![]));
        assert!(!auth.requires_auth("/measurements"));
    }

    #[test]
    fn empty_protected_list_guards_everything_but_public_paths() {
        let auth = BearerAuth::new(&config(true, vec![], vec!["/health"]));
        assert!(auth.requires_auth("/measurements"));
        assert!(!auth.requires_auth("/health/live"));
    }

    #[test]
    fn specific_protected_paths_only_guard_their_prefix() {
        let auth = BearerAuth::new(&config(true, vec!["/measurements"], vec![]));
        assert!(auth.requires_auth("/measurements"));
        assert!(!auth.requires_auth("/health/live"));
    }

    #[test]
    fn token_validation() {
        let auth = BearerAuth::new(&config(true, vec![], vec![]));
        assert!(auth.validate("secret123"));
        assert!(!auth.validate("wrong"));
    }
}
