//! Bearer-token authentication middleware.
//!
//! ```text
//! Authorization: Bearer <token>
//! ```
//!
//! The guard never mints or inspects tokens itself. It pulls the second
//! whitespace-separated word out of the `Authorization` header and asks an
//! [`Authenticator`] whether it is valid.

use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use tracing::{debug, warn};

use crate::context::Context;
use crate::error::BoxError;
use crate::handler::{BoxedHandler, Handler, Middleware};
use crate::response::Response;

pub(crate) const NO_TOKEN: &str = "No token detected.";
pub(crate) const UNAUTHORIZED: &str = "Unauthorized.";

/// Validates bearer tokens, typically by calling an external auth service.
///
/// Called concurrently from many requests; implementations own their
/// synchronization.
#[async_trait]
pub trait Authenticator: Send + Sync + 'static {
    async fn validate_token(&self, token: &str) -> Result<bool, BoxError>;
}

#[async_trait]
impl<A: Authenticator + ?Sized> Authenticator for Arc<A> {
    async fn validate_token(&self, token: &str) -> Result<bool, BoxError> {
        (**self).validate_token(token).await
    }
}

/// The outcome of checking one request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AuthDecision {
    /// Enforcement is switched off; the request passes unchecked.
    Bypass,
    /// No `Authorization` header at all.
    MissingToken,
    /// Header present but malformed, or the authenticator said no (or failed).
    Rejected,
    Accepted,
}

/// Guards handlers behind a valid bearer token.
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use stack_gateway::{Config, Context, Router};
/// # use stack_gateway::middleware::{AuthGuard, Authenticator};
/// # async fn profile(_: Context) {}
/// # fn auth_client() -> Arc<dyn Authenticator> { unimplemented!() }
/// let config = Config::from_env();
/// let guard = AuthGuard::new(auth_client()).enabled(config.auth_enabled);
///
/// Router::new().get("/me", guard.require_auth(profile));
/// ```
#[derive(Clone)]
pub struct AuthGuard {
    authenticator: Arc<dyn Authenticator>,
    enabled: bool,
}

impl AuthGuard {
    /// A guard that enforces authentication.
    pub fn new(authenticator: impl Authenticator) -> Self {
        Self { authenticator: Arc::new(authenticator), enabled: true }
    }

    /// Switches enforcement on or off. With `false` every request is let
    /// through untouched; meant for local development only.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Wraps `next` so it only runs for requests carrying a valid token.
    /// Otherwise the request ends with a `401` JSON body and `next` is never
    /// called.
    pub fn require_auth(&self, next: impl Handler) -> BoxedHandler {
        let guard = self.clone();
        let next = next.into_boxed_handler();
        (move |mut ctx: Context| {
            let guard = guard.clone();
            let next = next.clone();
            async move {
                // Lookup is case-insensitive already; the second probe covers
                // contexts whose headers were copied verbatim from elsewhere.
                let mut header = ctx.header("Authorization");
                if header.is_empty() {
                    header = ctx.header("authorization");
                }
                let header = header.to_owned();

                match guard.authorize(&header).await {
                    AuthDecision::Bypass | AuthDecision::Accepted => next.call(ctx).await,
                    AuthDecision::MissingToken => {
                        debug!(path = ctx.path(), "rejecting request without token");
                        ctx.send(Response::message(StatusCode::UNAUTHORIZED, NO_TOKEN))
                    }
                    AuthDecision::Rejected => {
                        ctx.send(Response::message(StatusCode::UNAUTHORIZED, UNAUTHORIZED))
                    }
                }
            }
        })
        .into_boxed_handler()
    }

    /// Decides what to do with a request whose `Authorization` header is
    /// `header` (empty when absent).
    pub async fn authorize(&self, header: &str) -> AuthDecision {
        if !self.enabled {
            return AuthDecision::Bypass;
        }
        if header.is_empty() {
            return AuthDecision::MissingToken;
        }
        // A lone word (no scheme, or no token) is rejected rather than
        // forwarded to the authenticator.
        let Some(token) = bearer_token(header) else {
            warn!("malformed authorization header");
            return AuthDecision::Rejected;
        };
        match self.authenticator.validate_token(token).await {
            Ok(true) => AuthDecision::Accepted,
            Ok(false) => {
                warn!("invalid token");
                AuthDecision::Rejected
            }
            Err(e) => {
                warn!("token validation failed: {e}");
                AuthDecision::Rejected
            }
        }
    }
}

impl Middleware for AuthGuard {
    fn layer(&self, next: BoxedHandler) -> BoxedHandler {
        self.require_auth(next)
    }
}

/// Second whitespace-delimited word of the header value.
fn bearer_token(header: &str) -> Option<&str> {
    header.split_whitespace().nth(1)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Accepts exactly one token and records every token it was asked about.
    struct OneToken {
        good: &'static str,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Authenticator for OneToken {
        async fn validate_token(&self, token: &str) -> Result<bool, BoxError> {
            self.seen.lock().unwrap().push(token.to_owned());
            if token == "explode" {
                return Err("auth service unavailable".into());
            }
            Ok(token == self.good)
        }
    }

    fn guard() -> (AuthGuard, Arc<OneToken>) {
        let auth = Arc::new(OneToken { good: "goodtoken", seen: Mutex::default() });
        (AuthGuard::new(Arc::clone(&auth)), auth)
    }

    #[test]
    fn bearer_token_takes_second_word() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("Bearer   abc  extra"), Some("abc"));
        assert_eq!(bearer_token("abc"), None);
        assert_eq!(bearer_token("   "), None);
    }

    #[tokio::test]
    async fn decisions() {
        let (guard, auth) = guard();
        assert_eq!(guard.authorize("").await, AuthDecision::MissingToken);
        assert_eq!(guard.authorize("Bearer goodtoken").await, AuthDecision::Accepted);
        assert_eq!(guard.authorize("Bearer badtoken").await, AuthDecision::Rejected);
        assert_eq!(guard.authorize("Bearer explode").await, AuthDecision::Rejected);
        assert_eq!(guard.authorize("goodtoken").await, AuthDecision::Rejected);
        assert_eq!(*auth.seen.lock().unwrap(), ["goodtoken", "badtoken", "explode"]);
    }

    #[tokio::test]
    async fn disabled_guard_bypasses_everything() {
        let (guard, auth) = guard();
        let guard = guard.enabled(false);
        assert_eq!(guard.authorize("").await, AuthDecision::Bypass);
        assert_eq!(guard.authorize("Bearer badtoken").await, AuthDecision::Bypass);
        assert!(auth.seen.lock().unwrap().is_empty());
    }
}
