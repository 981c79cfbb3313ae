//! Middleware layer.
//!
//! Every middleware has the same shape: inspect the [`Context`], then either
//! terminate the request through the context or call `next`. See
//! [`Middleware`] for the composition rules.
//!
//! Built-in middleware:
//! - [`AuthGuard`]: bearer-token authentication against an [`Authenticator`]
//!
//! [`Context`]: crate::Context
//! [`Middleware`]: crate::Middleware

mod auth;

pub use auth::{AuthDecision, AuthGuard, Authenticator};
