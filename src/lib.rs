//! # stack-gateway
//!
//! A thin HTTP service gateway. Register named routes, get a per-request
//! [`Context`], guard the ones that need it with a bearer token.
//!
//! ## Request flow
//!
//! ```text
//! request ─▶ Router (matchit) ─▶ Context::new ─▶ [middleware …] ─▶ handler
//!                                                   │
//!                                   AuthGuard: 401 {"_message": …} and stop
//! ```
//!
//! Exactly one [`Context`] is built per matched request. Middleware is
//! applied by hand when a route is registered; the router adds nothing
//! beyond building the context.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use http::StatusCode;
//! use serde::{Deserialize, Serialize};
//! use stack_gateway::middleware::{AuthGuard, Authenticator};
//! use stack_gateway::{Config, Context, Error, Router};
//!
//! #[derive(Deserialize, Serialize)]
//! struct User { name: String }
//!
//! async fn get_user(mut ctx: Context) -> Result<(), Error> {
//!     let user = User { name: ctx.param("id").to_owned() };
//!     ctx.json(&user, StatusCode::OK)
//! }
//!
//! async fn create_user(mut ctx: Context) -> Result<(), Error> {
//!     match ctx.bind::<User>().await {
//!         Ok(user) => ctx.json(&user, StatusCode::CREATED),
//!         Err(e) => ctx.json(&serde_json::json!({ "_message": e.to_string() }), StatusCode::BAD_REQUEST),
//!     }
//! }
//!
//! # fn auth_client() -> Arc<dyn Authenticator> { unimplemented!() }
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let config = Config::from_env();
//!     let guard = AuthGuard::new(auth_client()).enabled(config.auth_enabled);
//!
//!     Router::new()
//!         .get("/users/{id}", get_user)
//!         .post("/users", guard.require_auth(create_user))
//!         .run(&config)
//!         .await
//! }
//! ```

mod config;
mod context;
mod cors;
mod error;
mod handler;
mod registry;
mod response;
mod router;
mod server;

pub mod health;
pub mod middleware;

pub use config::{AUTH_ENABLED_ENV, Config, DEFAULT_PORT, PORT_ENV};
pub use context::Context;
pub use cors::Cors;
pub use error::{BoxError, DecodeError, Error, RegistryError};
pub use handler::{BoxFuture, BoxedHandler, Handler, IntoOutcome, Middleware};
pub use registry::{Registry, Service};
pub use response::{Response, ResponseBody, ResponseBuilder};
pub use router::{Route, RouteInfo, Router};
pub use server::Server;
