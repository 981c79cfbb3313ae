//! Minimal gateway: JSON CRUD endpoints, one guarded route, health checks.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic
//!
//! Try:
//!   curl http://localhost:8080/users/42
//!   curl -X POST http://localhost:8080/users \
//!        -H 'authorization: Bearer letmein' \
//!        -d '{"name":"alice"}'
//!   curl -X DELETE http://localhost:8080/users/42
//!   curl http://localhost:8080/healthz
//!
//! `AUTH_ENABLED=false` lets the POST through without a token;
//! `STACK_SERVICE_PORT=:9000` moves the listener.

use async_trait::async_trait;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use stack_gateway::middleware::{AuthGuard, Authenticator};
use stack_gateway::{
    BoxError, Config, Context, Error, Registry, RegistryError, Router, Service, health,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Deserialize, Serialize)]
struct User {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct NewUser {
    name: String,
}

/// Accepts a single hard-coded token. Stand-in for a call to an auth service.
struct StaticToken(&'static str);

#[async_trait]
impl Authenticator for StaticToken {
    async fn validate_token(&self, token: &str) -> Result<bool, BoxError> {
        Ok(token == self.0)
    }
}

/// Logs the descriptor instead of talking to a real registry.
struct LogRegistry;

#[async_trait]
impl Registry for LogRegistry {
    async fn register(&self, service: &Service) -> Result<(), RegistryError> {
        let json = serde_json::to_string(service).map_err(RegistryError::failed)?;
        info!(service = %json, "registered");
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();
    let guard = AuthGuard::new(StaticToken("letmein")).enabled(config.auth_enabled);

    let app = Router::new()
        .with_registry(LogRegistry)
        .get("/users/{id}", get_user)
        .post("/users", guard.require_auth(create_user))
        .delete("/users/{id}", delete_user)
        .get("/healthz", health::liveness)
        .get("/readyz", health::readiness);

    let port = config.listen_addr().map(|a| a.port()).unwrap_or(8080);
    let service = Service::new("users", "localhost", port).health_check("/healthz");
    if let Err(e) = app.register(&service).await {
        tracing::warn!("registration failed: {e}");
    }

    if let Err(e) = app.run(&config).await {
        tracing::error!("fatal: {e}");
        std::process::exit(1);
    }
}

// GET /users/{id}
async fn get_user(mut ctx: Context) -> Result<(), Error> {
    let user = User { id: ctx.param("id").to_owned(), name: "alice".to_owned() };
    ctx.json(&user, StatusCode::OK)
}

// POST /users
async fn create_user(mut ctx: Context) -> Result<(), Error> {
    let input: NewUser = match ctx.bind().await {
        Ok(input) => input,
        Err(e) => {
            let body = serde_json::json!({ "_message": e.to_string() });
            return ctx.json(&body, StatusCode::BAD_REQUEST);
        }
    };
    let user = User { id: "99".to_owned(), name: input.name };
    ctx.json(&user, StatusCode::CREATED)
}

// DELETE /users/{id} → 204 No Content
async fn delete_user(mut ctx: Context) -> Result<(), Error> {
    ctx.send(stack_gateway::Response::status(StatusCode::NO_CONTENT))
}
