//! Health-check handlers for the service registry.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? |
//! | **Readiness** | `/readyz` | Can the instance take traffic? |
//!
//! ```rust,no_run
//! use stack_gateway::{Router, Service, health};
//!
//! let app = Router::new()
//!     .get("/healthz", health::liveness)
//!     .get("/readyz", health::readiness);
//!
//! let svc = Service::new("users", "10.0.0.5", 8080).health_check("/healthz");
//! ```
//!
//! Replace `readiness` with your own handler when readiness depends on the
//! datastore or downstream services.

use http::StatusCode;
use serde_json::json;

use crate::context::Context;
use crate::error::Error;

/// Always `200 {"status": "ok"}`. No dependencies on purpose.
pub async fn liveness(mut ctx: Context) -> Result<(), Error> {
    ctx.json(&json!({ "status": "ok" }), StatusCode::OK)
}

/// `200 {"status": "ready"}`.
pub async fn readiness(mut ctx: Context) -> Result<(), Error> {
    ctx.json(&json!({ "status": "ready" }), StatusCode::OK)
}
