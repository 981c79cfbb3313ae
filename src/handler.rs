//! Handler trait, type erasure, and middleware composition.
//!
//! # How handlers are stored
//!
//! The router holds handlers of *different* types in one table, so every
//! handler is erased behind a common interface and stored uniformly:
//!
//! ```text
//! async fn show(ctx: Context) { … }        ← user writes this
//!        ↓ router.get("/users/{id}", show)
//! show.into_boxed_handler()                 ← Handler blanket impl
//!        ↓
//! BoxedHandler(Arc::new(FnHandler(show)))   ← heap-allocated wrapper
//!        ↓
//! handler.call(ctx)  at request time        ← one vtable dispatch
//! ```
//!
//! # Middleware
//!
//! A middleware turns one handler into another. It receives the `next`
//! handler and returns a new one that inspects the [`Context`], then either
//! calls `next` or writes a response itself and stops. There is no global
//! middleware stack: wrap the handler before registering it, and the order
//! is exactly what you wrote.
//!
//! ```rust,no_run
//! # use stack_gateway::{BoxedHandler, Context, Handler, Middleware, Router};
//! # async fn show(_: Context) {}
//! fn logged(next: BoxedHandler) -> BoxedHandler {
//!     (move |ctx: Context| {
//!         let next = next.clone();
//!         async move {
//!             tracing::info!(path = ctx.path(), "hit");
//!             next.call(ctx).await
//!         }
//!     })
//!     .into_boxed_handler()
//! }
//!
//! Router::new().get("/users/{id}", logged.wrap(show));
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::error::Error;

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased handler future.
pub type BoxFuture = Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'static>>;

/// Internal dispatch interface.
pub(crate) trait ErasedHandler: Send + Sync + 'static {
    fn call(&self, ctx: Context) -> BoxFuture;
}

/// A type-erased handler shared across concurrent requests.
///
/// Cloning is one atomic reference-count increment.
#[derive(Clone)]
pub struct BoxedHandler(Arc<dyn ErasedHandler>);

impl BoxedHandler {
    /// Runs the handler against `ctx`.
    pub fn call(&self, ctx: Context) -> BoxFuture {
        self.0.call(ctx)
    }
}

// ── Handler output ────────────────────────────────────────────────────────────

/// What a handler may return: nothing, or a `Result` whose error the router
/// logs (and turns into a `500` if no response was written yet).
pub trait IntoOutcome {
    fn into_outcome(self) -> Result<(), Error>;
}

impl IntoOutcome for () {
    fn into_outcome(self) -> Result<(), Error> { Ok(()) }
}

impl IntoOutcome for Result<(), Error> {
    fn into_outcome(self) -> Result<(), Error> { self }
}

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid route handler.
///
/// Satisfied automatically by any `async fn` (or closure returning a future)
/// with the signature:
///
/// ```text
/// async fn name(ctx: Context) -> () | Result<(), Error>
/// ```
///
/// and by [`BoxedHandler`] itself, so a middleware-wrapped handler registers
/// like any other. The trait is sealed.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        BoxedHandler(Arc::new(FnHandler(self)))
    }
}

impl private::Sealed for BoxedHandler {}

impl Handler for BoxedHandler {
    fn into_boxed_handler(self) -> BoxedHandler { self }
}

/// Bridges a concrete handler `F` to the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    fn call(&self, ctx: Context) -> BoxFuture {
        let fut = (self.0)(ctx);
        Box::pin(async move { fut.await.into_outcome() })
    }
}

// ── Middleware ────────────────────────────────────────────────────────────────

/// A transformation from one handler into another.
///
/// Implemented for any `Fn(BoxedHandler) -> BoxedHandler`, and by
/// [`AuthGuard`](crate::middleware::AuthGuard).
pub trait Middleware {
    fn layer(&self, next: BoxedHandler) -> BoxedHandler;

    /// Wraps `handler` with this middleware.
    fn wrap(&self, handler: impl Handler) -> BoxedHandler
    where
        Self: Sized,
    {
        self.layer(handler.into_boxed_handler())
    }
}

impl<F> Middleware for F
where
    F: Fn(BoxedHandler) -> BoxedHandler,
{
    fn layer(&self, next: BoxedHandler) -> BoxedHandler {
        self(next)
    }
}
