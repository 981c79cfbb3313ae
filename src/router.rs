//! Radix-tree request router.
//!
//! One tree per HTTP method, created the first time a route for that method
//! is registered. Every registered handler is wrapped so that, on a match,
//! the router builds the request's [`Context`] and hands it down the chain.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::BodyExt;
use matchit::Router as MatchitRouter;
use tracing::{debug, error};

use crate::context::{Body, Context, Datastore};
use crate::error::{BoxError, Error, RegistryError};
use crate::handler::{BoxedHandler, Handler};
use crate::registry::{Registry, Service};
use crate::response::{Response, ResponseBody};

// ── Route ─────────────────────────────────────────────────────────────────────

/// A `(method, pattern, handler)` binding with an optional name.
///
/// Patterns use `{name}` for a named segment and `{*name}` for a catch-all.
pub struct Route {
    name: String,
    method: Method,
    pattern: String,
    handler: BoxedHandler,
}

impl Route {
    pub fn new(method: Method, pattern: impl Into<String>, handler: impl Handler) -> Self {
        Self {
            name: String::new(),
            method,
            pattern: pattern.into(),
            handler: handler.into_boxed_handler(),
        }
    }

    /// Names the route for introspection. Names are not required to be unique.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// What [`Router::route_table`] reports for each registered route.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RouteInfo {
    pub name: String,
    pub method: Method,
    pub pattern: String,
}

// ── Router ────────────────────────────────────────────────────────────────────

/// The application router.
///
/// Build it once at startup, then hand it to [`Router::run`] or
/// [`Server::serve`](crate::Server::serve). Serving consumes the router, so
/// the route table is frozen for the rest of the process.
#[derive(Default)]
pub struct Router {
    trees: HashMap<Method, MatchitRouter<BoxedHandler>>,
    table: Vec<RouteInfo>,
    registry: Option<Arc<dyn Registry>>,
    datastore: Option<Datastore>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches the service-registry collaborator used by [`Router::register`].
    pub fn with_registry(mut self, registry: impl Registry) -> Self {
        self.registry = Some(Arc::new(registry));
        self
    }

    /// Attaches a datastore handle, reachable from every handler through
    /// [`Context::datastore`].
    pub fn with_datastore<T: Send + Sync + 'static>(mut self, store: T) -> Self {
        self.datastore = Some(Datastore(Arc::new(store)));
        self
    }

    /// Announces `service` to the registry. Errors are returned as-is; there
    /// is no retry.
    pub async fn register(&self, service: &Service) -> Result<(), Error> {
        let registry = self.registry.as_ref().ok_or(RegistryError::Unconfigured)?;
        registry.register(service).await?;
        Ok(())
    }

    /// Registers a route, rejecting an invalid pattern or a method + pattern
    /// pair that is already taken.
    pub fn try_route(&mut self, route: Route) -> Result<(), Error> {
        let Route { name, method, pattern, handler } = route;
        self.trees
            .entry(method.clone())
            .or_default()
            .insert(pattern.as_str(), handler)
            .map_err(|source| Error::Route { pattern: pattern.clone(), source })?;
        self.table.push(RouteInfo { name, method, pattern });
        Ok(())
    }

    /// Registers a route. Returns `self` for chaining.
    ///
    /// # Panics
    ///
    /// Panics if the pattern is invalid or conflicts with an existing route.
    pub fn route(mut self, route: Route) -> Self {
        if let Err(e) = self.try_route(route) {
            panic!("{e}");
        }
        self
    }

    /// Registers every route in `routes`, in order.
    ///
    /// # Panics
    ///
    /// As [`Router::route`].
    pub fn register_routes(self, routes: impl IntoIterator<Item = Route>) -> Self {
        routes.into_iter().fold(self, Self::route)
    }

    /// Register a handler for a method + path pair.
    ///
    /// ```rust,no_run
    /// # use stack_gateway::{Context, Router};
    /// # use http::Method;
    /// # async fn get_user(_: Context) {}
    /// # async fn create_user(_: Context) {}
    /// Router::new()
    ///     .on(Method::GET,  "/users/{id}", get_user)
    ///     .on(Method::POST, "/users",      create_user);
    /// ```
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.route(Route::new(method, path, handler))
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PUT, path, handler)
    }

    pub fn patch(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PATCH, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::DELETE, path, handler)
    }

    /// Every registered route, in registration order.
    pub fn route_table(&self) -> &[RouteInfo] {
        &self.table
    }

    fn lookup(&self, method: &Method, path: &str) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let matched = self.trees.get(method)?.at(path).ok()?;
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((matched.value.clone(), params))
    }

    /// Methods with a route matching `path`, for the `Allow` header.
    fn allowed(&self, path: &str) -> Vec<&Method> {
        let mut methods: Vec<&Method> = self.trees.iter()
            .filter(|(_, tree)| tree.at(path).is_ok())
            .map(|(m, _)| m)
            .collect();
        methods.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        methods
    }

    /// Dispatches one request in-process and returns its response.
    ///
    /// This is what the server calls for every request; it is public so the
    /// full chain can be driven without a socket.
    pub async fn handle<B>(&self, req: http::Request<B>) -> http::Response<ResponseBody>
    where
        B: hyper::body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        self.dispatch(req.map(|b| b.map_err(Into::into).boxed_unsync()))
            .await
            .into_inner()
    }

    async fn dispatch(&self, req: http::Request<Body>) -> Response {
        let method = req.method().clone();
        let path = req.uri().path().to_owned();

        let Some((handler, params)) = self.lookup(&method, &path) else {
            return self.unmatched(&method, &path, req.uri().query());
        };

        let (ctx, rx) = Context::new(req, params, self.datastore.clone());
        let outcome = handler.call(ctx).await;

        // The context (and its sender) is gone by now, so `rx` resolves
        // immediately either way.
        match (rx.await, outcome) {
            (Ok(res), Ok(())) => res,
            (Ok(res), Err(e)) => {
                error!(%method, %path, "handler failed after responding: {e}");
                res
            }
            (Err(_), Ok(())) => Response::status(StatusCode::OK),
            (Err(_), Err(e)) => {
                error!(%method, %path, "handler failed: {e}");
                Response::message(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error.")
            }
        }
    }

    fn unmatched(&self, method: &Method, path: &str, query: Option<&str>) -> Response {
        // Strict slash: `/users/` and `/users` name the same resource.
        let alt = toggle_trailing_slash(path);
        if let Some(alt) = &alt {
            if self.lookup(method, alt).is_some() {
                let location = match query {
                    Some(q) => format!("{alt}?{q}"),
                    None => alt.clone(),
                };
                debug!(%path, %location, "redirecting to canonical path");
                return Response::builder()
                    .status(StatusCode::MOVED_PERMANENTLY)
                    .header("location", &location)
                    .no_body();
            }
        }

        let mut allowed = self.allowed(path);
        if allowed.is_empty() {
            if let Some(alt) = &alt {
                allowed = self.allowed(alt);
            }
        }
        if allowed.is_empty() {
            return Response::message(StatusCode::NOT_FOUND, "Not found.");
        }
        let allow = allowed.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ");
        let mut res = Response::message(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed.");
        if let Ok(value) = http::HeaderValue::try_from(allow) {
            res.headers.push((http::header::ALLOW, value));
        }
        res
    }
}

fn toggle_trailing_slash(path: &str) -> Option<String> {
    if path == "/" {
        None
    } else if let Some(stripped) = path.strip_suffix('/') {
        Some(stripped.to_owned())
    } else {
        Some(format!("{path}/"))
    }
}
