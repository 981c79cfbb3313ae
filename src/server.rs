//! HTTP server and graceful shutdown.
//!
//! On SIGTERM or Ctrl-C the server:
//! 1. Immediately stops `listener.accept()`; no new connections are made.
//! 2. Lets every in-flight connection task run to completion.
//! 3. Returns from [`Server::serve`].
//!
//! A failure to bind the listening socket is returned as [`Error::Io`].
//! There is no restart loop here; binaries treat it as fatal.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::cors::Cors;
use crate::error::Error;
use crate::response::ResponseBody;
use crate::router::Router;

enum Bind {
    Addr(SocketAddr),
    Listener(TcpListener),
}

/// The HTTP server.
pub struct Server {
    bind: Bind,
    cors: Cors,
}

impl Server {
    /// Configures the server to bind to `addr` when it starts serving.
    pub fn bind(addr: SocketAddr) -> Self {
        Self { bind: Bind::Addr(addr), cors: Cors::permissive() }
    }

    /// Serves on an already-bound listener.
    pub fn from_listener(listener: TcpListener) -> Self {
        Self { bind: Bind::Listener(listener), cors: Cors::permissive() }
    }

    /// Replaces the default permissive CORS policy.
    pub fn cors(mut self, cors: Cors) -> Self {
        self.cors = cors;
        self
    }

    /// Starts accepting connections and dispatching them through `router`.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by all in-flight requests completing).
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        self.serve_with_shutdown(router, shutdown_signal()).await
    }

    /// As [`Server::serve`], but stops accepting when `signal` resolves.
    pub async fn serve_with_shutdown(
        self,
        router: Router,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let listener = match self.bind {
            Bind::Addr(addr) => TcpListener::bind(addr).await?,
            Bind::Listener(listener) => listener,
        };
        let local = listener.local_addr()?;

        let shared = Arc::new(Shared { router, cors: self.cors });

        info!(addr = %local, routes = shared.router.route_table().len(), "gateway listening");

        let mut tasks = tokio::task::JoinSet::new();

        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Check shutdown first so a SIGTERM stops accepting at once.
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let shared = Arc::clone(&shared);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let shared = Arc::clone(&shared);
                            async move { Ok::<_, Infallible>(shared.dispatch(req).await) }
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("gateway stopped");
        Ok(())
    }
}

impl Router {
    /// Serves this router on the address resolved from `config`, with the
    /// permissive CORS policy, until SIGTERM or Ctrl-C.
    ///
    /// ```rust,no_run
    /// # use stack_gateway::{Config, Context, Router};
    /// # async fn list(_: Context) {}
    /// # async fn run() -> Result<(), stack_gateway::Error> {
    /// let config = Config::from_env().with_port("9000");
    /// Router::new().get("/users", list).run(&config).await
    /// # }
    /// ```
    pub async fn run(self, config: &Config) -> Result<(), Error> {
        let addr = config.listen_addr()?;
        Server::bind(addr).serve(self).await
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

struct Shared {
    router: Router,
    cors: Cors,
}

impl Shared {
    /// Core hot path: one request in, one response out. Never fails; every
    /// error has already been turned into a response.
    async fn dispatch(&self, req: hyper::Request<Incoming>) -> http::Response<ResponseBody> {
        self.respond(req).await
    }

    async fn respond<B>(&self, req: http::Request<B>) -> http::Response<ResponseBody>
    where
        B: hyper::body::Body<Data = bytes::Bytes> + Send + 'static,
        B::Error: Into<crate::error::BoxError>,
    {
        if let Some(res) = self.cors.preflight(&req) {
            return res;
        }

        let started = Instant::now();
        let method = req.method().clone();
        let path = req.uri().path().to_owned();

        let mut res = self.router.handle(req).await;
        self.cors.apply(&mut res);

        debug!(
            %method,
            %path,
            status = res.status().as_u16(),
            latency_us = started.elapsed().as_micros() as u64,
            "request"
        );
        res
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or SIGINT (Ctrl-C only on Windows).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
