//! Unified error types.

use thiserror::Error;

/// Boxed, thread-safe error used at collaborator seams (authenticator,
/// registry, body transport).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by the gateway's fallible operations.
///
/// Rejections the client should see (401, 404, 405) are expressed as HTTP
/// responses, not as `Error`s. This type surfaces everything else: body
/// decoding, response writing, route registration, configuration, and
/// binding the listening socket.
#[derive(Debug, Error)]
pub enum Error {
    #[error("decode: {0}")]
    Decode(#[from] DecodeError),

    /// A handler tried to write a second response on the same context.
    #[error("response already sent")]
    DoubleWrite,

    /// The payload could not be encoded as JSON. The client has already
    /// been sent a 500 plain-text fallback when this is returned.
    #[error("serialize: {0}")]
    Serialization(#[source] serde_json::Error),

    /// Binding or accepting on the listening socket failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("registry: {0}")]
    Registry(#[from] RegistryError),

    #[error("invalid route `{pattern}`: {source}")]
    Route {
        pattern: String,
        #[source]
        source: matchit::InsertError,
    },

    #[error("config: {0}")]
    Config(String),
}

/// Failure to turn a request body into the caller's type.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The body stream was already taken by an earlier `bind`.
    #[error("request body already consumed")]
    Consumed,

    #[error("request body is empty")]
    Empty,

    #[error("reading request body: {0}")]
    Read(#[source] BoxError),

    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure reported by the service-registry collaborator.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no registry configured")]
    Unconfigured,

    #[error("{0}")]
    Failed(#[source] BoxError),
}

impl RegistryError {
    /// Wraps any collaborator error.
    pub fn failed(e: impl Into<BoxError>) -> Self {
        Self::Failed(e.into())
    }
}
