//! Per-request context.
//!
//! The router builds exactly one [`Context`] per matched request, before any
//! middleware or handler runs, and moves it down the handler chain. Everything
//! a handler needs (path parameters, headers, the body, the response writer)
//! lives here.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::request::Parts;
use http::{HeaderMap, Method, StatusCode};
use http_body_util::BodyExt;
use http_body_util::combinators::UnsyncBoxBody;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::oneshot;
use tracing::{debug, error};

use crate::error::{BoxError, DecodeError, Error};
use crate::response::Response;

/// Type-erased request body. Any `http_body::Body` the server or a test
/// hands to the router is boxed into this.
pub(crate) type Body = UnsyncBoxBody<Bytes, BoxError>;

/// Shared handle to application storage, attached with
/// [`Router::with_datastore`](crate::Router::with_datastore).
#[derive(Clone)]
pub(crate) struct Datastore(pub(crate) Arc<dyn Any + Send + Sync>);

/// The request/response pair for one inbound request.
pub struct Context {
    parts: Parts,
    body: Option<Body>,
    params: HashMap<String, String>,
    datastore: Option<Datastore>,
    // `None` once a response has been written.
    responder: Option<oneshot::Sender<Response>>,
}

impl Context {
    pub(crate) fn new(
        req: http::Request<Body>,
        params: HashMap<String, String>,
        datastore: Option<Datastore>,
    ) -> (Self, oneshot::Receiver<Response>) {
        let (parts, body) = req.into_parts();
        let (tx, rx) = oneshot::channel();
        let ctx = Self {
            parts,
            body: Some(body),
            params,
            datastore,
            responder: Some(tx),
        };
        (ctx, rx)
    }

    pub fn method(&self) -> &Method { &self.parts.method }
    pub fn path(&self) -> &str { self.parts.uri.path() }
    pub fn query(&self) -> Option<&str> { self.parts.uri.query() }
    pub fn headers(&self) -> &HeaderMap { &self.parts.headers }
    pub fn params(&self) -> &HashMap<String, String> { &self.params }

    /// Returns the named path parameter, or `""` when the route has none.
    ///
    /// For a route `/users/{id}`, `ctx.param("id")` on `/users/42` returns `"42"`.
    pub fn param(&self, name: &str) -> &str {
        self.params.get(name).map_or("", String::as_str)
    }

    /// Returns the named request header, or `""` when absent or not valid
    /// UTF-8. Lookup is case-insensitive.
    pub fn header(&self, name: &str) -> &str {
        self.parts.headers
            .get(name)
            .and_then(|v| std::str::from_utf8(v.as_bytes()).ok())
            .unwrap_or("")
    }

    /// Decodes the JSON request body into `T`.
    ///
    /// The body stream is taken on the first call and dropped before this
    /// returns, whether decoding succeeded or not. A second call fails with
    /// [`DecodeError::Consumed`].
    pub async fn bind<T: DeserializeOwned>(&mut self) -> Result<T, DecodeError> {
        let body = self.body.take().ok_or(DecodeError::Consumed)?;
        let bytes = body.collect().await.map_err(DecodeError::Read)?.to_bytes();
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Writes `payload` as an `application/json` response with status `code`.
    ///
    /// If `payload` cannot be serialized the response is finalized as a
    /// `500` with a plain-text body and [`Error::Serialization`] is returned.
    pub fn json<T: Serialize + ?Sized>(&mut self, payload: &T, code: StatusCode) -> Result<(), Error> {
        if self.header_sent() {
            return Err(Error::DoubleWrite);
        }
        match Response::to_json(payload, code) {
            Ok(res) => self.send(res),
            Err(e) => {
                error!(path = self.path(), "response serialization failed: {e}");
                self.send(
                    Response::builder()
                        .status(StatusCode::INTERNAL_SERVER_ERROR)
                        .text(e.to_string()),
                )?;
                Err(Error::Serialization(e))
            }
        }
    }

    /// Writes a `text/plain` response with status `code`.
    pub fn text(&mut self, body: impl Into<String>, code: StatusCode) -> Result<(), Error> {
        self.send(Response::builder().status(code).text(body))
    }

    /// Writes a prebuilt response. Only the first write on a context succeeds;
    /// any later one fails with [`Error::DoubleWrite`].
    pub fn send(&mut self, res: Response) -> Result<(), Error> {
        let tx = self.responder.take().ok_or(Error::DoubleWrite)?;
        if tx.send(res).is_err() {
            debug!(path = self.path(), "connection closed before response was written");
        }
        Ok(())
    }

    /// Whether a response has already been written.
    pub fn header_sent(&self) -> bool {
        self.responder.is_none()
    }

    /// The datastore attached to the router, if it is a `T`.
    pub fn datastore<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.datastore.as_ref()?.0.downcast_ref::<T>()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use http_body_util::Full;
    use serde::{Deserialize, Serialize};

    pub(crate) fn context(
        req: http::Request<Full<Bytes>>,
        params: &[(&str, &str)],
    ) -> (Context, oneshot::Receiver<Response>) {
        let req = req.map(|b| b.map_err(|never| match never {}).boxed_unsync());
        let params = params.iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        Context::new(req, params, None)
    }

    fn get(uri: &str) -> http::Request<Full<Bytes>> {
        http::Request::get(uri).body(Full::default()).unwrap()
    }

    fn post(body: &'static str) -> http::Request<Full<Bytes>> {
        http::Request::post("/users").body(Full::new(Bytes::from(body))).unwrap()
    }

    #[derive(Debug, Deserialize, PartialEq, Serialize)]
    struct User {
        name: String,
        age: u32,
    }

    #[test]
    fn param_returns_empty_when_absent() {
        let (ctx, _rx) = context(get("/users/42"), &[("id", "42")]);
        assert_eq!(ctx.param("id"), "42");
        assert_eq!(ctx.param("id"), "42");
        assert_eq!(ctx.param("missing"), "");
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let req = http::Request::get("/")
            .header("X-Request-Id", "abc")
            .body(Full::default())
            .unwrap();
        let (ctx, _rx) = context(req, &[]);
        assert_eq!(ctx.header("x-request-id"), "abc");
        assert_eq!(ctx.header("X-REQUEST-ID"), "abc");
        assert_eq!(ctx.header("authorization"), "");
    }

    #[test]
    fn header_keeps_non_ascii_utf8_and_drops_invalid_bytes() {
        let req = http::Request::get("/")
            .header("x-name", http::HeaderValue::from_bytes("José".as_bytes()).unwrap())
            .header("x-raw", http::HeaderValue::from_bytes(b"\xff\xfe").unwrap())
            .body(Full::default())
            .unwrap();
        let (ctx, _rx) = context(req, &[]);
        assert_eq!(ctx.header("x-name"), "José");
        assert_eq!(ctx.header("x-raw"), "");
    }

    #[tokio::test]
    async fn bind_decodes_then_reports_consumed() {
        let (mut ctx, _rx) = context(post(r#"{"name":"alice","age":30}"#), &[]);
        let user: User = ctx.bind().await.unwrap();
        assert_eq!(user, User { name: "alice".into(), age: 30 });
        assert!(matches!(ctx.bind::<User>().await, Err(DecodeError::Consumed)));
    }

    #[tokio::test]
    async fn bind_rejects_empty_malformed_and_mismatched_bodies() {
        let (mut ctx, _rx) = context(post(""), &[]);
        assert!(matches!(ctx.bind::<User>().await, Err(DecodeError::Empty)));

        let (mut ctx, _rx) = context(post("{not json"), &[]);
        assert!(matches!(ctx.bind::<User>().await, Err(DecodeError::Json(_))));

        let (mut ctx, _rx) = context(post(r#"{"name":"alice","age":"old"}"#), &[]);
        assert!(matches!(ctx.bind::<User>().await, Err(DecodeError::Json(_))));

        // the failed decode still released the body
        assert!(matches!(ctx.bind::<User>().await, Err(DecodeError::Consumed)));
    }

    #[tokio::test]
    async fn json_writes_once() {
        let (mut ctx, rx) = context(get("/"), &[]);
        let user = User { name: "bob".into(), age: 7 };
        ctx.json(&user, StatusCode::CREATED).unwrap();
        assert!(ctx.header_sent());
        assert!(matches!(ctx.json(&user, StatusCode::OK), Err(Error::DoubleWrite)));

        let res = rx.await.unwrap();
        assert_eq!(res.status_code(), StatusCode::CREATED);
        assert_eq!(res.header("content-type"), Some("application/json"));
        let back: User = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(back, user);
    }

    #[tokio::test]
    async fn unserializable_payload_falls_back_to_plain_500() {
        // maps with non-string keys cannot be encoded as JSON objects
        let mut payload = HashMap::new();
        payload.insert(vec![1u8], "x");

        let (mut ctx, rx) = context(get("/"), &[]);
        assert!(matches!(ctx.json(&payload, StatusCode::OK), Err(Error::Serialization(_))));
        assert!(ctx.header_sent());

        let res = rx.await.unwrap();
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.header("content-type"), Some("text/plain; charset=utf-8"));
        assert!(serde_json::from_slice::<serde_json::Value>(res.body()).is_err());
    }

    #[test]
    fn datastore_downcasts_to_attached_type() {
        let req = get("/").map(|b| b.map_err(|never| match never {}).boxed_unsync());
        let store = Datastore(Arc::new(String::from("pg://local")));
        let (ctx, _rx) = Context::new(req, HashMap::new(), Some(store));
        assert_eq!(ctx.datastore::<String>().map(String::as_str), Some("pg://local"));
        assert!(ctx.datastore::<u64>().is_none());
    }
}
