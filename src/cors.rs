//! Cross-origin resource sharing.
//!
//! The gateway runs a single, permissive policy: any origin, any request
//! header, and the usual REST verbs. It is a convenience for browser
//! clients, not a security boundary.

use bytes::Bytes;
use http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_MAX_AGE, ACCESS_CONTROL_REQUEST_HEADERS, ACCESS_CONTROL_REQUEST_METHOD,
    HeaderValue, ORIGIN, VARY,
};
use http::{Method, StatusCode};
use http_body_util::Full;
use tracing::debug;

use crate::response::ResponseBody;

/// A CORS policy.
#[derive(Clone, Debug)]
pub struct Cors {
    allowed_methods: Vec<Method>,
    max_age: u32,
}

impl Cors {
    /// All origins, all headers, and GET, POST, PATCH, PUT, DELETE, OPTIONS.
    pub fn permissive() -> Self {
        Self {
            allowed_methods: vec![
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ],
            max_age: 86_400,
        }
    }

    /// Answers a preflight request. Returns `None` for anything that is not
    /// one, which then goes through normal routing.
    pub fn preflight<B>(&self, req: &http::Request<B>) -> Option<http::Response<ResponseBody>> {
        let headers = req.headers();
        if req.method() != Method::OPTIONS || !headers.contains_key(ORIGIN) {
            return None;
        }
        let requested = headers.get(ACCESS_CONTROL_REQUEST_METHOD)?;

        let mut res = http::Response::new(Full::new(Bytes::new()));
        *res.status_mut() = StatusCode::NO_CONTENT;
        self.apply(&mut res);

        let allowed = Method::from_bytes(requested.as_bytes())
            .is_ok_and(|m| self.allowed_methods.contains(&m));
        if !allowed {
            debug!(method = ?requested, "preflight for disallowed method");
            return Some(res);
        }

        let out = res.headers_mut();
        let methods = self.allowed_methods.iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        if let Ok(v) = HeaderValue::try_from(methods) {
            out.insert(ACCESS_CONTROL_ALLOW_METHODS, v);
        }
        // Any header is allowed, so echo back whatever was asked for.
        if let Some(v) = headers.get(ACCESS_CONTROL_REQUEST_HEADERS) {
            out.insert(ACCESS_CONTROL_ALLOW_HEADERS, v.clone());
        }
        out.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from(self.max_age));
        out.append(VARY, HeaderValue::from_static("origin"));
        Some(res)
    }

    /// Adds the origin header to an outgoing response.
    pub fn apply(&self, res: &mut http::Response<ResponseBody>) {
        res.headers_mut()
            .entry(ACCESS_CONTROL_ALLOW_ORIGIN)
            .or_insert(HeaderValue::from_static("*"));
    }
}

impl Default for Cors {
    fn default() -> Self { Self::permissive() }
}
