//! HTTP/1.1 response builder.
//!
//! Fluent construction plus the JSON and rate-limit helpers the service's
//! handlers and middleware share.

use bytes::{BufMut, BytesMut};
use serde::Serialize;
use serde_json::json;
use tracing::error;

use super::{Headers, StatusCode};
use crate::rate_limit::RateLimitDecision;

/// An HTTP/1.1 response, ready to be serialized and sent.
///
/// # Examples
///
/// ```
/// use vitrine::http::{Response, StatusCode};
///
/// let response = Response::json(StatusCode::Created, &serde_json::json!({"id": 7}));
/// assert_eq!(response.status(), StatusCode::Created);
///
/// let bytes = response.into_bytes();
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("HTTP/1.1 201 Created\r\n"));
/// assert!(text.contains("Content-Type: application/json\r\n"));
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
    keep_alive: bool,
}

impl Response {
    /// Creates a response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
            keep_alive: true,
        }
    }

    /// Serializes `value` as the JSON body.
    ///
    /// A value that fails to serialize is logged and turned into a bare
    /// `500 Internal Server Error`.
    pub fn json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self::new(status)
                .header("Content-Type", "application/json")
                .body_bytes(body),
            Err(e) => {
                error!(error = %e, "failed to serialize response body");
                Self::new(StatusCode::InternalServerError)
            }
        }
    }

    /// A JSON error body of the form `{"error": code, "message": message}`.
    pub fn error(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self::json(
            status,
            &json!({ "error": code, "message": message.into() }),
        )
    }

    /// `429 Too Many Requests` for a rejected [`RateLimitDecision`].
    ///
    /// Carries `Retry-After` and the `X-RateLimit-*` headers; the body tells
    /// the caller how many seconds to wait.
    pub fn too_many_requests(decision: &RateLimitDecision) -> Self {
        let retry_after = decision.retry_after_secs();
        Self::json(
            StatusCode::TooManyRequests,
            &json!({
                "error": "too_many_requests",
                "message": "Muitas tentativas. Tente novamente mais tarde.",
                "retry_after": retry_after,
            }),
        )
        .header("Retry-After", retry_after.to_string())
        .rate_limited(decision)
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Appends a header in place, for middleware decorating a downstream response.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    /// Sets (replacing) the `X-RateLimit-Limit`, `X-RateLimit-Remaining` and
    /// `X-RateLimit-Reset` headers from `decision`.
    #[must_use]
    pub fn rate_limited(mut self, decision: &RateLimitDecision) -> Self {
        self.set_rate_limit_headers(decision);
        self
    }

    /// In-place form of [`rate_limited`](Self::rate_limited).
    pub fn set_rate_limit_headers(&mut self, decision: &RateLimitDecision) {
        self.headers
            .set("X-RateLimit-Limit", decision.limit.to_string());
        self.headers
            .set("X-RateLimit-Remaining", decision.remaining.to_string());
        self.headers
            .set("X-RateLimit-Reset", decision.retry_after_secs().to_string());
    }

    /// Sets the response body from a string.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into().into_bytes();
        self
    }

    /// Sets the response body from raw bytes.
    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Controls whether `Connection: keep-alive` or `Connection: close` is written.
    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The body bytes set so far.
    pub fn body_ref(&self) -> &[u8] {
        &self.body
    }

    /// Serializes the response using HTTP/1.1 wire format.
    ///
    /// Adds `Content-Type: text/plain; charset=utf-8` to a non-empty body
    /// without one, and always writes `Connection` and `Content-Length`.
    pub fn into_bytes(mut self) -> BytesMut {
        let content_length = self.body.len();

        if !self.body.is_empty() && !self.headers.contains("content-type") {
            self.headers
                .insert("Content-Type", "text/plain; charset=utf-8");
        }

        let connection = if self.keep_alive {
            "keep-alive"
        } else {
            "close"
        };
        self.headers.set("Connection", connection);

        let mut buf = BytesMut::with_capacity(128 + self.headers.len() * 64 + content_length);
        buf.put(format!("HTTP/1.1 {}\r\n", self.status).as_bytes());
        buf.put(self.headers.to_string().as_bytes());
        buf.put(format!("Content-Length: {content_length}\r\n\r\n").as_bytes());
        buf.put(self.body.as_slice());
        buf
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}
