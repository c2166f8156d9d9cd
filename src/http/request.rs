//! HTTP/1.1 request parsing using the [`httparse`] crate.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use bytes::Bytes;
use thiserror::Error;

use super::{Headers, Method};

/// Errors that can occur while parsing an HTTP/1.1 request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete — more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid Content-Length header: {value:?}")]
    InvalidContentLength { value: String },
}

/// A parsed HTTP/1.1 request.
///
/// # Examples
///
/// ```
/// use vitrine::http::request::Request;
///
/// let raw = b"GET /corretores/ana?imoveis=1&limite=6 HTTP/1.1\r\nHost: localhost\r\n\r\n";
/// let (request, _offset) = Request::parse(raw).unwrap();
///
/// assert_eq!(request.path(), "/corretores/ana");
/// assert_eq!(request.query_param("limite"), Some("6"));
/// assert!(request.query_flag("imoveis"));
/// assert!(!request.query_flag("contato"));
/// ```
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    query: HashMap<String, String>,
    body: Bytes,
    peer_addr: Option<SocketAddr>,
}

impl Request {
    const MAX_HEADERS: usize = 64;

    /// Parses the request head in `buf`.
    ///
    /// Returns the request and the offset where its body starts. The body is
    /// taken from `buf` up to `Content-Length` bytes; callers that stream data
    /// in should check [`content_length`](Self::content_length) and re-parse
    /// once the whole body has arrived.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`] — the header block is not complete yet.
    /// - [`RequestError::Parse`] — the data is not valid HTTP/1.x.
    /// - [`RequestError::MissingField`] — method, path, or version is absent.
    /// - [`RequestError::InvalidContentLength`] — `Content-Length` is not a number.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let body_offset = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method = match raw_req.method {
            Some(m) => m.parse::<Method>().unwrap_or_else(|never| match never {}),
            None => return Err(RequestError::MissingField { field: "method" }),
        };

        let target = raw_req
            .path
            .ok_or(RequestError::MissingField { field: "path" })?;
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_owned(), parse_query_string(query)),
            None => (target.to_owned(), HashMap::new()),
        };

        let version = raw_req
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut header_map = Headers::with_capacity(raw_req.headers.len());
        for header in raw_req.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.insert(header.name, value);
            }
        }

        let mut request = Self {
            method,
            path,
            version,
            headers: header_map,
            query,
            body: Bytes::new(),
            peer_addr: None,
        };

        let body_len = request.declared_length()?;
        let body_end = buf.len().min(body_offset.saturating_add(body_len));
        request.body = Bytes::copy_from_slice(&buf[body_offset..body_end]);

        Ok((request, body_offset))
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request path, without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// A query-string parameter by name.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    /// Treats `key` as a boolean switch: present with no value, `1`, `true`,
    /// `sim` or `yes` is on; absent or anything else is off.
    pub fn query_flag(&self, key: &str) -> bool {
        matches!(
            self.query_param(key).map(str::to_ascii_lowercase).as_deref(),
            Some("" | "1" | "true" | "sim" | "yes")
        )
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Whether the connection stays open after this request.
    ///
    /// HTTP/1.1 defaults to keep-alive; HTTP/1.0 only with an explicit header.
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(conn) => conn.eq_ignore_ascii_case("keep-alive"),
            None => self.version == 1,
        }
    }

    /// The `Content-Length` header, if present and numeric.
    pub fn content_length(&self) -> Option<usize> {
        self.headers.get("content-length")?.trim().parse().ok()
    }

    /// The TCP peer this request arrived from, when known.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn set_peer_addr(&mut self, addr: SocketAddr) {
        self.peer_addr = Some(addr);
    }

    /// Best-effort originating client address.
    ///
    /// With `trust_proxy_headers` the first `X-Forwarded-For` entry, then
    /// `X-Real-IP`, are consulted before the TCP peer address. Leave it off
    /// unless a proxy in front of the service overwrites those headers, since
    /// clients can otherwise pick their own rate-limit identity.
    pub fn client_addr(&self, trust_proxy_headers: bool) -> Option<IpAddr> {
        if trust_proxy_headers {
            let forwarded = self
                .headers
                .first_value("x-forwarded-for")
                .and_then(|ip| ip.parse().ok());
            if forwarded.is_some() {
                return forwarded;
            }
            let real_ip = self
                .headers
                .get("x-real-ip")
                .and_then(|ip| ip.trim().parse().ok());
            if real_ip.is_some() {
                return real_ip;
            }
        }
        self.peer_addr.map(|addr| addr.ip())
    }

    fn declared_length(&self) -> Result<usize, RequestError> {
        match self.headers.get("content-length") {
            None => Ok(0),
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| RequestError::InvalidContentLength {
                    value: raw.to_owned(),
                }),
        }
    }
}

/// Parses `key=value&key2=value2`, decoding `+` as a space and `%XX`
/// escapes. A component whose escapes are not valid UTF-8 is kept as sent.
fn parse_query_string(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key), decode_component(value))
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    let decoded = urlencoding::decode(&spaced).map(|decoded| decoded.into_owned());
    decoded.unwrap_or(spaced)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &[u8]) -> Request {
        Request::parse(raw).unwrap().0
    }

    #[test]
    fn parse_simple_get() {
        let raw = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let (req, offset) = Request::parse(raw).unwrap();
        assert_eq!(req.method(), &Method::Get);
        assert_eq!(req.path(), "/");
        assert_eq!(req.version(), 1);
        assert_eq!(offset, raw.len());
        assert!(req.body().is_empty());
    }

    #[test]
    fn query_flags_and_params() {
        let req = parse(b"GET /c/ana?imoveis&contato=sim&resumo=0&limite=12 HTTP/1.1\r\n\r\n");
        assert!(req.query_flag("imoveis"));
        assert!(req.query_flag("contato"));
        assert!(!req.query_flag("resumo"));
        assert!(!req.query_flag("missing"));
        assert_eq!(req.query_param("limite"), Some("12"));
    }

    #[test]
    fn query_values_are_percent_decoded() {
        let req = parse(b"GET /c/ana?limite=%36&q=apto+2%2B1&bad=%FF HTTP/1.1\r\n\r\n");
        assert_eq!(req.query_param("limite"), Some("6"));
        assert_eq!(req.query_param("q"), Some("apto 2+1"));
        assert_eq!(req.query_param("bad"), Some("%FF"));
    }

    #[test]
    fn incomplete_request() {
        let raw = b"GET / HTTP/1.1\r\nHost:";
        assert!(matches!(Request::parse(raw), Err(RequestError::Incomplete)));
    }

    #[test]
    fn body_is_bounded_by_content_length() {
        let raw = b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhelloGET / HTTP/1.1\r\n\r\n";
        let req = parse(raw);
        assert_eq!(req.content_length(), Some(5));
        assert_eq!(&req.body()[..], b"hello");
    }

    #[test]
    fn non_numeric_content_length_is_rejected() {
        let raw = b"POST / HTTP/1.1\r\nContent-Length: five\r\n\r\n";
        assert!(matches!(
            Request::parse(raw),
            Err(RequestError::InvalidContentLength { .. })
        ));
    }

    #[test]
    fn keep_alive_defaults_by_version() {
        assert!(parse(b"GET / HTTP/1.1\r\n\r\n").is_keep_alive());
        assert!(!parse(b"GET / HTTP/1.0\r\n\r\n").is_keep_alive());
        assert!(!parse(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n").is_keep_alive());
    }

    #[test]
    fn client_addr_ignores_proxy_headers_unless_trusted() {
        let mut req = parse(b"GET / HTTP/1.1\r\nX-Forwarded-For: 203.0.113.7, 10.0.0.1\r\n\r\n");
        req.set_peer_addr("10.0.0.1:5000".parse().unwrap());

        assert_eq!(req.client_addr(false), Some("10.0.0.1".parse().unwrap()));
        assert_eq!(req.client_addr(true), Some("203.0.113.7".parse().unwrap()));
    }

    #[test]
    fn client_addr_falls_back_to_real_ip_then_peer() {
        let req = parse(
            b"GET / HTTP/1.1\r\nX-Forwarded-For: garbage\r\nX-Real-IP: 198.51.100.4\r\n\r\n",
        );
        assert_eq!(req.client_addr(true), Some("198.51.100.4".parse().unwrap()));

        let bare = parse(b"GET / HTTP/1.1\r\n\r\n");
        assert_eq!(bare.client_addr(true), None);
    }
}
