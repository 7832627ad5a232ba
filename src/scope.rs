//! Exchange metadata construction

use bytes::Bytes;
use http::{
    header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, HOST, USER_AGENT},
    Method,
};
use serde::Serialize;

use crate::error::Error;

pub(crate) const DEFAULT_HOST: &str = "localhost";
pub(crate) const DEFAULT_CLIENT_ADDR: (&str, u16) = ("127.0.0.1", 50000);
pub(crate) const DEFAULT_SERVER_ADDR: (&str, u16) = (DEFAULT_HOST, 80);

const DEFAULT_USER_AGENT: &str = concat!("drydock/", env!("CARGO_PKG_VERSION"));
const HTTP_VERSION: &str = "1.1";

/// The kind of exchange a [`Scope`] describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Startup/shutdown handshake, once per harness session
    Lifecycle,
    /// A single request/response exchange
    Http,
    /// A long-lived bidirectional session
    Duplex,
}

/// Immutable metadata describing one exchange.
///
/// Built once per exchange and handed to the application callable; never
/// mutated afterwards. Header names are lowercase and the list preserves
/// duplicates.
#[derive(Debug, Clone)]
pub struct Scope {
    pub kind: ScopeKind,
    pub method: Method,
    pub path: String,
    /// Raw percent-encoded query string, without the leading `?`
    pub query: Bytes,
    pub headers: Vec<(Bytes, Bytes)>,
    pub client: (String, u16),
    pub server: (String, u16),
    pub scheme: String,
    pub http_version: String,
}

impl Scope {
    /// Creates the scope of the once-per-session lifecycle exchange
    pub(crate) fn lifecycle() -> Self {
        Self {
            kind: ScopeKind::Lifecycle,
            method: Method::GET,
            path: String::new(),
            query: Bytes::new(),
            headers: Vec::new(),
            client: addr(DEFAULT_CLIENT_ADDR),
            server: addr(DEFAULT_SERVER_ADDR),
            scheme: String::new(),
            http_version: HTTP_VERSION.into(),
        }
    }

    /// Returns the first header value with the given name, if any
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name.as_bytes()))
            .map(|(_, v)| v.as_ref())
    }
}

fn addr((host, port): (&str, u16)) -> (String, u16) {
    (host.into(), port)
}

/// Assembles a [`Scope`] from request parameters, jar contents and
/// client-wide default headers
pub(crate) struct ScopeBuilder {
    kind: ScopeKind,
    method: Method,
    target: String,
    query: Option<String>,
    headers: HeaderMap,
    scheme: String,
    client: (String, u16),
    server: (String, u16),
    body_len: Option<usize>,
    content_type: Option<String>,
}

impl ScopeBuilder {
    pub(crate) fn new(kind: ScopeKind, method: Method, target: impl Into<String>) -> Self {
        let scheme = match kind {
            ScopeKind::Duplex => "ws",
            _ => "http",
        };
        Self {
            kind,
            method,
            target: target.into(),
            query: None,
            headers: HeaderMap::new(),
            scheme: scheme.into(),
            client: addr(DEFAULT_CLIENT_ADDR),
            server: addr(DEFAULT_SERVER_ADDR),
            body_len: None,
            content_type: None,
        }
    }

    pub(crate) fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub(crate) fn with_client(mut self, client: (String, u16)) -> Self {
        self.client = client;
        self
    }

    pub(crate) fn with_server(mut self, server: (String, u16)) -> Self {
        self.server = server;
        self
    }

    /// Percent-encodes `query` and attaches it as the query string
    pub(crate) fn with_query<T: Serialize + ?Sized>(mut self, query: &T) -> Result<Self, Error> {
        let encoded = serde_urlencoded::to_string(query)
            .map_err(Error::decode)?;
        self.query = Some(encoded);
        Ok(self)
    }

    /// Attaches an already encoded query string
    pub(crate) fn with_raw_query(mut self, query: Option<String>) -> Self {
        self.query = query;
        self
    }

    /// Merges `headers` in, later values winning on name collision
    pub(crate) fn with_headers(mut self, headers: &HeaderMap) -> Self {
        for name in headers.keys() {
            self.headers.remove(name);
        }
        for (name, value) in headers {
            self.headers.append(name, value.clone());
        }
        self
    }

    /// Attaches the serialized jar contents unless the caller already set a
    /// `Cookie` header
    pub(crate) fn with_cookie_header(mut self, cookies: Option<String>) -> Self {
        if self.headers.contains_key(COOKIE) {
            return self;
        }
        if let Some(value) = cookies.and_then(|v| HeaderValue::from_str(&v).ok()) {
            self.headers.insert(COOKIE, value);
        }
        self
    }

    pub(crate) fn with_body_len(mut self, len: Option<usize>) -> Self {
        self.body_len = len;
        self
    }

    pub(crate) fn with_content_type(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type;
        self
    }

    /// Returns the host the request is addressed to, as seen by the jar
    pub(crate) fn host(&self) -> String {
        self.headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_HOST)
            .to_owned()
    }

    pub(crate) fn build(mut self) -> Result<Scope, Error> {
        let (path, query) = match self.target.split_once('?') {
            Some(_) if self.query.is_some() => {
                return Err(Error::ambiguous_request(
                    "query string is defined both in the path and as an argument",
                ));
            }
            Some((path, raw)) => (path.to_owned(), raw.to_owned()),
            None => (self.target.clone(), self.query.take().unwrap_or_default()),
        };

        if !self.headers.contains_key(HOST) {
            self.headers.insert(HOST, HeaderValue::from_static(DEFAULT_HOST));
        }
        if !self.headers.contains_key(USER_AGENT) {
            self.headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
        }
        if let Some(content_type) = self.content_type.take() {
            if !self.headers.contains_key(CONTENT_TYPE) {
                let value = HeaderValue::from_str(&content_type)
                    .map_err(Error::decode)?;
                self.headers.insert(CONTENT_TYPE, value);
            }
        }
        if let Some(len) = self.body_len {
            self.headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
        }

        let headers = self.headers
            .iter()
            .map(|(name, value)| pair(name, value))
            .collect();

        Ok(Scope {
            kind: self.kind,
            method: self.method,
            path,
            query: Bytes::from(query.into_bytes()),
            headers,
            client: self.client,
            server: self.server,
            scheme: self.scheme,
            http_version: HTTP_VERSION.into(),
        })
    }
}

fn pair(name: &HeaderName, value: &HeaderValue) -> (Bytes, Bytes) {
    (
        Bytes::copy_from_slice(name.as_str().as_bytes()),
        Bytes::copy_from_slice(value.as_bytes()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder(target: &str) -> ScopeBuilder {
        ScopeBuilder::new(ScopeKind::Http, Method::GET, target)
    }

    #[test]
    fn it_applies_default_headers() {
        let scope = builder("/").build().unwrap();

        assert_eq!(scope.header("host").unwrap(), b"localhost");
        assert!(scope.header("user-agent").unwrap().starts_with(b"drydock/"));
    }

    #[test]
    fn it_lets_caller_headers_win() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("custom-agent"));

        let scope = builder("/").with_headers(&headers).build().unwrap();

        assert_eq!(scope.header("user-agent").unwrap(), b"custom-agent");
    }

    #[test]
    fn it_splits_query_from_path() {
        let scope = builder("/items?page=2&size=10").build().unwrap();

        assert_eq!(scope.path, "/items");
        assert_eq!(&scope.query[..], b"page=2&size=10");
    }

    #[test]
    fn it_encodes_query_pairs() {
        let scope = builder("/search")
            .with_query(&[("q", "two words")])
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(&scope.query[..], b"q=two+words");
    }

    #[test]
    fn it_rejects_query_in_both_places() {
        let err = builder("/items?page=2")
            .with_query(&[("size", "10")])
            .unwrap()
            .build()
            .unwrap_err();

        assert_eq!(err.kind(), crate::ErrorKind::AmbiguousRequest);
    }

    #[test]
    fn it_injects_body_headers() {
        let scope = builder("/upload")
            .with_body_len(Some(42))
            .with_content_type(Some("application/json".into()))
            .build()
            .unwrap();

        assert_eq!(scope.header("content-length").unwrap(), b"42");
        assert_eq!(scope.header("content-type").unwrap(), b"application/json");
    }

    #[test]
    fn it_keeps_caller_content_type() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/csv"));

        let scope = builder("/upload")
            .with_headers(&headers)
            .with_content_type(Some("application/json".into()))
            .build()
            .unwrap();

        assert_eq!(scope.header("content-type").unwrap(), b"text/csv");
    }

    #[test]
    fn it_skips_jar_cookies_when_caller_set_some() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("mine=1"));

        let scope = builder("/")
            .with_headers(&headers)
            .with_cookie_header(Some("jar=2".into()))
            .build()
            .unwrap();

        assert_eq!(scope.header("cookie").unwrap(), b"mine=1");
    }
}
