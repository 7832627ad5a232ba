//! Per-request configuration

use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;

use crate::{
    client::TestClient,
    error::Error,
    exchange::RequestBody,
    form::FormData,
    response::TestResponse,
};

/// Collects the parameters of one request before it is executed.
///
/// Returned by the verb methods of [`TestClient`]; finished with
/// [`send`](RequestBuilder::send). The `json`/`form`/`body` payload kinds
/// replace one another, last call wins.
pub struct RequestBuilder<'a> {
    client: &'a mut TestClient,
    parts: RequestParts,
    error: Option<Error>,
}

/// The assembled inputs the client's execute loop works from
pub(crate) struct RequestParts {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) headers: HeaderMap,
    pub(crate) cookies: Option<Vec<(String, String)>>,
    pub(crate) query: Option<String>,
    pub(crate) body: RequestBody,
    pub(crate) content_type: Option<String>,
    pub(crate) scheme: Option<String>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) follow_redirects: Option<bool>,
    pub(crate) max_redirects: Option<usize>,
    pub(crate) stream: bool,
}

impl<'a> RequestBuilder<'a> {
    pub(crate) fn new(client: &'a mut TestClient, method: Method, path: impl Into<String>) -> Self {
        Self {
            client,
            parts: RequestParts {
                method,
                path: path.into(),
                headers: HeaderMap::new(),
                cookies: None,
                query: None,
                body: RequestBody::Empty,
                content_type: None,
                scheme: None,
                timeout: None,
                follow_redirects: None,
                max_redirects: None,
                stream: false,
            },
            error: None,
        }
    }

    /// Adds a request header
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.parts.headers.append(name, value);
        self
    }

    /// Merges a whole header map in
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.parts.headers.extend(headers);
        self
    }

    /// Replaces the jar cookies with an explicit set for this request
    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts
            .cookies
            .get_or_insert_with(Vec::new)
            .push((name.into(), value.into()));
        self
    }

    /// Percent-encodes `query` and sends it as the query string
    pub fn query<T: Serialize + ?Sized>(mut self, query: &T) -> Self {
        match serde_urlencoded::to_string(query) {
            Ok(encoded) => self.parts.query = Some(encoded),
            Err(err) => self.error = Some(Error::decode(err)),
        }
        self
    }

    /// Sends `value` serialized as structured data
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(encoded) => {
                self.parts.body = RequestBody::Full(Bytes::from(encoded));
                self.parts.content_type = Some(mime::APPLICATION_JSON.to_string());
            }
            Err(err) => self.error = Some(err.into()),
        }
        self
    }

    /// Sends `form` url-encoded, or as multipart when it holds files
    pub fn form(mut self, form: &FormData) -> Self {
        match form.encode() {
            Ok((body, content_type)) => {
                self.parts.body = RequestBody::Full(body);
                self.parts.content_type = Some(content_type);
            }
            Err(err) => self.error = Some(err),
        }
        self
    }

    /// Sends raw bytes as the request body
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.parts.body = RequestBody::Full(body.into());
        self.parts.content_type = None;
        self
    }

    /// Sends the request body chunk by chunk from a streaming source
    pub fn body_stream<S>(mut self, stream: S) -> Self
    where
        S: Stream<Item = Bytes> + Send + 'static,
    {
        self.parts.body = RequestBody::Stream(stream.boxed());
        self.parts.content_type = None;
        self
    }

    /// Overrides the request scheme (default `http`)
    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.parts.scheme = Some(scheme.into());
        self
    }

    /// Overrides the client-wide event timeout for this exchange
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.parts.timeout = Some(timeout);
        self
    }

    /// Overrides the client-wide redirect policy for this request
    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.parts.follow_redirects = Some(follow);
        self
    }

    /// Overrides the client-wide redirect hop limit for this request
    pub fn max_redirects(mut self, limit: usize) -> Self {
        self.parts.max_redirects = Some(limit);
        self
    }

    /// Leaves the response body unbuffered, to be pulled chunk by chunk
    pub fn stream(mut self) -> Self {
        self.parts.stream = true;
        self
    }

    /// Executes the exchange and returns the response
    pub async fn send(self) -> Result<TestResponse, Error> {
        let RequestBuilder { client, parts, error } = self;
        if let Some(err) = error {
            return Err(err);
        }
        client.execute(parts).await
    }
}
