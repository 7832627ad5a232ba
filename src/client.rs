//! The caller-facing test client

use std::{sync::Arc, time::Duration};

use http::{
    header::{HeaderMap, HeaderName, HeaderValue, LOCATION},
    Method,
};

use crate::{
    app::Application,
    error::Error,
    exchange::{self, ExchangeOptions, RequestBody},
    jar::{self, Jar},
    redirect,
    response::TestResponse,
    scope::{ScopeBuilder, ScopeKind, DEFAULT_CLIENT_ADDR, DEFAULT_SERVER_ADDR},
    session::DuplexBuilder,
};

use self::{lifespan::Lifespan, request::RequestParts};

pub use self::request::RequestBuilder;

mod lifespan;
pub mod request;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// A client bound to one application for testing.
///
/// Owns the cookie jar and the client-wide default headers; composes scope
/// construction, the exchange engine, redirect following and cookie
/// persistence behind simple verb methods. One client drives one exchange at
/// a time — the executing methods take `&mut self`.
///
/// # Example
/// ```no_run
/// use drydock::{AppReceiver, AppSender, Event, Scope, TestClient};
/// use http::StatusCode;
///
/// # async fn example() -> Result<(), drydock::Error> {
/// let mut client = TestClient::new(|_scope: Scope, _rx: AppReceiver, tx: AppSender| async move {
///     tx.send(Event::response_start(StatusCode::OK, &[])).await?;
///     tx.send(Event::response_body("plain response")).await?;
///     Ok(())
/// });
///
/// let mut response = client.get("/").send().await?;
/// assert_eq!(response.status(), StatusCode::OK);
/// assert_eq!(response.text().await?, "plain response");
/// # Ok(())
/// # }
/// ```
pub struct TestClient {
    pub(crate) app: Arc<dyn Application>,
    pub(crate) jar: Jar,
    pub(crate) default_headers: HeaderMap,
    pub(crate) timeout: Duration,
    pub(crate) client_addr: (String, u16),
    pub(crate) server_addr: (String, u16),
    follow_redirects: bool,
    max_redirects: usize,
    capture_app_errors: bool,
    lifespan: Option<Lifespan>,
    startup_failed: bool,
}

impl TestClient {
    /// Creates a client bound to `app`
    pub fn new(app: impl Application) -> Self {
        Self {
            app: Arc::new(app),
            jar: Jar::new(),
            default_headers: HeaderMap::new(),
            timeout: DEFAULT_TIMEOUT,
            client_addr: (DEFAULT_CLIENT_ADDR.0.to_owned(), DEFAULT_CLIENT_ADDR.1),
            server_addr: (DEFAULT_SERVER_ADDR.0.to_owned(), DEFAULT_SERVER_ADDR.1),
            follow_redirects: true,
            max_redirects: redirect::DEFAULT_MAX_REDIRECTS,
            capture_app_errors: false,
            lifespan: None,
            startup_failed: false,
        }
    }

    /// Adds a header sent with every request of this client
    pub fn with_default_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.default_headers.append(name, value);
        self
    }

    /// Sets the per-event receive timeout.
    ///
    /// Default: 1 second.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enables or disables redirect following.
    ///
    /// Default: enabled.
    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    /// Sets the redirect hop limit.
    ///
    /// Default: 20.
    pub fn with_max_redirects(mut self, limit: usize) -> Self {
        self.max_redirects = limit;
        self
    }

    /// Converts unhandled application errors into synthetic `500` responses
    /// instead of surfacing them as errors
    pub fn with_captured_app_errors(mut self) -> Self {
        self.capture_app_errors = true;
        self
    }

    /// Sets the client address tuple placed into every scope
    pub fn with_client_addr(mut self, host: impl Into<String>, port: u16) -> Self {
        self.client_addr = (host.into(), port);
        self
    }

    /// Sets the server address tuple placed into every scope
    pub fn with_server_addr(mut self, host: impl Into<String>, port: u16) -> Self {
        self.server_addr = (host.into(), port);
        self
    }

    /// The cookie jar shared by all exchanges of this client
    pub fn jar(&self) -> &Jar {
        &self.jar
    }

    /// Mutable access to the cookie jar
    pub fn jar_mut(&mut self) -> &mut Jar {
        &mut self.jar
    }

    /// Runs the lifecycle startup handshake.
    ///
    /// Call once before the first exchange when the application depends on
    /// its lifecycle. After a failed startup every subsequent exchange fails.
    pub async fn startup(&mut self) -> Result<(), Error> {
        if self.lifespan.is_some() {
            return Ok(());
        }
        let mut lifespan = Lifespan::spawn(&self.app, self.timeout);
        match lifespan.startup().await {
            Ok(()) => {
                tracing::debug!("harness session started");
                self.lifespan = Some(lifespan);
                Ok(())
            }
            Err(err) => {
                self.startup_failed = true;
                Err(err)
            }
        }
    }

    /// Runs the lifecycle shutdown handshake, best-effort.
    ///
    /// A failure is reported but never prevents teardown from completing.
    pub async fn shutdown(&mut self) -> Result<(), Error> {
        let Some(mut lifespan) = self.lifespan.take() else {
            return Ok(());
        };
        match lifespan.shutdown().await {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::warn!(error = %err, "shutdown handshake failed");
                Err(err)
            }
        }
    }

    pub(crate) fn ensure_started(&self) -> Result<(), Error> {
        if self.startup_failed {
            return Err(Error::startup("the harness session failed to start up"));
        }
        Ok(())
    }

    /// Starts a request with an arbitrary method
    pub fn request(&mut self, method: Method, path: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, method, path)
    }

    /// Starts a GET request
    pub fn get(&mut self, path: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::GET, path)
    }

    /// Starts a POST request
    pub fn post(&mut self, path: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::POST, path)
    }

    /// Starts a PUT request
    pub fn put(&mut self, path: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::PUT, path)
    }

    /// Starts a PATCH request
    pub fn patch(&mut self, path: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::PATCH, path)
    }

    /// Starts a DELETE request
    pub fn delete(&mut self, path: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::DELETE, path)
    }

    /// Starts a HEAD request
    pub fn head(&mut self, path: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::HEAD, path)
    }

    /// Starts an OPTIONS request
    pub fn options(&mut self, path: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::OPTIONS, path)
    }

    /// Starts a duplex session against `path`
    pub fn duplex(&mut self, path: impl Into<String>) -> DuplexBuilder<'_> {
        DuplexBuilder::new(self, path)
    }

    /// Runs one request through scope construction, the exchange engine and
    /// the redirect follower, persisting cookies from every hop
    pub(crate) async fn execute(&mut self, parts: RequestParts) -> Result<TestResponse, Error> {
        self.ensure_started()?;

        let options = ExchangeOptions {
            timeout: parts.timeout.unwrap_or(self.timeout),
            stream_response: parts.stream,
            capture_app_errors: self.capture_app_errors,
        };
        let follow = parts.follow_redirects.unwrap_or(self.follow_redirects);
        let max_redirects = parts.max_redirects.unwrap_or(self.max_redirects);
        let scheme = parts.scheme.unwrap_or_else(|| "http".to_owned());

        let mut method = parts.method;
        let mut target = parts.path;
        let mut query = parts.query;
        let mut body = parts.body;
        let mut content_type = parts.content_type;
        let mut hops = 0usize;

        loop {
            let builder = ScopeBuilder::new(ScopeKind::Http, method.clone(), &target)
                .with_scheme(scheme.clone())
                .with_client(self.client_addr.clone())
                .with_server(self.server_addr.clone())
                .with_headers(&self.default_headers)
                .with_headers(&parts.headers)
                .with_raw_query(query.take())
                .with_body_len(body.len())
                .with_content_type(content_type.clone());
            let host = builder.host();
            let request_path = target.split('?').next().unwrap_or("/").to_owned();
            let cookie_header = match &parts.cookies {
                Some(pairs) => jar::header_from_pairs(pairs),
                None => self.jar.header_for(&host, &request_path),
            };
            let scope = builder.with_cookie_header(cookie_header).build()?;

            let replay = body.replay();
            let send_body = std::mem::replace(&mut body, RequestBody::Empty);
            let mut response = exchange::run(&self.app, scope, send_body, &options).await?;

            self.jar.store_response(response.headers(), &host, &request_path);

            if !follow || !redirect::is_redirect(response.status()) {
                return Ok(response);
            }
            let Some(location) = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned)
            else {
                return Ok(response);
            };

            hops += 1;
            if hops > max_redirects {
                return Err(Error::too_many_redirects(max_redirects));
            }

            if redirect::rewrites_to_get(response.status(), &method) {
                method = Method::GET;
                body = RequestBody::Empty;
                content_type = None;
            } else {
                match replay {
                    Some(replayed) => body = replayed,
                    // a single-pass streamed body cannot be re-issued
                    None => return Ok(response),
                }
            }

            if response.is_streaming() {
                response.bytes().await?;
            }

            tracing::debug!(
                status = %response.status(),
                location = %location,
                hops,
                "following redirect"
            );
            target = redirect::resolve_location(&request_path, &location);
        }
    }
}
