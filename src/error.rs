//! Error handling tools

use std::{error::Error as StdError, fmt};

use tokio::time::error::Elapsed;

type BoxError = Box<
    dyn StdError
    + Send
    + Sync
>;

/// Classifies an [`Error`] by the failure it reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The request carried a query string both embedded in the path and as a separate argument
    AmbiguousRequest,
    /// The application violated the event ordering of the exchange protocol
    ProtocolViolation,
    /// The application returned an error or panicked
    Application,
    /// The lifecycle startup handshake failed or timed out
    Startup,
    /// The lifecycle shutdown handshake failed or timed out
    Shutdown,
    /// The application refused the duplex connect event
    SessionRejected,
    /// A send or receive was issued on a duplex session that is no longer open
    SessionClosed,
    /// Redirect following exceeded the configured hop limit
    TooManyRedirects,
    /// The application produced no event within the configured timeout
    Timeout,
    /// A payload could not be decoded as structured data
    Decode,
    /// A streamed response body was read again after full consumption
    StreamConsumed,
    /// The other endpoint of an exchange queue is gone
    Disconnected,
}

impl ErrorKind {
    fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::AmbiguousRequest => "ambiguous request",
            ErrorKind::ProtocolViolation => "protocol violation",
            ErrorKind::Application => "application error",
            ErrorKind::Startup => "startup error",
            ErrorKind::Shutdown => "shutdown error",
            ErrorKind::SessionRejected => "session rejected",
            ErrorKind::SessionClosed => "session closed",
            ErrorKind::TooManyRedirects => "too many redirects",
            ErrorKind::Timeout => "timed out",
            ErrorKind::Decode => "decode error",
            ErrorKind::StreamConsumed => "stream consumed",
            ErrorKind::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generic error of a test exchange
#[derive(Debug)]
pub struct Error {
    pub(crate) kind: ErrorKind,
    pub(crate) inner: BoxError,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.inner)
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.inner.as_ref())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Self {
            kind: ErrorKind::Decode,
            inner: err.into(),
        }
    }
}

impl From<Elapsed> for Error {
    #[inline]
    fn from(err: Elapsed) -> Self {
        Self {
            kind: ErrorKind::Timeout,
            inner: err.into(),
        }
    }
}

impl Error {
    /// Creates a new [`Error`] from a kind and an underlying error
    pub fn new(kind: ErrorKind, err: impl Into<BoxError>) -> Self {
        Self { kind, inner: err.into() }
    }

    #[inline]
    pub(crate) fn ambiguous_request(err: impl Into<BoxError>) -> Self {
        Self::new(ErrorKind::AmbiguousRequest, err)
    }

    #[inline]
    pub(crate) fn protocol_violation(err: impl Into<BoxError>) -> Self {
        Self::new(ErrorKind::ProtocolViolation, err)
    }

    #[inline]
    pub(crate) fn application(err: impl Into<BoxError>) -> Self {
        Self::new(ErrorKind::Application, err)
    }

    #[inline]
    pub(crate) fn startup(err: impl Into<BoxError>) -> Self {
        Self::new(ErrorKind::Startup, err)
    }

    #[inline]
    pub(crate) fn shutdown(err: impl Into<BoxError>) -> Self {
        Self::new(ErrorKind::Shutdown, err)
    }

    #[inline]
    pub(crate) fn session_rejected(err: impl Into<BoxError>) -> Self {
        Self::new(ErrorKind::SessionRejected, err)
    }

    #[inline]
    pub(crate) fn session_closed(err: impl Into<BoxError>) -> Self {
        Self::new(ErrorKind::SessionClosed, err)
    }

    #[inline]
    pub(crate) fn too_many_redirects(hops: usize) -> Self {
        Self::new(
            ErrorKind::TooManyRedirects,
            format!("stopped after {hops} redirect hops"),
        )
    }

    #[inline]
    pub(crate) fn decode(err: impl Into<BoxError>) -> Self {
        Self::new(ErrorKind::Decode, err)
    }

    #[inline]
    pub(crate) fn stream_consumed() -> Self {
        Self::new(ErrorKind::StreamConsumed, "response body has already been consumed")
    }

    #[inline]
    pub(crate) fn disconnected(err: impl Into<BoxError>) -> Self {
        Self::new(ErrorKind::Disconnected, err)
    }

    /// Returns the kind of this error
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Unwraps the inner error
    pub fn into_inner(self) -> BoxError {
        self.inner
    }

    /// Checks whether the exchange timed out
    #[inline]
    pub fn is_timeout(&self) -> bool {
        self.kind == ErrorKind::Timeout
    }

    /// Checks whether the application under test failed
    #[inline]
    pub fn is_application(&self) -> bool {
        self.kind == ErrorKind::Application
    }

    /// Checks whether the application violated the exchange protocol
    #[inline]
    pub fn is_protocol_violation(&self) -> bool {
        self.kind == ErrorKind::ProtocolViolation
    }
}
