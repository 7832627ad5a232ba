//! Protocol events exchanged between the driver and the application

use bytes::Bytes;
use http::StatusCode;
use tokio_tungstenite::tungstenite::Message;

/// A single typed event of an exchange.
///
/// Events travel through exactly two FIFO queues per exchange: an inbound
/// queue the application reads and an outbound queue it writes. The enum is
/// closed so that ordering rules (a [`ResponseStart`] must precede every
/// [`ResponseBody`]) can be checked exhaustively.
///
/// [`ResponseStart`]: Event::ResponseStart
/// [`ResponseBody`]: Event::ResponseBody
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A chunk of the request body; `more` signals that further chunks follow
    RequestBody { chunk: Bytes, more: bool },
    /// The driver is done with the exchange
    Disconnect,
    /// Response status and headers; must be the first outbound event
    ResponseStart { status: StatusCode, headers: Vec<(Bytes, Bytes)> },
    /// A chunk of the response body; `more: false` terminates the response
    ResponseBody { chunk: Bytes, more: bool },
    /// Lifecycle startup request
    LifecycleStartup,
    /// Lifecycle shutdown request
    LifecycleShutdown,
    /// The application finished starting up
    StartupComplete,
    /// The application failed to start up
    StartupFailed { message: String },
    /// The application finished shutting down
    ShutdownComplete,
    /// The application failed to shut down
    ShutdownFailed { message: String },
    /// Opens a duplex session
    SessionConnect,
    /// The application accepted the duplex session
    SessionAccept { subprotocol: Option<String> },
    /// A text or binary message of an open duplex session
    SessionMessage { message: Message },
    /// The driver closes the duplex session
    SessionDisconnect { code: u16 },
    /// The application closes the duplex session
    SessionClose { code: u16 },
}

impl Event {
    /// Creates a [`Event::ResponseStart`] from a status and string header pairs
    pub fn response_start(status: StatusCode, headers: &[(&str, &str)]) -> Self {
        let headers = headers
            .iter()
            .map(|(name, value)| {
                (
                    Bytes::copy_from_slice(name.to_ascii_lowercase().as_bytes()),
                    Bytes::copy_from_slice(value.as_bytes()),
                )
            })
            .collect();
        Event::ResponseStart { status, headers }
    }

    /// Creates a final [`Event::ResponseBody`] carrying the whole body
    pub fn response_body(chunk: impl Into<Bytes>) -> Self {
        Event::ResponseBody { chunk: chunk.into(), more: false }
    }

    /// Creates a non-final [`Event::ResponseBody`] chunk
    pub fn response_chunk(chunk: impl Into<Bytes>) -> Self {
        Event::ResponseBody { chunk: chunk.into(), more: true }
    }

    /// Creates a text [`Event::SessionMessage`]
    pub fn text(data: impl Into<String>) -> Self {
        Event::SessionMessage { message: Message::text(data.into()) }
    }

    /// Creates a binary [`Event::SessionMessage`]
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Event::SessionMessage { message: Message::binary(data.into()) }
    }
}
