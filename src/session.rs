//! Duplex (websocket-style) sessions

use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::{de::DeserializeOwned, Serialize};
use tokio_tungstenite::tungstenite::protocol::{frame::coding::CloseCode, CloseFrame};

use crate::{
    client::TestClient,
    error::Error,
    event::Event,
    exchange::Exchange,
    scope::{ScopeBuilder, ScopeKind},
};

pub use self::message::{FromMessage, IntoMessage};
pub use tokio_tungstenite::tungstenite::Message;

pub mod message;

const NORMAL_CLOSE: u16 = 1000;

/// Where a [`DuplexSession`] is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, connect event not yet sent
    Pending,
    /// Connect sent, waiting for the application's verdict
    Connecting,
    /// Accepted; sends and receives are allowed
    Open,
    /// A close has been initiated; no sends are accepted
    Closing,
    /// Terminal, reached through either endpoint closing
    Closed,
    /// Terminal, the application refused the connect event
    Rejected,
}

/// Configures and opens a duplex session against the client's application
pub struct DuplexBuilder<'a> {
    client: &'a mut TestClient,
    path: String,
    headers: HeaderMap,
    cookies: Option<Vec<(String, String)>>,
    scheme: String,
    timeout: Option<Duration>,
}

impl<'a> DuplexBuilder<'a> {
    pub(crate) fn new(client: &'a mut TestClient, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
            headers: HeaderMap::new(),
            cookies: None,
            scheme: "ws".into(),
            timeout: None,
        }
    }

    /// Adds a header to the connect scope
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Replaces the jar cookies with an explicit set for this session
    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies
            .get_or_insert_with(Vec::new)
            .push((name.into(), value.into()));
        self
    }

    /// Overrides the connect scheme (default `ws`)
    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Overrides the client-wide event timeout for this session
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Opens the session: schedules the application task, sends the connect
    /// event and waits for the application's verdict
    pub async fn connect(self) -> Result<DuplexSession, Error> {
        let DuplexBuilder { client, path, headers, cookies, scheme, timeout } = self;
        client.ensure_started()?;

        let timeout = timeout.unwrap_or(client.timeout);
        let builder = ScopeBuilder::new(ScopeKind::Duplex, Method::GET, &path)
            .with_scheme(scheme)
            .with_client(client.client_addr.clone())
            .with_server(client.server_addr.clone())
            .with_headers(&client.default_headers)
            .with_headers(&headers);
        let host = builder.host();
        let request_path = path.split('?').next().unwrap_or("/").to_owned();
        let cookie_header = match cookies {
            Some(pairs) => crate::jar::header_from_pairs(&pairs),
            None => client.jar.header_for(&host, &request_path),
        };
        let scope = builder.with_cookie_header(cookie_header).build()?;

        let mut session = DuplexSession {
            state: SessionState::Pending,
            exchange: Exchange::spawn(&client.app, scope, timeout),
            subprotocol: None,
        };
        session.handshake().await?;
        Ok(session)
    }
}

/// A long-lived bidirectional exchange with the application.
///
/// Sends and receives ride separate queues and may be interleaved freely
/// while the application task runs. Once the session leaves [`Open`] no
/// sends are accepted and receives fail; dropping an open session cancels
/// the application task.
///
/// [`Open`]: SessionState::Open
#[derive(Debug)]
pub struct DuplexSession {
    state: SessionState,
    exchange: Exchange,
    subprotocol: Option<String>,
}

impl DuplexSession {
    async fn handshake(&mut self) -> Result<(), Error> {
        self.exchange.feed_event(Event::SessionConnect).await;
        self.state = SessionState::Connecting;

        match self.exchange.next_event().await? {
            Some(Event::SessionAccept { subprotocol }) => {
                tracing::debug!(?subprotocol, "session accepted");
                self.state = SessionState::Open;
                self.subprotocol = subprotocol;
                Ok(())
            }
            Some(Event::SessionClose { code }) => {
                self.state = SessionState::Rejected;
                self.exchange.abort();
                Err(Error::session_rejected(format!(
                    "application rejected the session with close code {code}"
                )))
            }
            Some(other) => {
                self.state = SessionState::Rejected;
                self.exchange.abort();
                Err(Error::protocol_violation(format!(
                    "expected an accept or close event, got {other:?}"
                )))
            }
            None => {
                self.state = SessionState::Rejected;
                self.exchange.reap_task().await?;
                Err(Error::session_rejected(
                    "application finished without accepting the session",
                ))
            }
        }
    }

    /// The current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The subprotocol the application accepted with, if any
    pub fn subprotocol(&self) -> Option<&str> {
        self.subprotocol.as_deref()
    }

    /// Sends one message to the application
    pub async fn send<T: IntoMessage>(&mut self, message: T) -> Result<(), Error> {
        if self.state != SessionState::Open {
            return Err(Error::session_closed("the session is not open"));
        }
        let event = Event::SessionMessage { message: message.into_message() };
        if self.exchange.sender().send(event).await.is_err() {
            self.state = SessionState::Closed;
            return Err(Error::session_closed("the application ended the session"));
        }
        Ok(())
    }

    /// Sends a text message
    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<(), Error> {
        self.send(text.into()).await
    }

    /// Sends a binary message
    pub async fn send_bytes(&mut self, bytes: impl Into<Bytes>) -> Result<(), Error> {
        self.send(bytes.into()).await
    }

    /// Sends a value serialized as structured data in a text message
    pub async fn send_json<T: Serialize>(&mut self, value: &T) -> Result<(), Error> {
        let text = serde_json::to_string(value)?;
        self.send(text).await
    }

    /// Receives the next message from the application.
    ///
    /// An application-initiated close surfaces once as a close message and
    /// moves the session to [`SessionState::Closed`].
    pub async fn receive(&mut self) -> Result<Message, Error> {
        if self.state != SessionState::Open {
            return Err(Error::session_closed("the session is not open"));
        }
        match self.exchange.next_event().await? {
            Some(Event::SessionMessage { message }) => Ok(message),
            Some(Event::SessionClose { code }) => {
                tracing::debug!(code, "application closed the session");
                self.state = SessionState::Closed;
                Ok(Message::Close(Some(CloseFrame {
                    code: CloseCode::from(code),
                    reason: "".into(),
                })))
            }
            Some(other) => {
                self.state = SessionState::Closed;
                self.exchange.abort();
                Err(Error::protocol_violation(format!(
                    "expected a session message, got {other:?}"
                )))
            }
            None => {
                self.state = SessionState::Closed;
                self.exchange.reap_task().await?;
                Err(Error::session_closed("the application ended the session"))
            }
        }
    }

    /// Receives the next message as text
    pub async fn receive_text(&mut self) -> Result<String, Error> {
        let message = self.receive().await?;
        String::from_message(message)
    }

    /// Receives the next message as raw bytes
    pub async fn receive_bytes(&mut self) -> Result<Bytes, Error> {
        let message = self.receive().await?;
        Bytes::from_message(message)
    }

    /// Receives the next message and parses it as structured data
    pub async fn receive_json<T: DeserializeOwned>(&mut self) -> Result<T, Error> {
        match self.receive().await? {
            Message::Text(text) => Ok(serde_json::from_str(text.as_str())?),
            Message::Binary(bytes) => Ok(serde_json::from_slice(&bytes)?),
            other => Err(Error::decode(format!(
                "expected a text or binary message, got {other:?}"
            ))),
        }
    }

    /// Closes the session: notifies the application and reaps its task.
    ///
    /// Idempotent; closing an already closed session does nothing.
    pub async fn close(&mut self) -> Result<(), Error> {
        if matches!(self.state, SessionState::Open | SessionState::Closed) {
            self.state = SessionState::Closing;
            self.exchange.push_event(Event::SessionDisconnect { code: NORMAL_CLOSE });
            let result = self.exchange.reap_task().await;
            self.state = SessionState::Closed;
            result?;
        }
        Ok(())
    }
}
