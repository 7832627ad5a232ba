//! # Drydock
//!
//! > In-process test client for async message-protocol applications, built on the
//! > [Tokio](https://tokio.rs/) runtime — drive an application through its native
//! > event protocol without ever opening a socket.
//!
//! ## Features
//! * Request/response exchanges with buffered or streamed bodies
//! * Duplex (websocket-style) sessions with an explicit open/close lifecycle
//! * Lifecycle startup/shutdown handshake
//! * Cookie persistence, redirect following, url-encoded and multipart forms
//!
//! ## Example
//! ```toml
//! [dev-dependencies]
//! drydock = "0.1"
//! tokio = { version = "1", features = ["full"] }
//! ```
//! ```no_run
//! use drydock::{AppReceiver, AppSender, Event, Scope, TestClient};
//! use http::StatusCode;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), drydock::Error> {
//!     let mut client = TestClient::new(|_scope: Scope, _rx: AppReceiver, tx: AppSender| async move {
//!         tx.send(Event::response_start(StatusCode::OK, &[])).await?;
//!         tx.send(Event::response_body("hello")).await?;
//!         Ok(())
//!     });
//!
//!     let mut response = client.get("/").send().await?;
//!     assert_eq!(response.text().await?, "hello");
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(unreachable_pub)]

mod exchange;
mod redirect;

pub mod app;
pub mod client;
pub mod error;
pub mod event;
pub mod form;
pub mod jar;
pub mod response;
pub mod scope;
pub mod session;

pub use crate::app::{AppFuture, AppReceiver, AppSender, Application};
pub use crate::client::{RequestBuilder, TestClient};
pub use crate::error::{Error, ErrorKind};
pub use crate::event::Event;
pub use crate::form::FormData;
pub use crate::jar::Jar;
pub use crate::response::TestResponse;
pub use crate::scope::{Scope, ScopeKind};
pub use crate::session::{
    DuplexBuilder,
    DuplexSession,
    FromMessage,
    IntoMessage,
    Message,
    SessionState,
};
