//! The engine driving one request/response exchange

use std::{sync::Arc, time::Duration};

use bytes::{Bytes, BytesMut};
use futures_util::{stream::BoxStream, StreamExt};
use http::{HeaderMap, HeaderName, HeaderValue};
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    app::{reap, spawn_app, Application},
    error::{Error, ErrorKind},
    event::Event,
    response::TestResponse,
    scope::Scope,
};

/// The request body handed to the engine
pub(crate) enum RequestBody {
    Empty,
    Full(Bytes),
    Stream(BoxStream<'static, Bytes>),
}

impl RequestBody {
    pub(crate) fn len(&self) -> Option<usize> {
        match self {
            RequestBody::Empty => None,
            RequestBody::Full(bytes) => Some(bytes.len()),
            RequestBody::Stream(_) => None,
        }
    }

    /// A buffered copy for re-issuing the request on 307/308 redirects;
    /// streamed sources are single-pass and cannot be replayed
    pub(crate) fn replay(&self) -> Option<RequestBody> {
        match self {
            RequestBody::Empty => Some(RequestBody::Empty),
            RequestBody::Full(bytes) => Some(RequestBody::Full(bytes.clone())),
            RequestBody::Stream(_) => None,
        }
    }
}

pub(crate) struct ExchangeOptions {
    pub(crate) timeout: Duration,
    pub(crate) stream_response: bool,
    pub(crate) capture_app_errors: bool,
}

/// Driver-side state of one in-flight exchange.
///
/// Holds the queue endpoints and, crucially, the strong handle to the
/// application task: the handle must stay reachable for the whole exchange,
/// streaming consumption included. Dropping the exchange aborts whatever is
/// still running.
#[derive(Debug)]
pub(crate) struct Exchange {
    to_app: mpsc::Sender<Event>,
    from_app: mpsc::Receiver<Event>,
    task: Option<JoinHandle<Result<(), Error>>>,
    feeder: Option<JoinHandle<()>>,
    timeout: Duration,
}

impl Exchange {
    pub(crate) fn spawn(app: &Arc<dyn Application>, scope: Scope, timeout: Duration) -> Self {
        let (to_app, from_app, task) = spawn_app(app, scope);
        Self {
            to_app,
            from_app,
            task: Some(task),
            feeder: None,
            timeout,
        }
    }

    pub(crate) fn sender(&self) -> mpsc::Sender<Event> {
        self.to_app.clone()
    }

    /// Pushes one inbound event, suspending while the queue is full
    pub(crate) async fn feed_event(&mut self, event: Event) {
        let _ = self.to_app.send(event).await;
    }

    /// Pushes one inbound event without suspending; dropped when the queue
    /// is full or the application is gone
    pub(crate) fn push_event(&self, event: Event) {
        let _ = self.to_app.try_send(event);
    }

    /// Pushes the request body into the inbound queue.
    ///
    /// A sized payload goes out as a single final chunk; a streaming source
    /// is fed by a separate task so the driver can keep draining the
    /// outbound queue while the bounded inbound queue fills.
    pub(crate) async fn feed(&mut self, body: RequestBody) {
        match body {
            RequestBody::Empty => {
                let _ = self.to_app
                    .send(Event::RequestBody { chunk: Bytes::new(), more: false })
                    .await;
            }
            RequestBody::Full(chunk) => {
                let _ = self.to_app
                    .send(Event::RequestBody { chunk, more: false })
                    .await;
            }
            RequestBody::Stream(mut chunks) => {
                let to_app = self.to_app.clone();
                self.feeder = Some(tokio::spawn(async move {
                    while let Some(chunk) = chunks.next().await {
                        let event = Event::RequestBody { chunk, more: true };
                        if to_app.send(event).await.is_err() {
                            return;
                        }
                    }
                    let done = Event::RequestBody { chunk: Bytes::new(), more: false };
                    let _ = to_app.send(done).await;
                }));
            }
        }
    }

    /// Pops the next outbound event within the timeout.
    ///
    /// `None` means the application task completed and its queue endpoint is
    /// gone. On timeout the task is cancelled, unless it already failed, in
    /// which case its failure is surfaced instead.
    pub(crate) async fn next_event(&mut self) -> Result<Option<Event>, Error> {
        match tokio::time::timeout(self.timeout, self.from_app.recv()).await {
            Ok(event) => Ok(event),
            Err(elapsed) => {
                if self.task.as_ref().is_some_and(|task| task.is_finished()) {
                    self.reap_task().await?;
                }
                self.abort();
                Err(elapsed.into())
            }
        }
    }

    /// Surfaces the application task's outcome
    pub(crate) async fn reap_task(&mut self) -> Result<(), Error> {
        match self.task.take() {
            Some(task) => reap(task, self.timeout).await,
            None => Ok(()),
        }
    }

    /// Completes the exchange after the final body chunk: notifies the
    /// application, reaps its task and rejects events sent past the end
    pub(crate) async fn finish(&mut self) -> Result<(), Error> {
        let _ = self.to_app.try_send(Event::Disconnect);
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
        }
        self.reap_task().await?;

        if let Ok(event) = self.from_app.try_recv() {
            return Err(Error::protocol_violation(format!(
                "event after the final body chunk: {event:?}"
            )));
        }
        Ok(())
    }

    pub(crate) fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
        }
    }
}

impl Drop for Exchange {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Runs one request/response exchange to completion
pub(crate) async fn run(
    app: &Arc<dyn Application>,
    scope: Scope,
    body: RequestBody,
    options: &ExchangeOptions,
) -> Result<TestResponse, Error> {
    tracing::debug!(method = %scope.method, path = %scope.path, "starting exchange");
    match drive(app, scope, body, options).await {
        Err(err) if err.kind() == ErrorKind::Application && options.capture_app_errors => {
            tracing::debug!(error = %err, "capturing application error as a 500 response");
            Ok(TestResponse::synthetic_error(&err))
        }
        other => other,
    }
}

async fn drive(
    app: &Arc<dyn Application>,
    scope: Scope,
    body: RequestBody,
    options: &ExchangeOptions,
) -> Result<TestResponse, Error> {
    let mut exchange = Exchange::spawn(app, scope, options.timeout);
    exchange.feed(body).await;

    let (status, headers) = match exchange.next_event().await? {
        Some(Event::ResponseStart { status, headers }) => (status, header_map(headers)?),
        Some(other) => {
            exchange.abort();
            return Err(Error::protocol_violation(format!(
                "expected a response-start event, got {other:?}"
            )));
        }
        None => {
            exchange.reap_task().await?;
            return Err(Error::protocol_violation(
                "application finished without starting a response",
            ));
        }
    };

    if options.stream_response {
        return Ok(TestResponse::streaming(status, headers, exchange));
    }

    let mut buffered = BytesMut::new();
    loop {
        match exchange.next_event().await? {
            Some(Event::ResponseBody { chunk, more }) => {
                buffered.extend_from_slice(&chunk);
                if !more {
                    break;
                }
            }
            Some(other) => {
                exchange.abort();
                return Err(Error::protocol_violation(format!(
                    "expected a response-body event, got {other:?}"
                )));
            }
            None => {
                exchange.reap_task().await?;
                return Err(Error::protocol_violation(
                    "application finished before the final body chunk",
                ));
            }
        }
    }
    exchange.finish().await?;

    tracing::debug!(status = %status, bytes = buffered.len(), "exchange complete");
    Ok(TestResponse::buffered(status, headers, buffered.freeze()))
}

/// Collects the byte header pairs of a response-start event, preserving
/// duplicates; invalid names or values are the application's fault
pub(crate) fn header_map(pairs: Vec<(Bytes, Bytes)>) -> Result<HeaderMap, Error> {
    let mut headers = HeaderMap::with_capacity(pairs.len());
    for (name, value) in pairs {
        let name = HeaderName::from_bytes(&name).map_err(|err| {
            Error::protocol_violation(format!("invalid response header name: {err}"))
        })?;
        let value = HeaderValue::from_bytes(&value).map_err(|err| {
            Error::protocol_violation(format!("invalid response header value: {err}"))
        })?;
        headers.append(name, value);
    }
    Ok(headers)
}
