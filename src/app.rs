//! Application contract and task plumbing

use std::{any::Any, future::Future, pin::Pin, sync::Arc, time::Duration};

use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    error::{Error, ErrorKind},
    event::Event,
    scope::Scope,
};

/// Capacity of each of the two event queues of an exchange
pub(crate) const QUEUE_CAPACITY: usize = 32;

/// The boxed future an [`Application`] runs to completion
pub type AppFuture = Pin<Box<dyn Future<Output = Result<(), Error>> + Send>>;

/// The application entry point the harness drives.
///
/// An application is an asynchronous callable taking the exchange [`Scope`]
/// and the two queue endpoints. Any `async fn` or closure with the matching
/// signature is an application:
///
/// ```no_run
/// use drydock::{AppReceiver, AppSender, Error, Event, Scope};
/// use http::StatusCode;
///
/// async fn app(_scope: Scope, mut rx: AppReceiver, tx: AppSender) -> Result<(), Error> {
///     while let Some(event) = rx.recv().await {
///         if let Event::RequestBody { more: false, .. } = event {
///             break;
///         }
///     }
///     tx.send(Event::response_start(StatusCode::OK, &[])).await?;
///     tx.send(Event::response_body("hello")).await?;
///     Ok(())
/// }
/// ```
pub trait Application: Send + Sync + 'static {
    /// Runs one exchange to completion
    fn call(&self, scope: Scope, receiver: AppReceiver, sender: AppSender) -> AppFuture;
}

impl<F, Fut> Application for F
where
    F: Fn(Scope, AppReceiver, AppSender) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    fn call(&self, scope: Scope, receiver: AppReceiver, sender: AppSender) -> AppFuture {
        Box::pin(self(scope, receiver, sender))
    }
}

/// The application's end of the inbound queue
pub struct AppReceiver {
    inner: mpsc::Receiver<Event>,
}

impl AppReceiver {
    /// Pops the next inbound event, suspending while none is available.
    ///
    /// Returns `None` once the driver endpoint is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        self.inner.recv().await
    }
}

/// The application's end of the outbound queue
#[derive(Clone)]
pub struct AppSender {
    inner: mpsc::Sender<Event>,
}

impl AppSender {
    /// Pushes one outbound event, suspending while the queue is full
    pub async fn send(&self, event: Event) -> Result<(), Error> {
        self.inner
            .send(event)
            .await
            .map_err(|_| Error::disconnected("the driver endpoint of the exchange is gone"))
    }
}

/// Schedules `app` as a task for one exchange and returns the driver
/// endpoints together with the task handle.
///
/// The handle must stay reachable for the whole exchange, streaming
/// consumption included; the scheduler is otherwise free to reclaim the
/// in-flight task.
pub(crate) fn spawn_app(
    app: &Arc<dyn Application>,
    scope: Scope,
) -> (mpsc::Sender<Event>, mpsc::Receiver<Event>, JoinHandle<Result<(), Error>>) {
    let (to_app, inbound) = mpsc::channel(QUEUE_CAPACITY);
    let (outbound, from_app) = mpsc::channel(QUEUE_CAPACITY);
    let future = app.call(
        scope,
        AppReceiver { inner: inbound },
        AppSender { inner: outbound },
    );
    (to_app, from_app, tokio::spawn(future))
}

/// Awaits the application task within `limit` and folds its outcome into the
/// exchange result; a task that overruns the limit is aborted
pub(crate) async fn reap(
    mut task: JoinHandle<Result<(), Error>>,
    limit: Duration,
) -> Result<(), Error> {
    let joined = match tokio::time::timeout(limit, &mut task).await {
        Ok(joined) => joined,
        Err(_) => {
            task.abort();
            let _ = task.await;
            return Err(Error::new(
                ErrorKind::Timeout,
                "application task did not finish within the timeout",
            ));
        }
    };
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) if err.kind() == ErrorKind::Application => Err(err),
        Ok(Err(err)) => Err(Error::application(err)),
        Err(err) if err.is_panic() => Err(Error::application(panic_message(err.into_panic()))),
        Err(_) => Ok(()),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    let payload = match payload.downcast::<String>() {
        Ok(message) => return format!("application panicked: {message}"),
        Err(payload) => payload,
    };
    match payload.downcast::<&'static str>() {
        Ok(message) => format!("application panicked: {message}"),
        Err(_) => "application panicked".into(),
    }
}
