//! The once-per-session lifecycle handshake

use std::{sync::Arc, time::Duration};

use crate::{
    app::Application,
    error::Error,
    event::Event,
    exchange::Exchange,
    scope::Scope,
};

/// Drives the startup/shutdown handshake over its own queue pair.
///
/// The application task is spawned once and serves both ends of the
/// handshake; its handle stays retained for the client's whole session.
pub(crate) struct Lifespan {
    exchange: Exchange,
}

impl Lifespan {
    pub(crate) fn spawn(app: &Arc<dyn Application>, timeout: Duration) -> Self {
        Self {
            exchange: Exchange::spawn(app, Scope::lifecycle(), timeout),
        }
    }

    pub(crate) async fn startup(&mut self) -> Result<(), Error> {
        self.exchange.feed_event(Event::LifecycleStartup).await;

        match self.exchange.next_event().await {
            Ok(Some(Event::StartupComplete)) => Ok(()),
            Ok(Some(Event::StartupFailed { message })) => Err(Error::startup(message)),
            Ok(Some(other)) => {
                self.exchange.abort();
                Err(Error::protocol_violation(format!(
                    "expected a startup completion event, got {other:?}"
                )))
            }
            Ok(None) => match self.exchange.reap_task().await {
                Err(err) => Err(Error::startup(err)),
                Ok(()) => Err(Error::startup(
                    "application finished without completing startup",
                )),
            },
            // the timed-out task has already been cancelled
            Err(err) => Err(Error::startup(err)),
        }
    }

    pub(crate) async fn shutdown(&mut self) -> Result<(), Error> {
        self.exchange.feed_event(Event::LifecycleShutdown).await;

        let result = match self.exchange.next_event().await {
            Ok(Some(Event::ShutdownComplete)) => Ok(()),
            Ok(Some(Event::ShutdownFailed { message })) => Err(Error::shutdown(message)),
            Ok(Some(other)) => Err(Error::shutdown(format!(
                "expected a shutdown completion event, got {other:?}"
            ))),
            Ok(None) => match self.exchange.reap_task().await {
                Err(err) => Err(Error::shutdown(err)),
                Ok(()) => Err(Error::shutdown(
                    "application finished without completing shutdown",
                )),
            },
            Err(err) => Err(Error::shutdown(err)),
        };

        // teardown always completes, whatever the application did
        self.exchange.abort();
        result
    }
}
