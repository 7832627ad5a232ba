use bytes::BytesMut;
use drydock::{AppReceiver, AppSender, Error, ErrorKind, Event, Scope, ScopeKind, TestClient};
use http::StatusCode;

/// Serves the lifecycle handshake and a trivial request handler
async fn with_lifecycle(scope: Scope, mut rx: AppReceiver, tx: AppSender) -> Result<(), Error> {
    match scope.kind {
        ScopeKind::Lifecycle => {
            while let Some(event) = rx.recv().await {
                match event {
                    Event::LifecycleStartup => tx.send(Event::StartupComplete).await?,
                    Event::LifecycleShutdown => {
                        tx.send(Event::ShutdownComplete).await?;
                        break;
                    }
                    _ => break,
                }
            }
        }
        _ => {
            let mut body = BytesMut::new();
            while let Some(event) = rx.recv().await {
                match event {
                    Event::RequestBody { chunk, more } => {
                        body.extend_from_slice(&chunk);
                        if !more {
                            break;
                        }
                    }
                    _ => break,
                }
            }
            tx.send(Event::response_start(StatusCode::OK, &[])).await?;
            tx.send(Event::response_body("up")).await?;
        }
    }
    Ok(())
}

#[tokio::test]
async fn it_completes_the_lifecycle_handshake() {
    let mut client = TestClient::new(with_lifecycle);

    client.startup().await.unwrap();

    let mut response = client.get("/").send().await.unwrap();
    assert_eq!(response.text().await.unwrap(), "up");

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn it_fails_startup_with_the_application_message() {
    async fn broken(scope: Scope, mut rx: AppReceiver, tx: AppSender) -> Result<(), Error> {
        if scope.kind == ScopeKind::Lifecycle {
            if let Some(Event::LifecycleStartup) = rx.recv().await {
                tx.send(Event::StartupFailed { message: "migrations pending".into() }).await?;
            }
        }
        Ok(())
    }

    let mut client = TestClient::new(broken);
    let err = client.startup().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Startup);
    assert!(err.to_string().contains("migrations pending"));
}

#[tokio::test]
async fn it_refuses_exchanges_after_a_failed_startup() {
    async fn broken(scope: Scope, mut rx: AppReceiver, tx: AppSender) -> Result<(), Error> {
        if scope.kind == ScopeKind::Lifecycle {
            if let Some(Event::LifecycleStartup) = rx.recv().await {
                tx.send(Event::StartupFailed { message: "no database".into() }).await?;
            }
        }
        Ok(())
    }

    let mut client = TestClient::new(broken);
    client.startup().await.unwrap_err();

    let err = client.get("/").send().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Startup);

    let err = client.duplex("/ws").connect().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Startup);
}

#[tokio::test]
async fn it_times_out_an_unresponsive_startup() {
    async fn deaf(scope: Scope, mut rx: AppReceiver, _tx: AppSender) -> Result<(), Error> {
        if scope.kind == ScopeKind::Lifecycle {
            // reads the startup event but never acknowledges it
            let _ = rx.recv().await;
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        }
        Ok(())
    }

    let mut client = TestClient::new(deaf).with_timeout(std::time::Duration::from_millis(50));
    let err = client.startup().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Startup);
}

#[tokio::test]
async fn it_reports_shutdown_failures_without_blocking_teardown() {
    async fn clingy(scope: Scope, mut rx: AppReceiver, tx: AppSender) -> Result<(), Error> {
        if scope.kind == ScopeKind::Lifecycle {
            while let Some(event) = rx.recv().await {
                match event {
                    Event::LifecycleStartup => tx.send(Event::StartupComplete).await?,
                    Event::LifecycleShutdown => {
                        tx.send(Event::ShutdownFailed { message: "refusing to die".into() }).await?;
                        break;
                    }
                    _ => break,
                }
            }
        }
        Ok(())
    }

    let mut client = TestClient::new(clingy);
    client.startup().await.unwrap();

    let err = client.shutdown().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Shutdown);
    assert!(err.to_string().contains("refusing to die"));

    // teardown completed; a second shutdown is a no-op
    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn it_serves_requests_without_an_explicit_startup() {
    let mut client = TestClient::new(with_lifecycle);

    let mut response = client.get("/").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
