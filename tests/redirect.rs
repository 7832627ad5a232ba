use bytes::BytesMut;
use drydock::{AppReceiver, AppSender, Error, ErrorKind, Event, Scope, TestClient};
use http::StatusCode;

async fn drain_request(rx: &mut AppReceiver) -> BytesMut {
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
    body
}

/// Redirects `/start` according to the status embedded in the query string
/// and reports method and body at `/target`
async fn redirector(scope: Scope, mut rx: AppReceiver, tx: AppSender) -> Result<(), Error> {
    let body = drain_request(&mut rx).await;
    match scope.path.as_str() {
        "/start" => {
            let status = match &scope.query[..] {
                b"status=303" => StatusCode::SEE_OTHER,
                b"status=307" => StatusCode::TEMPORARY_REDIRECT,
                _ => StatusCode::FOUND,
            };
            tx.send(Event::response_start(status, &[("location", "/target")])).await?;
            tx.send(Event::response_body("")).await?;
        }
        "/target" => {
            tx.send(Event::response_start(StatusCode::OK, &[])).await?;
            let report = format!("{}:{}", scope.method, String::from_utf8_lossy(&body));
            tx.send(Event::response_body(report)).await?;
        }
        _ => {
            tx.send(Event::response_start(StatusCode::NOT_FOUND, &[])).await?;
            tx.send(Event::response_body("")).await?;
        }
    }
    Ok(())
}

#[tokio::test]
async fn it_rewrites_a_303_post_to_a_bodyless_get() {
    let mut client = TestClient::new(redirector);

    let mut response = client
        .post("/start?status=303")
        .body("payload")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "GET:");
}

#[tokio::test]
async fn it_preserves_method_and_body_on_307() {
    let mut client = TestClient::new(redirector);

    let mut response = client
        .post("/start?status=307")
        .body("payload")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "POST:payload");
}

#[tokio::test]
async fn it_returns_the_redirect_when_following_is_disabled() {
    let mut client = TestClient::new(redirector);

    let response = client
        .post("/start?status=303")
        .body("payload")
        .follow_redirects(false)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers().get("location").unwrap(), "/target");
}

#[tokio::test]
async fn it_fails_past_the_hop_limit() {
    async fn looping(_scope: Scope, mut rx: AppReceiver, tx: AppSender) -> Result<(), Error> {
        drain_request(&mut rx).await;
        tx.send(Event::response_start(StatusCode::FOUND, &[("location", "/loop")])).await?;
        tx.send(Event::response_body("")).await?;
        Ok(())
    }

    let mut client = TestClient::new(looping).with_max_redirects(3);
    let err = client.get("/loop").send().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TooManyRedirects);
}

#[tokio::test]
async fn it_resolves_relative_locations() {
    async fn relative(scope: Scope, mut rx: AppReceiver, tx: AppSender) -> Result<(), Error> {
        drain_request(&mut rx).await;
        if scope.path == "/nested/origin" {
            tx.send(Event::response_start(StatusCode::FOUND, &[("location", "sibling")])).await?;
            tx.send(Event::response_body("")).await?;
        } else {
            tx.send(Event::response_start(StatusCode::OK, &[])).await?;
            tx.send(Event::response_body(scope.path.clone())).await?;
        }
        Ok(())
    }

    let mut client = TestClient::new(relative);
    let mut response = client.get("/nested/origin").send().await.unwrap();

    assert_eq!(response.text().await.unwrap(), "/nested/sibling");
}

#[tokio::test]
async fn it_returns_a_redirect_without_a_location_as_is() {
    async fn lost(_scope: Scope, mut rx: AppReceiver, tx: AppSender) -> Result<(), Error> {
        drain_request(&mut rx).await;
        tx.send(Event::response_start(StatusCode::FOUND, &[])).await?;
        tx.send(Event::response_body("nowhere to go")).await?;
        Ok(())
    }

    let mut client = TestClient::new(lost);
    let mut response = client.get("/").send().await.unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.text().await.unwrap(), "nowhere to go");
}
