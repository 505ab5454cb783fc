//! Render deadlines and the timeout middleware, end to end.

use std::time::{Duration, Instant};

use reqwest::StatusCode;

mod common;

use common::{client, TestServer};

#[tokio::test]
async fn slow_render_is_cut_off_with_rich_408() {
    let server = TestServer::start(
        r#"
routes:
  - path: /slow
    verb: GET
    template: '{{sleep "3s"}}never sent'
  - path: /fast
    verb: GET
    template: "quick"
server:
  timeouts:
    request_secs: 1
"#,
    )
    .await;

    let started = Instant::now();
    let response = client().get(server.url("/slow")).send().await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    assert!(
        elapsed >= Duration::from_millis(900) && elapsed < Duration::from_millis(2500),
        "timeout should fire near the 1s bound, took {elapsed:?}"
    );
    let body = response.text().await.unwrap();
    assert!(body.starts_with(
        "408 Request Timeout\n\nThe request exceeded the configured timeout and was terminated."
    ));
    assert!(body.contains("Timeout occurred after:"));

    // The runtime is not wedged by the abandoned render.
    let healthy = client().get(server.url("/fast")).send().await.unwrap();
    assert_eq!(healthy.status(), StatusCode::OK);
    assert_eq!(healthy.text().await.unwrap(), "quick");
}

#[tokio::test]
async fn timeout_middleware_bounds_the_whole_chain() {
    let server = TestServer::start(
        r#"
routes:
  - path: /slow
    verb: GET
    template: '{{sleep "2s"}}never sent'
middleware:
  enabled:
    - type: timeout
      config:
        duration_ms: 500
"#,
    )
    .await;

    let started = Instant::now();
    let response = client().get(server.url("/slow")).send().await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    assert!(
        elapsed < Duration::from_millis(1500),
        "middleware bound should fire at 500ms, took {elapsed:?}"
    );
    assert_eq!(response.text().await.unwrap(), "request timeout\n");
}

#[tokio::test]
async fn sub_second_sleeps_render_normally() {
    let server = TestServer::start(
        r#"
routes:
  - path: /latency
    verb: GET
    template: '{{sleep "100ms"}}took a moment'
"#,
    )
    .await;

    let started = Instant::now();
    let response = client().get(server.url("/latency")).send().await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert_eq!(response.text().await.unwrap(), "took a moment");
}
