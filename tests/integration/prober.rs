//! HTTP probe classification against a live mock endpoint

use std::time::Duration;

use pulseguard::{
    FailureReason, HttpMethod,
    monitors::{HttpProber, Probe},
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::monitor;

async fn server_returning(status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(status))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_expected_status_is_healthy() {
    let server = server_returning(200).await;
    let prober = HttpProber::new().unwrap();

    let outcome = prober
        .probe(&monitor("api", &format!("{}/health", server.uri())))
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.status_code, 200);
    assert_eq!(outcome.failure_reason, FailureReason::None);
}

#[tokio::test]
async fn test_other_status_is_unexpected_status() {
    let server = server_returning(503).await;
    let prober = HttpProber::new().unwrap();

    let outcome = prober
        .probe(&monitor("api", &format!("{}/health", server.uri())))
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.status_code, 503);
    assert_eq!(outcome.failure_reason, FailureReason::UnexpectedStatus);
}

#[tokio::test]
async fn test_custom_expected_status() {
    let server = server_returning(204).await;
    let prober = HttpProber::new().unwrap();

    let mut m = monitor("api", &format!("{}/health", server.uri()));
    m.expected_status = 204;
    assert!(prober.probe(&m).await.success);

    // 200 is not special once another status is expected
    let server = server_returning(200).await;
    m.endpoint = format!("{}/health", server.uri());
    let outcome = prober.probe(&m).await;
    assert!(!outcome.success);
    assert_eq!(outcome.failure_reason, FailureReason::UnexpectedStatus);
}

#[tokio::test]
async fn test_slow_response_is_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(800)))
        .mount(&server)
        .await;

    let prober = HttpProber::new().unwrap();
    let mut m = monitor("slow", &format!("{}/health", server.uri()));
    m.timeout_ms = 100;

    let outcome = prober.probe(&m).await;

    assert!(!outcome.success);
    assert_eq!(outcome.status_code, 0);
    assert_eq!(outcome.failure_reason, FailureReason::Timeout);
    assert!(outcome.latency_ms < 800);
}

#[tokio::test]
async fn test_refused_connection_is_connection_error() {
    // grab a free port and release it so nothing is listening there
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let prober = HttpProber::new().unwrap();
    let outcome = prober
        .probe(&monitor("gone", &format!("http://127.0.0.1:{port}/health")))
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.status_code, 0);
    assert_eq!(outcome.failure_reason, FailureReason::ConnectionError);
}

#[tokio::test]
async fn test_configured_method_is_used() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let prober = HttpProber::new().unwrap();
    let mut m = monitor("head", &format!("{}/ping", server.uri()));
    m.method = HttpMethod::Head;

    assert!(prober.probe(&m).await.success);

    // GET is not mocked, wiremock answers 404
    m.method = HttpMethod::Get;
    let outcome = prober.probe(&m).await;
    assert_eq!(outcome.status_code, 404);
}
