//! Integration tests for the status API
//!
//! These tests verify that:
//! - Liveness is reachable without a token
//! - Every other route enforces bearer authentication
//! - Monitor, history and stats endpoints report pipeline state

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use pulseguard::{
    ProbeOutcome,
    actors::TaskHandler,
    api::{ApiConfig, ApiState, router, spawn_api_server},
    queue::{MemoryQueue, TaskQueue},
    registry::{MonitorRegistry, StaticRegistry},
    storage::{HealthStore, MemoryStore},
};
use serde_json::Value;
use tower::ServiceExt;

use crate::helpers::*;

const TOKEN: &str = "test-token";

struct TestApi {
    addr: SocketAddr,
    handler: Arc<TaskHandler>,
    client: reqwest::Client,
}

impl TestApi {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(TOKEN)
            .send()
            .await
            .unwrap()
    }

    async fn get_json(&self, path: &str) -> Value {
        let response = self.get(path).await;
        assert_eq!(response.status(), StatusCode::OK, "GET {path}");
        response.json().await.unwrap()
    }
}

fn test_state() -> ApiState {
    let mut paused = monitor("paused", "https://paused.test/health");
    paused.active = false;

    let registry: Arc<dyn MonitorRegistry> = Arc::new(StaticRegistry::new(vec![
        monitor("api", "https://api.test/health"),
        paused,
    ]));
    let store: Arc<dyn HealthStore> = Arc::new(MemoryStore::default());
    let queue: Arc<dyn TaskQueue> = Arc::new(MemoryQueue::new(
        std::time::Duration::from_secs(30),
        5,
    ));
    let handler = Arc::new(handler(
        Arc::new(FixedProbe(ProbeOutcome::unexpected_status(500, 9))),
        store.clone(),
        Arc::new(RecordingNotifier::default()),
    ));

    ApiState::new(registry, store, queue, handler)
}

fn test_config() -> ApiConfig {
    ApiConfig {
        bind: "127.0.0.1:0".parse().unwrap(),
        auth_token: Some(TOKEN.to_string()),
        enable_cors: true,
    }
}

async fn spawn_test_api() -> TestApi {
    let state = test_state();
    let handler = state.handler.clone();
    let addr = spawn_api_server(test_config(), state).await.unwrap();

    TestApi {
        addr,
        handler,
        client: reqwest::Client::new(),
    }
}

fn task(id: &str, cycle: i64) -> String {
    pulseguard::queue::ProbeTask::new(cycle, monitor(id, "https://api.test/health"))
        .encode()
        .unwrap()
}

#[tokio::test]
async fn test_health_needs_no_token() {
    let api = spawn_test_api().await;

    let response = api.client.get(api.url("/api/v1/health")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_auth_is_enforced() {
    let api = spawn_test_api().await;

    let missing = api.client.get(api.url("/api/v1/monitors")).send().await.unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let malformed = api
        .client
        .get(api.url("/api/v1/monitors"))
        .header("Authorization", format!("Token {TOKEN}"))
        .send()
        .await
        .unwrap();
    assert_eq!(malformed.status(), StatusCode::UNAUTHORIZED);

    let wrong = api
        .client
        .get(api.url("/api/v1/stats"))
        .bearer_auth("not-the-token")
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::FORBIDDEN);

    assert_eq!(api.get("/api/v1/stats").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_list_monitors_includes_unchecked_and_inactive() {
    let api = spawn_test_api().await;

    api.handler.handle(&task("api", 1)).await.unwrap();

    let body = api.get_json("/api/v1/monitors").await;
    assert_eq!(body["count"], 2);

    let monitors = body["monitors"].as_array().unwrap();
    let checked = monitors.iter().find(|m| m["id"] == "api").unwrap();
    assert_eq!(checked["state"], "DEGRADED");
    assert_eq!(checked["consecutiveFailures"], 1);
    assert_eq!(checked["version"], 1);
    assert!(checked["lastCheckedAt"].is_string());

    let paused = monitors.iter().find(|m| m["id"] == "paused").unwrap();
    assert_eq!(paused["active"], false);
    assert_eq!(paused["state"], "HEALTHY");
    assert!(paused.get("lastCheckedAt").is_none());
}

#[tokio::test]
async fn test_get_monitor() {
    let api = spawn_test_api().await;

    for cycle in 1..=3 {
        api.handler.handle(&task("api", cycle)).await.unwrap();
    }

    let body = api.get_json("/api/v1/monitors/api").await;
    assert_eq!(body["state"], "UNHEALTHY");
    assert_eq!(body["consecutiveFailures"], 3);
    assert_eq!(body["thresholdCount"], 3);

    let missing = api.get("/api/v1/monitors/nope").await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    let body: Value = missing.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn test_history_limits() {
    let api = spawn_test_api().await;

    for cycle in 1..=5 {
        api.handler.handle(&task("api", cycle)).await.unwrap();
    }

    let body = api.get_json("/api/v1/monitors/api/history?limit=2").await;
    assert_eq!(body["monitorId"], "api");
    assert_eq!(body["count"], 2);
    assert_eq!(body["checks"][0]["cycle"], 5);
    assert_eq!(body["checks"][1]["cycle"], 4);

    let body = api.get_json("/api/v1/monitors/api/history").await;
    assert_eq!(body["count"], 5);

    for bad in ["0", "1001", "many"] {
        let response = api
            .get(&format!("/api/v1/monitors/api/history?limit={bad}"))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "limit={bad}");
    }

    let unknown = api.get("/api/v1/monitors/ghost/history").await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stats_reports_pipeline_counters() {
    let api = spawn_test_api().await;

    api.handler.handle(&task("api", 1)).await.unwrap();

    let body = api.get_json("/api/v1/stats").await;
    assert!(body["timestamp"].is_string());
    assert!(body["uptime_secs"].as_i64().unwrap() >= 0);
    assert_eq!(body["queue"]["ready"], 0);
    assert_eq!(body["storage"]["healthy"], true);
    assert!(body["dispatch"].is_object());
}

#[tokio::test]
async fn test_router_without_token_is_open() {
    let config = ApiConfig {
        auth_token: None,
        ..test_config()
    };
    let app = router(&config, test_state());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/monitors")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
