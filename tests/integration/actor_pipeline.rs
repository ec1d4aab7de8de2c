//! Scheduler → queue → dispatch, end to end
//!
//! The probe target and the alert webhook are both wiremock servers.

use std::sync::Arc;
use std::time::Duration;

use pulseguard::{
    HealthState, ProbeOutcome,
    actors::{DispatchHandle, SchedulerHandle, TaskHandler, scheduler::fan_out},
    alerts::AlertManager,
    config::{NotifierConfig, NotifierKind, SchedulerConfig, Webhook},
    monitors::HttpProber,
    queue::{MemoryQueue, TaskQueue},
    registry::{MonitorRegistry, StaticRegistry},
    storage::{HealthStore, MemoryStore},
};
use serde_json::Value;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

async fn mount_status(server: &MockServer, status: u16) {
    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

async fn webhook_receiver() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/alerts"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    server
}

async fn alert_subjects(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter_map(|req| req.body_json::<Value>().ok())
        .filter_map(|body| body["subject"].as_str().map(str::to_string))
        .collect()
}

fn webhook_alerts(receiver: &MockServer) -> AlertManager {
    let config = NotifierConfig {
        kind: NotifierKind::Webhook(Webhook {
            url: format!("{}/alerts", receiver.uri()),
        }),
        max_attempts: 3,
        backoff_ms: 10,
        timeout_ms: 2000,
    };
    AlertManager::from_config(&config, reqwest::Client::new())
}

/// Fan out one cycle and wait until dispatch has applied it
async fn run_cycle(
    registry: &StaticRegistry,
    queue: &MemoryQueue,
    handler: &TaskHandler,
    cycle: i64,
) {
    let before = handler.stats().applied;
    let report = fan_out(registry, queue, 10, cycle).await.unwrap();
    assert_eq!(report.submitted, 1);
    assert!(eventually(move || async move { handler.stats().applied > before }).await);
}

#[tokio::test]
async fn test_outage_and_recovery_alert_once_each() {
    let target = MockServer::start().await;
    mount_status(&target, 503).await;
    let receiver = webhook_receiver().await;

    let registry = StaticRegistry::new(vec![monitor(
        "api",
        &format!("{}/health", target.uri()),
    )]);
    let queue = memory_queue();
    let store = Arc::new(MemoryStore::default());

    let handler = Arc::new(TaskHandler::new(
        Arc::new(HttpProber::new().unwrap()),
        store.clone(),
        webhook_alerts(&receiver),
        Duration::from_secs(2),
    ));
    let dispatch = DispatchHandle::spawn(queue.clone(), handler.clone(), 2);

    // one cycle at a time so they are applied in order
    for cycle in 1..=3 {
        run_cycle(&registry, &queue, &handler, cycle).await;
    }

    let stored = store.get("api").await.unwrap().unwrap();
    assert_eq!(stored.record.state, HealthState::Unhealthy);
    assert_eq!(stored.record.consecutive_failures, 3);

    let r = &receiver;
    assert!(eventually(move || async move { alert_subjects(r).await.len() == 1 }).await);

    // still down: no repeat alert
    run_cycle(&registry, &queue, &handler, 4).await;
    assert_eq!(alert_subjects(&receiver).await.len(), 1);

    mount_status(&target, 200).await;

    // one good probe only starts the recovery
    run_cycle(&registry, &queue, &handler, 5).await;
    let stored = store.get("api").await.unwrap().unwrap();
    assert_eq!(stored.record.state, HealthState::Degraded);
    assert_eq!(stored.record.consecutive_failures, 2);

    run_cycle(&registry, &queue, &handler, 6).await;
    run_cycle(&registry, &queue, &handler, 7).await;

    let stored = store.get("api").await.unwrap().unwrap();
    assert_eq!(stored.record.state, HealthState::Healthy);
    assert_eq!(stored.record.consecutive_failures, 0);
    assert!(eventually(move || async move { alert_subjects(r).await.len() == 2 }).await);

    let subjects = alert_subjects(&receiver).await;
    assert!(subjects[0].contains("Alert"), "{subjects:?}");
    assert!(subjects[0].contains("UNHEALTHY"), "{subjects:?}");
    assert!(subjects[1].contains("Recovered"), "{subjects:?}");

    let stats = handler.stats();
    assert_eq!(stats.applied, 7);
    assert_eq!(stats.alerts_sent, 2);
    assert_eq!(stats.alerts_failed, 0);

    let history = store.query_history("api", 100).await.unwrap();
    assert_eq!(history.len(), 7);
    assert_eq!(history[0].cycle, 7);
    assert_eq!(history[6].cycle, 1);

    dispatch.shutdown().await;
}

#[tokio::test]
async fn test_scheduler_actor_feeds_dispatch() {
    let notifier = Arc::new(RecordingNotifier::default());
    let store = Arc::new(MemoryStore::default());
    let queue = memory_queue();
    let registry: Arc<dyn MonitorRegistry> = Arc::new(StaticRegistry::new(vec![
        monitor("a", "https://a.test/health"),
        monitor("b", "https://b.test/health"),
    ]));

    let task_handler = Arc::new(handler(
        Arc::new(FixedProbe(ProbeOutcome::connection_error(3))),
        store.clone(),
        notifier.clone(),
    ));
    // a single worker keeps the FIFO order of the queue
    let dispatch = DispatchHandle::spawn(queue.clone(), task_handler.clone(), 1);

    let config = SchedulerConfig {
        interval_secs: 3600,
        ..Default::default()
    };
    let scheduler = SchedulerHandle::spawn(registry, queue.clone(), &config);

    // the first tick fires on start; this adds a second fan-out
    let report = scheduler.tick_now().await.unwrap();
    assert_eq!(report.monitors, 2);
    assert_eq!(report.submitted, 2);

    let h = &task_handler;
    assert!(eventually(move || async move { h.stats().applied == 4 }).await);

    for id in ["a", "b"] {
        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.record.consecutive_failures, 2);
        assert_eq!(stored.record.state, HealthState::Degraded);
    }
    assert!(notifier.subjects().await.is_empty());

    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.ready, 0);
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.total_submitted, 4);

    scheduler.shutdown().await;
    dispatch.shutdown().await;
}

#[tokio::test]
async fn test_inactive_monitors_are_not_scheduled() {
    let mut paused = monitor("paused", "https://paused.test/health");
    paused.active = false;
    let registry = StaticRegistry::with_page_size(
        vec![monitor("live", "https://live.test/health"), paused],
        1,
    );
    let queue = memory_queue();

    let report = fan_out(&registry, queue.as_ref(), 10, 1).await.unwrap();

    assert_eq!(report.monitors, 1);
    assert_eq!(report.submitted, 1);

    let deliveries = queue.receive(10, Duration::ZERO).await.unwrap();
    assert_eq!(deliveries.len(), 1);
    assert!(deliveries[0].body.contains("\"live\""));
}

#[tokio::test]
async fn test_large_fan_out_is_batched() {
    let monitors = (0..23)
        .map(|i| monitor(&format!("m-{i}"), "https://fleet.test/health"))
        .collect();
    let registry = StaticRegistry::with_page_size(monitors, 7);
    let queue = memory_queue();

    let report = fan_out(&registry, queue.as_ref(), 10, 42).await.unwrap();

    assert_eq!(report.monitors, 23);
    assert_eq!(report.batches, 3);
    assert_eq!(report.submitted, 23);
    assert_eq!(report.failed, 0);
    assert_eq!(queue.stats().await.unwrap().ready, 23);
}
