//! Duplicate and concurrent deliveries
//!
//! The queue is at-least-once, so the same cycle for the same monitor can
//! be processed by several workers at once. It must advance the counter
//! once and alert at most once.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use futures::future::join_all;
use pulseguard::{
    HealthState, ProbeOutcome,
    actors::{TaskError, TaskOutcome},
    monitors::AlertDecision,
    queue::ProbeTask,
    storage::{HealthStore, MemoryStore, StorageError},
};

use crate::helpers::*;

fn slow_failure() -> Arc<SlowProbe> {
    Arc::new(SlowProbe {
        outcome: ProbeOutcome::unexpected_status(500, 50),
        delay: Duration::from_millis(50),
    })
}

fn body(id: &str, threshold: u32, cycle: i64) -> String {
    let mut m = monitor(id, "https://dup.test/health");
    m.threshold_count = threshold;
    ProbeTask::new(cycle, m).encode().unwrap()
}

#[tokio::test]
async fn test_duplicate_delivery_applies_once() {
    let store = Arc::new(MemoryStore::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let handler = handler(slow_failure(), store.clone(), notifier.clone());

    // threshold 1: the single failure crosses the boundary
    let task = body("dup", 1, 100);
    let (first, second) = tokio::join!(handler.handle(&task), handler.handle(&task));

    let outcomes = [first.unwrap(), second.unwrap()];
    let applied = outcomes
        .iter()
        .filter(|o| matches!(o, TaskOutcome::Applied { .. }))
        .count();
    assert_eq!(applied, 1);
    assert!(outcomes.contains(&TaskOutcome::Skipped));

    let stored = store.get("dup").await.unwrap().unwrap();
    assert_eq!(stored.record.consecutive_failures, 1);
    assert_eq!(stored.record.state, HealthState::Unhealthy);
    assert_eq!(stored.version, 1);
    assert_eq!(notifier.subjects().await.len(), 1);
}

#[tokio::test]
async fn test_many_duplicates_alert_at_most_once() {
    let store = Arc::new(MemoryStore::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let handler = Arc::new(handler(slow_failure(), store.clone(), notifier.clone()));

    let task = body("storm", 1, 7);
    let results = join_all((0..10).map(|_| {
        let handler = handler.clone();
        let task = task.clone();
        tokio::spawn(async move { handler.handle(&task).await })
    }))
    .await;

    let applied = results
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .filter(|o| matches!(o, TaskOutcome::Applied { .. }))
        .count();

    assert_eq!(applied, 1);
    assert_eq!(notifier.subjects().await.len(), 1);
    assert_eq!(
        store.get("storm").await.unwrap().unwrap().record.consecutive_failures,
        1
    );
}

#[tokio::test]
async fn test_stale_cycle_is_skipped() {
    let store = Arc::new(MemoryStore::default());
    let handler = handler(
        Arc::new(FixedProbe(ProbeOutcome::timeout(500))),
        store.clone(),
        Arc::new(RecordingNotifier::default()),
    );

    assert_matches!(
        handler.handle(&body("late", 3, 200)).await,
        Ok(TaskOutcome::Applied { consecutive_failures: 1, .. })
    );
    // an older cycle arriving late must not count again
    assert_matches!(handler.handle(&body("late", 3, 100)).await, Ok(TaskOutcome::Skipped));
    assert_matches!(handler.handle(&body("late", 3, 200)).await, Ok(TaskOutcome::Skipped));

    let stored = store.get("late").await.unwrap().unwrap();
    assert_eq!(stored.record.consecutive_failures, 1);
    assert_eq!(stored.last_cycle, 200);
}

#[tokio::test]
async fn test_distinct_monitors_proceed_in_parallel() {
    let store = Arc::new(MemoryStore::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let handler = Arc::new(handler(slow_failure(), store.clone(), notifier.clone()));

    let started = tokio::time::Instant::now();
    let results = join_all((0..20).map(|i| {
        let handler = handler.clone();
        let task = body(&format!("m-{i}"), 3, 1);
        tokio::spawn(async move { handler.handle(&task).await })
    }))
    .await;

    for joined in results {
        assert_matches!(
            joined.unwrap(),
            Ok(TaskOutcome::Applied {
                state: HealthState::Degraded,
                alert: AlertDecision::NoAlert,
                ..
            })
        );
    }

    // probes overlap instead of queueing behind one lock
    assert!(started.elapsed() < Duration::from_millis(50 * 20));
    assert_eq!(store.list_records().await.unwrap().len(), 20);
    assert!(notifier.subjects().await.is_empty());
}

#[tokio::test]
async fn test_independent_handlers_sharing_a_store() {
    // two hub processes: separate lock tables, one store
    let store = Arc::new(MemoryStore::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let a = handler(slow_failure(), store.clone(), notifier.clone());
    let b = handler(slow_failure(), store.clone(), notifier.clone());

    let task = body("shared", 1, 5);
    let (ra, rb) = tokio::join!(a.handle(&task), b.handle(&task));

    let mut applied = 0;
    for result in [ra, rb] {
        match result {
            Ok(TaskOutcome::Applied { .. }) => applied += 1,
            Ok(TaskOutcome::Skipped) => {}
            Err(TaskError::Storage(StorageError::VersionConflict { .. })) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    assert_eq!(applied, 1);
    let stored = store.get("shared").await.unwrap().unwrap();
    assert_eq!(stored.record.consecutive_failures, 1);
    assert_eq!(stored.version, 1);
    assert_eq!(notifier.subjects().await.len(), 1);
}
