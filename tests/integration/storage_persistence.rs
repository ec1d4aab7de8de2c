//! Health state survives restarts and stays consistent across processes

use std::sync::Arc;
use std::time::Duration;

use pulseguard::{
    HealthState, ProbeOutcome,
    actors::{RetentionHandle, TaskOutcome, scheduler::latest_applied_cycle},
    queue::ProbeTask,
    storage::{HealthStore, StorageError, sqlite::SqliteStore},
};
use tempfile::tempdir;

use crate::helpers::*;

fn task(id: &str, cycle: i64) -> String {
    ProbeTask::new(cycle, monitor(id, "https://db.test/health"))
        .encode()
        .unwrap()
}

#[tokio::test]
async fn test_state_survives_restart() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("pulseguard.db");
    let notifier = Arc::new(RecordingNotifier::default());

    {
        let store: Arc<dyn HealthStore> = Arc::new(SqliteStore::new(&db_path).await.unwrap());
        let handler = handler(
            Arc::new(FixedProbe(ProbeOutcome::timeout(500))),
            store.clone(),
            notifier.clone(),
        );

        for cycle in 1..=2 {
            handler.handle(&task("persist", cycle)).await.unwrap();
        }
        store.close().await.unwrap();
    }

    // a fresh process picks up where the previous one stopped
    let store: Arc<dyn HealthStore> = Arc::new(SqliteStore::new(&db_path).await.unwrap());
    let stored = store.get("persist").await.unwrap().unwrap();
    assert_eq!(stored.record.consecutive_failures, 2);
    assert_eq!(stored.record.state, HealthState::Degraded);
    assert_eq!(stored.last_cycle, 2);
    assert_eq!(stored.version, 2);
    assert_eq!(latest_applied_cycle(store.as_ref()).await.unwrap(), 2);

    let handler = handler(
        Arc::new(FixedProbe(ProbeOutcome::timeout(500))),
        store.clone(),
        notifier.clone(),
    );

    // redelivery of a cycle applied before the restart
    assert_eq!(
        handler.handle(&task("persist", 2)).await.unwrap(),
        TaskOutcome::Skipped
    );

    handler.handle(&task("persist", 3)).await.unwrap();
    let stored = store.get("persist").await.unwrap().unwrap();
    assert_eq!(stored.record.state, HealthState::Unhealthy);
    assert_eq!(notifier.subjects().await.len(), 1);

    let history = store.query_history("persist", 10).await.unwrap();
    assert_eq!(
        history.iter().map(|row| row.cycle).collect::<Vec<_>>(),
        vec![3, 2, 1]
    );
}

#[tokio::test]
async fn test_two_processes_share_one_database() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("shared.db");

    let store_a: Arc<dyn HealthStore> = Arc::new(SqliteStore::new(&db_path).await.unwrap());
    let store_b: Arc<dyn HealthStore> = Arc::new(SqliteStore::new(&db_path).await.unwrap());
    let notifier = Arc::new(RecordingNotifier::default());

    let slow = || {
        Arc::new(SlowProbe {
            outcome: ProbeOutcome::connection_error(10),
            delay: Duration::from_millis(30),
        })
    };
    let a = handler(slow(), store_a, notifier.clone());
    let b = handler(slow(), store_b.clone(), notifier.clone());

    let mut m = monitor("race", "https://db.test/health");
    m.threshold_count = 1;
    let body = ProbeTask::new(9, m).encode().unwrap();

    let (ra, rb) = tokio::join!(a.handle(&body), b.handle(&body));

    let mut applied = 0;
    for result in [ra, rb] {
        match result {
            Ok(TaskOutcome::Applied { .. }) => applied += 1,
            Ok(TaskOutcome::Skipped) => {}
            Err(pulseguard::actors::TaskError::Storage(StorageError::VersionConflict {
                ..
            })) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    assert_eq!(applied, 1);
    let stored = store_b.get("race").await.unwrap().unwrap();
    assert_eq!(stored.version, 1);
    assert_eq!(stored.record.consecutive_failures, 1);
    assert_eq!(notifier.subjects().await.len(), 1);
}

#[tokio::test]
async fn test_retention_prunes_old_history() {
    let dir = tempdir().unwrap();
    let store: Arc<dyn HealthStore> =
        Arc::new(SqliteStore::new(dir.path().join("retention.db")).await.unwrap());
    let handler = handler(
        Arc::new(FixedProbe(ProbeOutcome::healthy(200, 4))),
        store.clone(),
        Arc::new(RecordingNotifier::default()),
    );

    handler.handle(&task("fresh", 1)).await.unwrap();

    let retention = RetentionHandle::spawn(store.clone(), 30, Duration::from_secs(3600));

    // nothing is older than 30 days yet
    assert_eq!(retention.run_now().await.unwrap(), 0);
    assert_eq!(store.query_history("fresh", 10).await.unwrap().len(), 1);

    retention.shutdown().await;
}
