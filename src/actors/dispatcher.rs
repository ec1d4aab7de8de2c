//! Dispatch loop - Applies delivered probe tasks
//!
//! ## Message Flow
//!
//! ```text
//! TaskQueue → decode → probe → [lock monitor → read → step → conditional write → history] → alert → ack
//!                │                   │                                │
//!                └─ malformed:       └─ already applied cycle:        └─ storage failure / conflict:
//!                   dead-letter         ack, no change                    nack for redelivery
//! ```
//!
//! The probe runs outside the per-monitor lock; only the read-modify-write
//! of the stored record is serialized. Alerts are published after the lock
//! is released and never fail the task.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::alerts::{AlertManager, AlertMessage};
use crate::monitors::{Probe, step};
use crate::queue::{Delivery, MalformedTask, ProbeTask, QueueError, TaskQueue};
use crate::storage::{CheckHistoryRow, HealthStore, StorageError, StorageResult};

use super::locks::KeyedLocks;
use super::messages::{DispatchStats, TaskOutcome};

/// How long one receive call waits for work
const RECEIVE_WAIT: Duration = Duration::from_secs(1);

/// Pause after the queue itself failed
const QUEUE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Why a delivery could not be applied
#[derive(Debug)]
pub enum TaskError {
    /// Body is not a valid task; retrying cannot help
    Malformed(MalformedTask),

    /// Store failed, timed out or lost a conditional write
    Storage(StorageError),

    /// Acknowledgement could not be delivered to the queue
    Queue(QueueError),
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskError::Malformed(e) => write!(f, "malformed task: {e}"),
            TaskError::Storage(e) => write!(f, "storage failure: {e}"),
            TaskError::Queue(e) => write!(f, "queue failure: {e}"),
        }
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TaskError::Malformed(e) => Some(e),
            TaskError::Storage(e) => Some(e),
            TaskError::Queue(e) => Some(e),
        }
    }
}

impl From<QueueError> for TaskError {
    fn from(err: QueueError) -> Self {
        TaskError::Queue(err)
    }
}

#[derive(Debug, Default)]
struct DispatchCounters {
    received: AtomicU64,
    applied: AtomicU64,
    skipped: AtomicU64,
    dead_lettered: AtomicU64,
    retried: AtomicU64,
    alerts_sent: AtomicU64,
    alerts_failed: AtomicU64,
}

impl DispatchCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            received: self.received.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            alerts_sent: self.alerts_sent.load(Ordering::Relaxed),
            alerts_failed: self.alerts_failed.load(Ordering::Relaxed),
        }
    }
}

/// Applies probe tasks to the health store
///
/// Shared by every dispatch worker. It is the only code path that writes
/// health records, and it always does so while holding the monitor's lock.
pub struct TaskHandler {
    prober: Arc<dyn Probe>,
    store: Arc<dyn HealthStore>,
    alerts: AlertManager,
    locks: KeyedLocks,
    store_timeout: Duration,
    counters: DispatchCounters,
}

impl TaskHandler {
    pub fn new(
        prober: Arc<dyn Probe>,
        store: Arc<dyn HealthStore>,
        alerts: AlertManager,
        store_timeout: Duration,
    ) -> Self {
        Self {
            prober,
            store,
            alerts,
            locks: KeyedLocks::new(),
            store_timeout,
            counters: DispatchCounters::default(),
        }
    }

    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = StorageResult<T>>,
    ) -> Result<T, TaskError> {
        match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(result) => result.map_err(TaskError::Storage),
            Err(_) => Err(TaskError::Storage(StorageError::Timeout(
                operation.to_string(),
            ))),
        }
    }

    /// Apply one task body without touching the queue
    pub async fn handle(&self, body: &str) -> Result<TaskOutcome, TaskError> {
        let task = ProbeTask::decode(body).map_err(TaskError::Malformed)?;
        self.apply(task).await
    }

    #[instrument(skip(self, task), fields(monitor_id = %task.monitor.id, cycle = task.cycle))]
    async fn apply(&self, task: ProbeTask) -> Result<TaskOutcome, TaskError> {
        let monitor = &task.monitor;
        let outcome = self.prober.probe(monitor).await;
        trace!("probe outcome: {outcome:?}");

        let transition = {
            let _guard = self.locks.lock(&monitor.id).await;

            let stored = self.bounded("get", self.store.get(&monitor.id)).await?;

            if stored.is_some_and(|s| s.last_cycle >= task.cycle) {
                debug!("cycle already applied, skipping duplicate delivery");
                return Ok(TaskOutcome::Skipped);
            }

            let previous = stored.map(|s| s.record).unwrap_or_default();
            let transition = step(&previous, &outcome, monitor.threshold_count, Utc::now());

            self.bounded(
                "put",
                self.store.put(
                    &monitor.id,
                    &transition.next,
                    task.cycle,
                    stored.map(|s| s.version),
                ),
            )
            .await?;

            let row = CheckHistoryRow::new(&monitor.id, task.cycle, &transition.next, &outcome);
            if let Err(e) = self
                .bounded("append_history", self.store.append_history(row))
                .await
            {
                warn!("failed to record check history: {e}");
            }

            transition
        };

        if transition.previous.state != transition.next.state {
            info!(
                "{} → {} ({} consecutive failures)",
                transition.previous.state,
                transition.next.state,
                transition.next.consecutive_failures
            );
        }

        let mut notified = false;
        if let Some(alert) = AlertMessage::from_transition(monitor, &transition, &outcome) {
            match self.alerts.send(monitor, &alert).await {
                Ok(()) => {
                    DispatchCounters::bump(&self.counters.alerts_sent);
                    notified = true;
                }
                Err(e) => {
                    DispatchCounters::bump(&self.counters.alerts_failed);
                    error!("alert for monitor {} was not delivered: {e}", monitor.id);
                }
            }
        }

        Ok(TaskOutcome::Applied {
            state: transition.next.state,
            consecutive_failures: transition.next.consecutive_failures,
            alert: transition.alert,
            notified,
        })
    }

    /// Apply one delivery and settle it with the queue
    ///
    /// - applied or skipped: ack
    /// - malformed: dead-letter
    /// - storage failure: nack, the delivery comes back with fresh state
    #[instrument(skip(self, queue, delivery), fields(message_id = %delivery.message_id, receive_count = delivery.receive_count))]
    pub async fn process(
        &self,
        queue: &dyn TaskQueue,
        delivery: Delivery,
    ) -> Result<TaskOutcome, TaskError> {
        DispatchCounters::bump(&self.counters.received);

        match self.handle(&delivery.body).await {
            Ok(outcome) => {
                queue.ack(&delivery.receipt).await?;
                match outcome {
                    TaskOutcome::Skipped => DispatchCounters::bump(&self.counters.skipped),
                    _ => DispatchCounters::bump(&self.counters.applied),
                }
                Ok(outcome)
            }
            Err(TaskError::Malformed(e)) => {
                warn!("dead-lettering malformed task: {e}");
                queue.dead_letter(&delivery.receipt, &e.to_string()).await?;
                DispatchCounters::bump(&self.counters.dead_lettered);
                Ok(TaskOutcome::DeadLettered)
            }
            Err(e) => {
                match &e {
                    TaskError::Storage(err) if !err.is_transient() => {
                        error!("task failed on a stored record that cannot be read: {e}");
                    }
                    _ => warn!("task failed, leaving it for redelivery: {e}"),
                }
                DispatchCounters::bump(&self.counters.retried);
                if let Err(nack_err) = queue.nack(&delivery.receipt).await {
                    // the visibility timeout will still bring it back
                    warn!("failed to nack delivery: {nack_err}");
                }
                Err(e)
            }
        }
    }
}

async fn run_worker(
    worker: usize,
    queue: Arc<dyn TaskQueue>,
    handler: Arc<TaskHandler>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    debug!("dispatch worker {worker} started");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let deliveries = tokio::select! {
            _ = shutdown_rx.changed() => break,
            result = queue.receive(1, RECEIVE_WAIT) => result,
        };

        match deliveries {
            Ok(deliveries) => {
                for delivery in deliveries {
                    if let Err(e) = handler.process(queue.as_ref(), delivery).await {
                        debug!("worker {worker}: {e}");
                    }
                }
            }
            Err(e) => {
                error!("worker {worker} failed to receive from queue: {e}");
                tokio::time::sleep(QUEUE_ERROR_BACKOFF).await;
            }
        }
    }

    debug!("dispatch worker {worker} stopped");
}

/// Handle for the dispatch worker pool
pub struct DispatchHandle {
    handler: Arc<TaskHandler>,
    shutdown_tx: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl DispatchHandle {
    /// Spawn `workers` tasks pulling from `queue`
    pub fn spawn(queue: Arc<dyn TaskQueue>, handler: Arc<TaskHandler>, workers: usize) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let workers = (0..workers.max(1))
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    queue.clone(),
                    handler.clone(),
                    shutdown_rx.clone(),
                ))
            })
            .collect();

        Self {
            handler,
            shutdown_tx,
            workers,
        }
    }

    pub fn stats(&self) -> DispatchStats {
        self.handler.stats()
    }

    pub fn handler(&self) -> Arc<TaskHandler> {
        self.handler.clone()
    }

    /// Stop receiving and wait for in-flight tasks to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);

        for result in futures::future::join_all(self.workers).await {
            if let Err(e) = result {
                error!("dispatch worker panicked: {e}");
            }
        }

        info!("dispatch stopped");
    }
}
