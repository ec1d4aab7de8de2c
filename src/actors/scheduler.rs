//! SchedulerActor - Fans out one probe task per active monitor per tick
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → list active monitors → stamp cycle → chunk into batches → TaskQueue
//!     ↑
//!     └─── Commands (TickNow, Shutdown)
//! ```
//!
//! The scheduler never probes anything itself; it only enqueues work. A
//! failed batch is logged and counted and does not stop the remaining
//! batches of the same fan-out.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, instrument, warn};

use crate::config::SchedulerConfig;
use crate::queue::{BatchEntry, MAX_BATCH_SIZE, ProbeTask, TaskQueue};
use crate::registry::MonitorRegistry;
use crate::storage::{HealthStore, StorageResult};

use super::messages::{FanOutReport, SchedulerCommand};

/// Enqueue one task per active monitor, stamped with `cycle`
#[instrument(skip(registry, queue))]
pub async fn fan_out(
    registry: &dyn MonitorRegistry,
    queue: &dyn TaskQueue,
    batch_size: usize,
    cycle: i64,
) -> Result<FanOutReport> {
    let batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
    let monitors = registry
        .list_active()
        .await
        .context("failed to list active monitors")?;

    let mut report = FanOutReport {
        cycle,
        monitors: monitors.len(),
        ..Default::default()
    };

    if monitors.is_empty() {
        debug!("no active monitors, nothing to fan out");
        return Ok(report);
    }

    let mut bodies = Vec::with_capacity(monitors.len());
    for monitor in monitors {
        let id = monitor.id.clone();
        match ProbeTask::new(cycle, monitor).encode() {
            Ok(body) => bodies.push((id, body)),
            Err(e) => {
                error!("failed to encode task for monitor {id}: {e}");
                report.failed += 1;
            }
        }
    }

    for chunk in bodies.chunks(batch_size) {
        report.batches += 1;

        let entries = chunk
            .iter()
            .enumerate()
            .map(|(i, (_, body))| BatchEntry {
                id: i.to_string(),
                body: body.clone(),
            })
            .collect();

        match queue.submit_batch(entries).await {
            Ok(outcome) => {
                report.submitted += outcome.successful.len();
                report.failed += outcome.failed.len();

                for failure in outcome.failed {
                    let monitor_id = failure
                        .id
                        .parse::<usize>()
                        .ok()
                        .and_then(|i| chunk.get(i))
                        .map_or("<unknown>", |(id, _)| id.as_str());
                    warn!("failed to enqueue monitor {monitor_id}: {}", failure.reason);
                }
            }
            Err(e) => {
                error!("batch of {} tasks rejected: {e}", chunk.len());
                report.failed += chunk.len();
            }
        }
    }

    info!(
        "fan-out {}: {} monitors, {} submitted, {} failed in {} batches",
        report.cycle, report.monitors, report.submitted, report.failed, report.batches
    );

    Ok(report)
}

/// Actor that periodically fans out probe tasks
pub struct SchedulerActor {
    registry: Arc<dyn MonitorRegistry>,
    queue: Arc<dyn TaskQueue>,
    command_rx: mpsc::Receiver<SchedulerCommand>,
    interval_duration: Duration,
    batch_size: usize,

    /// Cycle stamp of the previous fan-out
    last_cycle: i64,
}

/// Highest cycle any monitor has already applied, 0 for an empty store
pub async fn latest_applied_cycle(store: &dyn HealthStore) -> StorageResult<i64> {
    Ok(store
        .list_records()
        .await?
        .values()
        .map(|stored| stored.last_cycle)
        .max()
        .unwrap_or(0))
}

impl SchedulerActor {
    pub fn new(
        registry: Arc<dyn MonitorRegistry>,
        queue: Arc<dyn TaskQueue>,
        config: &SchedulerConfig,
        command_rx: mpsc::Receiver<SchedulerCommand>,
        last_cycle: i64,
    ) -> Self {
        Self {
            registry,
            queue,
            command_rx,
            interval_duration: config.interval(),
            batch_size: config.batch_size(),
            last_cycle,
        }
    }

    /// Run the actor's main loop
    ///
    /// The first tick fires immediately. Runs until a Shutdown command is
    /// received or every handle is dropped.
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting scheduler actor");

        let mut ticker = interval(self.interval_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("fan-out failed: {:#}", e);
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        SchedulerCommand::TickNow { respond_to } => {
                            debug!("received TickNow command");
                            let result = self.tick().await;
                            let _ = respond_to.send(result);
                        }

                        SchedulerCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("scheduler actor stopped");
    }

    /// Next cycle stamp: wall-clock millis, forced to increase
    fn next_cycle(&mut self) -> i64 {
        let cycle = Utc::now().timestamp_millis().max(self.last_cycle + 1);
        self.last_cycle = cycle;
        cycle
    }

    async fn tick(&mut self) -> Result<FanOutReport> {
        let cycle = self.next_cycle();
        fan_out(
            self.registry.as_ref(),
            self.queue.as_ref(),
            self.batch_size,
            cycle,
        )
        .await
    }
}

/// Handle for controlling a SchedulerActor
#[derive(Clone)]
pub struct SchedulerHandle {
    sender: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    /// Spawn a new scheduler actor
    pub fn spawn(
        registry: Arc<dyn MonitorRegistry>,
        queue: Arc<dyn TaskQueue>,
        config: &SchedulerConfig,
    ) -> Self {
        Self::spawn_after(registry, queue, config, 0)
    }

    /// Spawn a scheduler whose cycles all come after `last_cycle`
    pub fn spawn_after(
        registry: Arc<dyn MonitorRegistry>,
        queue: Arc<dyn TaskQueue>,
        config: &SchedulerConfig,
        last_cycle: i64,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let actor = SchedulerActor::new(registry, queue, config, cmd_rx, last_cycle);

        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Trigger an immediate fan-out
    pub async fn tick_now(&self) -> Result<FanOutReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::TickNow { respond_to: tx })
            .await?;

        rx.await?
    }

    /// Stop the scheduler
    pub async fn shutdown(self) {
        let _ = self.sender.send(SchedulerCommand::Shutdown).await;
    }
}
