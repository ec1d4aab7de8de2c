//! RetentionActor - Prunes check history older than the retention window

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

use crate::storage::HealthStore;

use super::messages::RetentionCommand;

/// How often history is pruned
pub const DEFAULT_RETENTION_INTERVAL: Duration = Duration::from_secs(60 * 60);

pub struct RetentionActor {
    store: Arc<dyn HealthStore>,
    retention: chrono::Duration,
    interval_duration: Duration,
    command_rx: mpsc::Receiver<RetentionCommand>,
}

impl RetentionActor {
    pub fn new(
        store: Arc<dyn HealthStore>,
        retention_days: u32,
        interval_duration: Duration,
        command_rx: mpsc::Receiver<RetentionCommand>,
    ) -> Self {
        Self {
            store,
            retention: chrono::Duration::days(i64::from(retention_days)),
            interval_duration,
            command_rx,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting retention actor");

        let mut ticker = interval(self.interval_duration);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.prune().await {
                        error!("history cleanup failed: {:#}", e);
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        RetentionCommand::RunNow { respond_to } => {
                            let _ = respond_to.send(self.prune().await);
                        }
                        RetentionCommand::Shutdown => break,
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("retention actor stopped");
    }

    async fn prune(&self) -> Result<usize> {
        let cutoff = Utc::now() - self.retention;
        let deleted = self.store.cleanup_history(cutoff).await?;
        if deleted > 0 {
            info!("pruned {deleted} history rows older than {cutoff}");
        }
        Ok(deleted)
    }
}

/// Handle for controlling a RetentionActor
#[derive(Clone)]
pub struct RetentionHandle {
    sender: mpsc::Sender<RetentionCommand>,
}

impl RetentionHandle {
    pub fn spawn(
        store: Arc<dyn HealthStore>,
        retention_days: u32,
        interval_duration: Duration,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let actor = RetentionActor::new(store, retention_days, interval_duration, cmd_rx);

        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Prune immediately; returns the number of deleted rows
    pub async fn run_now(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RetentionCommand::RunNow { respond_to: tx })
            .await?;

        rx.await?
    }

    pub async fn shutdown(self) {
        let _ = self.sender.send(RetentionCommand::Shutdown).await;
    }
}
