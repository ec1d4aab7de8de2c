use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, instrument, warn};

use crate::config::{NotifierConfig, NotifierKind, Webhook};
use crate::discord::DiscordNotifier;
use crate::monitors::{AlertDecision, Transition};
use crate::util::calculate_backoff;
use crate::{FailureReason, HealthState, MonitorDefinition, ProbeOutcome};

/// Longest pause between two publish attempts
const MAX_BACKOFF_MS: u64 = 10_000;

/// Bound on one publish attempt unless configured otherwise
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Why an alert could not be published
#[derive(Debug)]
pub enum NotifyError {
    /// Request never got a response
    Transport(String),

    /// Endpoint answered with a non-success status
    Rejected { status: u16, body: String },

    /// Attempt did not finish in time
    Timeout(Duration),
}

impl std::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifyError::Transport(msg) => write!(f, "failed to reach notification endpoint: {msg}"),
            NotifyError::Rejected { status, body } => {
                write!(f, "notification rejected with status {status}: {body}")
            }
            NotifyError::Timeout(limit) => {
                write!(f, "notification timed out after {}ms", limit.as_millis())
            }
        }
    }
}

impl std::error::Error for NotifyError {}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        NotifyError::Transport(err.to_string())
    }
}

/// Which boundary an alert reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Unhealthy,
    Recovery,
}

/// Rendered alert for one boundary crossing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertMessage {
    pub kind: AlertKind,
    pub monitor_id: String,
    pub monitor_name: String,
    pub endpoint: String,
    pub previous_state: HealthState,
    pub state: HealthState,
    pub consecutive_failures: u32,
    pub threshold: u32,
    pub status_code: u16,
    pub failure_reason: FailureReason,
    pub timestamp: DateTime<Utc>,
    pub subject: String,
    pub body: String,
}

impl AlertMessage {
    /// Render the alert for a transition, `None` if it does not alert
    pub fn from_transition(
        monitor: &MonitorDefinition,
        transition: &Transition,
        outcome: &ProbeOutcome,
    ) -> Option<Self> {
        let kind = match transition.alert {
            AlertDecision::NoAlert => return None,
            AlertDecision::UnhealthyAlert => AlertKind::Unhealthy,
            AlertDecision::RecoveryAlert => AlertKind::Recovery,
        };

        let previous_state = transition.previous.state;
        let state = transition.next.state;
        let consecutive_failures = transition.next.consecutive_failures;
        let threshold = monitor.threshold_count.max(1);
        let timestamp = transition.next.last_checked_at;

        let (subject, body) = match kind {
            AlertKind::Unhealthy => {
                let last_result = match outcome.failure_reason {
                    FailureReason::UnexpectedStatus => format!(
                        "unexpected status {} (expected {})",
                        outcome.status_code, monitor.expected_status
                    ),
                    reason => reason.to_string(),
                };
                (
                    format!("🔴 Alert: {} is {}", monitor.name, state),
                    format!(
                        "Monitor: {}\nEndpoint: {}\nStatus: {} → {}\nConsecutive Failures: {}\nLast Result: {}\nTime: {}\n\nThe monitor has exceeded the failure threshold of {}.",
                        monitor.name,
                        monitor.endpoint,
                        previous_state,
                        state,
                        consecutive_failures,
                        last_result,
                        timestamp.to_rfc3339(),
                        threshold
                    ),
                )
            }
            AlertKind::Recovery => (
                format!("✅ Recovered: {} is {}", monitor.name, state),
                format!(
                    "Monitor: {}\nEndpoint: {}\nStatus: {} → {}\nConsecutive Failures: 0\nTime: {}\n\nThe failure count has returned to zero.",
                    monitor.name,
                    monitor.endpoint,
                    previous_state,
                    state,
                    timestamp.to_rfc3339()
                ),
            ),
        };

        Some(Self {
            kind,
            monitor_id: monitor.id.clone(),
            monitor_name: monitor.name.clone(),
            endpoint: monitor.endpoint.clone(),
            previous_state,
            state,
            consecutive_failures,
            threshold,
            status_code: outcome.status_code,
            failure_reason: outcome.failure_reason,
            timestamp,
            subject,
            body,
        })
    }
}

/// Delivery channel for alerts
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a plain subject/body notification to `destination`
    async fn publish(&self, destination: &str, subject: &str, body: &str)
    -> Result<(), NotifyError>;

    /// Deliver a rendered alert; channels with richer formatting override this
    async fn publish_alert(
        &self,
        destination: &str,
        alert: &AlertMessage,
    ) -> Result<(), NotifyError> {
        self.publish(destination, &alert.subject, &alert.body).await
    }
}

/// Writes alerts to the log
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn publish(
        &self,
        destination: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), NotifyError> {
        warn!(destination, "{subject}\n{body}");
        Ok(())
    }
}

/// Posts alerts as JSON to a webhook
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    webhook: Webhook,
}

impl WebhookNotifier {
    pub fn new(client: Client, webhook: Webhook) -> Self {
        Self { client, webhook }
    }

    async fn send(&self, payload: serde_json::Value) -> Result<(), NotifyError> {
        let response = self.client.post(&self.webhook.url).json(&payload).send().await?;

        if response.status().is_success() {
            info!("Successfully sent webhook alert");
            Ok(())
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(NotifyError::Rejected { status, body })
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    #[instrument(skip(self, body))]
    async fn publish(
        &self,
        destination: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), NotifyError> {
        self.send(json!({
            "destination": destination,
            "subject": subject,
            "message": body,
            "timestamp": Utc::now().to_rfc3339()
        }))
        .await
    }

    #[instrument(skip(self, alert), fields(monitor_id = %alert.monitor_id))]
    async fn publish_alert(
        &self,
        destination: &str,
        alert: &AlertMessage,
    ) -> Result<(), NotifyError> {
        self.send(json!({
            "destination": destination,
            "subject": alert.subject,
            "message": alert.body,
            "alert": alert,
            "timestamp": Utc::now().to_rfc3339()
        }))
        .await
    }
}

/// Publishes alerts with bounded retry
#[derive(Clone)]
pub struct AlertManager {
    notifier: Arc<dyn Notifier>,
    max_attempts: u32,
    backoff_ms: u64,
    attempt_timeout: Duration,
}

impl AlertManager {
    pub fn new(notifier: Arc<dyn Notifier>, max_attempts: u32, backoff: Duration) -> Self {
        Self {
            notifier,
            max_attempts: max_attempts.max(1),
            backoff_ms: backoff.as_millis() as u64,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Build the configured notifier around a shared HTTP client
    pub fn from_config(config: &NotifierConfig, client: Client) -> Self {
        let notifier: Arc<dyn Notifier> = match &config.kind {
            NotifierKind::Log => Arc::new(LogNotifier),
            NotifierKind::Webhook(webhook) => {
                Arc::new(WebhookNotifier::new(client, webhook.clone()))
            }
            NotifierKind::Discord(discord) => {
                Arc::new(DiscordNotifier::new(client, discord.clone()))
            }
        };

        Self::new(
            notifier,
            config.max_attempts,
            Duration::from_millis(config.backoff_ms),
        )
        .with_attempt_timeout(config.timeout())
    }

    /// Publish `alert` to the monitor's alert target
    ///
    /// Retries with exponential backoff; the last error is returned once
    /// every attempt failed. Each attempt is cut off after the attempt
    /// timeout, so a hung endpoint costs at most `max_attempts` timeouts.
    #[instrument(skip(self, monitor, alert), fields(monitor_id = %monitor.id, kind = ?alert.kind))]
    pub async fn send(
        &self,
        monitor: &MonitorDefinition,
        alert: &AlertMessage,
    ) -> Result<(), NotifyError> {
        let mut attempt = 0;

        loop {
            tokio::time::sleep(calculate_backoff(attempt, self.backoff_ms, MAX_BACKOFF_MS)).await;
            attempt += 1;

            let publish = self.notifier.publish_alert(&monitor.alert_target, alert);
            let result = tokio::time::timeout(self.attempt_timeout, publish)
                .await
                .unwrap_or(Err(NotifyError::Timeout(self.attempt_timeout)));

            match result {
                Ok(()) => {
                    info!("alert published after {attempt} attempt(s)");
                    return Ok(());
                }
                Err(e) if attempt < self.max_attempts => {
                    warn!("alert attempt {attempt}/{} failed: {e}", self.max_attempts);
                }
                Err(e) => {
                    error!("giving up on alert after {attempt} attempts: {e}");
                    return Err(e);
                }
            }
        }
    }
}
