pub mod actors;
pub mod alerts;
#[cfg(feature = "api")]
pub mod api;
pub mod config;
pub mod discord;
pub mod monitors;
pub mod queue;
pub mod registry;
pub mod storage;
pub mod util;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// HTTP verb used when probing a monitor's endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Head,
    Patch,
}

impl HttpMethod {
    pub fn as_reqwest(&self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Patch => reqwest::Method::PATCH,
        }
    }
}

/// A configured endpoint to be periodically health-checked
///
/// Owned by the registry. The pipeline only ever reads it; every probe task
/// carries a full copy so workers never have to call back into the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorDefinition {
    #[serde(alias = "monitorId")]
    pub id: String,

    pub name: String,

    pub endpoint: String,

    #[serde(default)]
    pub method: HttpMethod,

    #[serde(default = "default_expected_status")]
    pub expected_status: u16,

    #[serde(default = "default_timeout_ms", alias = "timeout")]
    pub timeout_ms: u64,

    /// Informational; cadence is owned by the scheduler
    #[serde(default = "default_check_interval", alias = "checkInterval")]
    pub check_interval_seconds: u64,

    #[serde(default = "default_threshold_count")]
    pub threshold_count: u32,

    #[serde(alias = "alertEmail")]
    pub alert_target: String,

    #[serde(default = "default_active", alias = "isActive")]
    pub active: bool,
}

fn default_expected_status() -> u16 {
    200
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_check_interval() -> u64 {
    60
}

fn default_threshold_count() -> u32 {
    3
}

fn default_active() -> bool {
    true
}

/// Reasons a monitor definition cannot be probed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidMonitor {
    MissingField(&'static str),
    InvalidEndpoint(String),
    ZeroTimeout,
    ZeroInterval,
    ZeroThreshold,
    InvalidExpectedStatus(u16),
}

impl fmt::Display for InvalidMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidMonitor::MissingField(field) => write!(f, "missing required field `{field}`"),
            InvalidMonitor::InvalidEndpoint(msg) => write!(f, "invalid endpoint: {msg}"),
            InvalidMonitor::ZeroTimeout => write!(f, "timeoutMs must be greater than 0"),
            InvalidMonitor::ZeroInterval => {
                write!(f, "checkIntervalSeconds must be greater than 0")
            }
            InvalidMonitor::ZeroThreshold => write!(f, "thresholdCount must be at least 1"),
            InvalidMonitor::InvalidExpectedStatus(code) => {
                write!(f, "expectedStatus {code} is not a valid HTTP status")
            }
        }
    }
}

impl std::error::Error for InvalidMonitor {}

impl MonitorDefinition {
    /// Check that every field the pipeline relies on is usable
    pub fn validate(&self) -> Result<(), InvalidMonitor> {
        if self.id.trim().is_empty() {
            return Err(InvalidMonitor::MissingField("id"));
        }
        if self.name.trim().is_empty() {
            return Err(InvalidMonitor::MissingField("name"));
        }
        if self.endpoint.trim().is_empty() {
            return Err(InvalidMonitor::MissingField("endpoint"));
        }
        if self.alert_target.trim().is_empty() {
            return Err(InvalidMonitor::MissingField("alertTarget"));
        }

        let url = url::Url::parse(&self.endpoint)
            .map_err(|e| InvalidMonitor::InvalidEndpoint(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(InvalidMonitor::InvalidEndpoint(format!(
                "unsupported scheme `{}`",
                url.scheme()
            )));
        }

        if self.timeout_ms == 0 {
            return Err(InvalidMonitor::ZeroTimeout);
        }
        if self.check_interval_seconds == 0 {
            return Err(InvalidMonitor::ZeroInterval);
        }
        if self.threshold_count == 0 {
            return Err(InvalidMonitor::ZeroThreshold);
        }
        if !(100..=599).contains(&self.expected_status) {
            return Err(InvalidMonitor::InvalidExpectedStatus(self.expected_status));
        }

        Ok(())
    }
}

/// Why a probe did not count as healthy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    #[default]
    None,
    Timeout,
    ConnectionError,
    UnexpectedStatus,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::None => "none",
            FailureReason::Timeout => "timeout",
            FailureReason::ConnectionError => "connection-error",
            FailureReason::UnexpectedStatus => "unexpected-status",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FailureReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(FailureReason::None),
            "timeout" => Ok(FailureReason::Timeout),
            "connection-error" => Ok(FailureReason::ConnectionError),
            "unexpected-status" => Ok(FailureReason::UnexpectedStatus),
            other => Err(format!("unknown failure reason `{other}`")),
        }
    }
}

/// Result of a single probe, consumed immediately by the state engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub success: bool,

    /// 0 when the request never produced an HTTP response
    pub status_code: u16,

    pub latency_ms: u64,

    pub failure_reason: FailureReason,
}

impl ProbeOutcome {
    pub fn healthy(status_code: u16, latency_ms: u64) -> Self {
        Self {
            success: true,
            status_code,
            latency_ms,
            failure_reason: FailureReason::None,
        }
    }

    pub fn unexpected_status(status_code: u16, latency_ms: u64) -> Self {
        Self {
            success: false,
            status_code,
            latency_ms,
            failure_reason: FailureReason::UnexpectedStatus,
        }
    }

    pub fn timeout(latency_ms: u64) -> Self {
        Self {
            success: false,
            status_code: 0,
            latency_ms,
            failure_reason: FailureReason::Timeout,
        }
    }

    pub fn connection_error(latency_ms: u64) -> Self {
        Self {
            success: false,
            status_code: 0,
            latency_ms,
            failure_reason: FailureReason::ConnectionError,
        }
    }
}

/// Coarse health of a monitor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthState {
    #[default]
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthState {
    /// Derive the state from a failure counter
    ///
    /// `consecutive_failures` is expected to already be clamped to `threshold`.
    pub fn from_counter(consecutive_failures: u32, threshold: u32) -> Self {
        if consecutive_failures == 0 {
            HealthState::Healthy
        } else if consecutive_failures >= threshold {
            HealthState::Unhealthy
        } else {
            HealthState::Degraded
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Healthy => "HEALTHY",
            HealthState::Degraded => "DEGRADED",
            HealthState::Unhealthy => "UNHEALTHY",
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HealthState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HEALTHY" => Ok(HealthState::Healthy),
            "DEGRADED" => Ok(HealthState::Degraded),
            "UNHEALTHY" => Ok(HealthState::Unhealthy),
            other => Err(format!("unknown health state `{other}`")),
        }
    }
}

/// Latest health of one monitor, keyed by monitor id in the state store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorHealthRecord {
    pub consecutive_failures: u32,
    pub state: HealthState,
    pub last_checked_at: DateTime<Utc>,
}

impl Default for MonitorHealthRecord {
    /// The record assumed for a monitor that has never been checked
    fn default() -> Self {
        Self {
            consecutive_failures: 0,
            state: HealthState::Healthy,
            last_checked_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}
