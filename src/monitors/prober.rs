//! Prober - executes one HTTP check for one monitor
//!
//! A probe never fails as far as the pipeline is concerned: timeouts,
//! refused connections and unexpected status codes are all reported as a
//! [`ProbeOutcome`] that drives the state engine.
//!
//! ```text
//! response received, status == expected  → success
//! response received, status != expected  → unexpected-status (status kept)
//! no response before timeoutMs           → timeout (status 0)
//! DNS / TLS / refused / anything else    → connection-error (status 0)
//! ```

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, instrument, trace};

use crate::{MonitorDefinition, ProbeOutcome};

const USER_AGENT: &str = concat!("pulseguard/", env!("CARGO_PKG_VERSION"));

/// Something that can check a monitor's endpoint
///
/// Implementations must be safe to call concurrently for different monitors.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, monitor: &MonitorDefinition) -> ProbeOutcome;
}

/// Probe backed by a shared reqwest client
///
/// The client is reused across requests (it pools connections internally);
/// the per-monitor timeout is applied to each request.
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Probe for HttpProber {
    #[instrument(skip(self, monitor), fields(monitor_id = %monitor.id, endpoint = %monitor.endpoint))]
    async fn probe(&self, monitor: &MonitorDefinition) -> ProbeOutcome {
        trace!("probing with {:?}", monitor.method);

        let start = Instant::now();
        let result = self
            .client
            .request(monitor.method.as_reqwest(), &monitor.endpoint)
            .timeout(Duration::from_millis(monitor.timeout_ms))
            .send()
            .await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let outcome = match result {
            Ok(response) => {
                let status_code = response.status().as_u16();
                if status_code == monitor.expected_status {
                    ProbeOutcome::healthy(status_code, latency_ms)
                } else {
                    ProbeOutcome::unexpected_status(status_code, latency_ms)
                }
            }
            Err(e) if e.is_timeout() => {
                debug!("probe timed out after {latency_ms}ms");
                ProbeOutcome::timeout(latency_ms)
            }
            Err(e) => {
                debug!("probe failed: {e}");
                ProbeOutcome::connection_error(latency_ms)
            }
        };

        trace!(
            "probe finished: success={} status={} reason={} in {}ms",
            outcome.success, outcome.status_code, outcome.failure_reason, outcome.latency_ms
        );

        outcome
    }
}
