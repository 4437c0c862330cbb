//! Periodic telemetry reporting.
//!
//! [`Reporter::run`] drives an unending cycle: resolve bandwidth (from
//! cache or a fresh measurement), measure storage usage, build a report,
//! submit it to the collector, then wait a fixed interval and repeat.
//! Every step can fail; no failure ends the loop. Cycles never overlap:
//! the interval starts only after the previous submission attempt has
//! completed.

use crate::bandwidth::{BandwidthCache, SpeedTest};
use crate::config::NodeConfig;
use crate::error::{Error, Result};
use crate::report::{build_report, Contact, Report};
use crate::usage::directory_size;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Delay between reporting cycles.
pub const REPORT_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Remote endpoint that accepts telemetry reports.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Submit one report.
    async fn submit(&self, report: &Report) -> Result<()>;
}

/// `Collector` backed by an HTTP endpoint accepting JSON reports.
pub struct HttpCollector {
    client: reqwest::Client,
    url: String,
}

impl HttpCollector {
    /// Create a collector client for the given endpoint.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("granary-node/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Collector for HttpCollector {
    async fn submit(&self, report: &Report) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(report)
            .send()
            .await
            .map_err(|e| Error::Collector(format!("report submission failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Collector(format!(
                "collector returned status: {}",
                response.status()
            )));
        }

        Ok(())
    }
}

/// How one reporting cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Report was built and accepted by the collector.
    Sent,
    /// Bandwidth could not be resolved; nothing was measured or sent.
    ProbeFailed,
    /// Storage usage measurement failed; nothing was sent.
    MeasurementFailed,
    /// Report was built but the collector did not accept it.
    SubmitFailed,
}

/// Periodic telemetry reporter.
///
/// Constructed by the hosting process once the node identity is known
/// and telemetry is confirmed enabled; runs for the life of the process
/// unless shut down through the watch channel.
pub struct Reporter {
    config: NodeConfig,
    contact: Contact,
    cache: BandwidthCache,
    probe: Arc<dyn SpeedTest>,
    collector: Arc<dyn Collector>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Reporter {
    /// Create a reporter from its collaborators.
    #[must_use]
    pub fn new(
        config: NodeConfig,
        contact: Contact,
        cache: BandwidthCache,
        probe: Arc<dyn SpeedTest>,
        collector: Arc<dyn Collector>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            contact,
            cache,
            probe,
            collector,
            shutdown_rx,
        }
    }

    /// Run reporting cycles until shutdown is signalled.
    pub async fn run(mut self) {
        info!(
            "telemetry reporting started (every {}s)",
            REPORT_INTERVAL.as_secs()
        );

        loop {
            self.run_cycle().await;

            tokio::select! {
                changed = self.shutdown_rx.changed() => {
                    // A closed channel means the host is tearing down.
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        break;
                    }
                }
                () = tokio::time::sleep(REPORT_INTERVAL) => {}
            }
        }

        info!("telemetry reporting stopped");
    }

    /// Run one probe → measure → build → submit cycle.
    ///
    /// Each failure is logged and ends the cycle early; the caller keeps
    /// scheduling regardless of the outcome.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let bandwidth = match self.cache.current(self.probe.as_ref()).await {
            Ok(sample) => sample,
            Err(e) => {
                error!("bandwidth probe failed: {e}");
                return CycleOutcome::ProbeFailed;
            }
        };

        let used = match directory_size(self.config.storage.path.clone()).await {
            Ok(used) => used,
            Err(e) => {
                error!("failed to measure storage usage: {e}");
                return CycleOutcome::MeasurementFailed;
            }
        };

        let declared = self.config.storage.declared_bytes();
        if used > declared {
            warn!("storage usage {used} exceeds declared capacity {declared}");
        }

        let report = build_report(&self.config, used, &bandwidth, &self.contact);
        info!(
            "built telemetry report: used={} free={} up={:.2} down={:.2}",
            report.storage.used, report.storage.free, report.bandwidth.upload,
            report.bandwidth.download
        );

        match self.collector.submit(&report).await {
            Ok(()) => {
                info!("sent telemetry report to collector");
                CycleOutcome::Sent
            }
            Err(e) => {
                error!("failed to send telemetry report: {e}");
                CycleOutcome::SubmitFailed
            }
        }
    }
}
