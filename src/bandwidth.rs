//! Bandwidth measurement and caching.
//!
//! Running a full speed test is expensive, so measured rates are kept in
//! a small JSON cache file keyed by node identity and reused until they
//! go stale. The cache lives outside the process so it survives restarts
//! and keeps multiple node identities on one host from colliding.
//!
//! Single-writer assumption: the cache file is read then written without
//! a lock. One scheduler instance per node identity is expected;
//! concurrent processes sharing an identity could corrupt the file.

use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info, warn};

/// Maximum age of a cached sample before it must be remeasured.
pub const FRESHNESS_WINDOW_MS: i64 = 25 * 60 * 60 * 1000;

/// Upper bound on one bandwidth measurement. A measurement that takes
/// longer counts as failed; the next cycle retries independently.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(120);

/// A measured upload/download rate pair with its capture time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandwidthSample {
    /// Upload rate in megabits per second.
    pub upload: f64,
    /// Download rate in megabits per second.
    pub download: f64,
    /// Capture time as epoch milliseconds.
    pub timestamp: i64,
}

impl BandwidthSample {
    /// Whether this sample is still usable at `now_ms` (epoch millis).
    /// Exactly at the freshness window is still fresh.
    #[must_use]
    pub const fn is_fresh_at(&self, now_ms: i64) -> bool {
        now_ms - self.timestamp <= FRESHNESS_WINDOW_MS
    }

    /// Whether this sample is still usable right now.
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(Utc::now().timestamp_millis())
    }
}

/// Raw result of one bandwidth measurement.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Measurement {
    /// Upload rate in megabits per second.
    pub upload: f64,
    /// Download rate in megabits per second.
    pub download: f64,
}

/// External bandwidth measurement service.
#[async_trait]
pub trait SpeedTest: Send + Sync {
    /// Run one measurement against the service.
    async fn measure(&self) -> Result<Measurement>;
}

/// `SpeedTest` backed by an HTTP measurement endpoint.
pub struct HttpSpeedTest {
    client: reqwest::Client,
    url: String,
}

impl HttpSpeedTest {
    /// Create a probe against the given measurement endpoint.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("granary-node/", env!("CARGO_PKG_VERSION")))
            .timeout(PROBE_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl SpeedTest for HttpSpeedTest {
    async fn measure(&self) -> Result<Measurement> {
        debug!("measuring bandwidth against {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::Probe(format!("measurement request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Probe(format!(
                "measurement service returned status: {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Probe(format!("failed to parse measurement: {e}")))
    }
}

/// Per-node-identity cache of the most recent bandwidth sample.
pub struct BandwidthCache {
    path: PathBuf,
}

impl BandwidthCache {
    /// Create a cache handle for `node_id` under `cache_dir`.
    #[must_use]
    pub fn new(cache_dir: &Path, node_id: &str) -> Self {
        Self {
            path: cache_dir.join(format!("speedtest-{node_id}.json")),
        }
    }

    /// Location of the cache file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the cached sample, if any. A missing or unreadable file is
    /// treated as no sample.
    pub async fn load(&self) -> Option<BandwidthSample> {
        let raw = fs::read(&self.path).await.ok()?;
        match serde_json::from_slice(&raw) {
            Ok(sample) => Some(sample),
            Err(e) => {
                warn!(
                    "discarding unreadable bandwidth cache {}: {e}",
                    self.path.display()
                );
                None
            }
        }
    }

    /// Persist `sample`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache file cannot be written.
    pub async fn store(&self, sample: &BandwidthSample) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let raw = serde_json::to_vec(sample).map_err(|e| Error::Serialization(e.to_string()))?;
        fs::write(&self.path, raw).await?;
        Ok(())
    }

    /// Return a sample for the current reporting cycle: the cached one
    /// when fresh, otherwise a single new measurement which is persisted
    /// before being returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the measurement fails, times out, or the new
    /// sample cannot be persisted. The stale cache entry is left in
    /// place for inspection; the next cycle retries.
    pub async fn current(&self, probe: &dyn SpeedTest) -> Result<BandwidthSample> {
        if let Some(sample) = self.load().await {
            if sample.is_fresh() {
                return Ok(sample);
            }
            debug!("cached bandwidth sample is stale, measuring again");
        }

        let measured = tokio::time::timeout(PROBE_TIMEOUT, probe.measure())
            .await
            .map_err(|_| {
                Error::Probe(format!(
                    "measurement timed out after {}s",
                    PROBE_TIMEOUT.as_secs()
                ))
            })??;

        let sample = BandwidthSample {
            upload: measured.upload,
            download: measured.download,
            timestamp: Utc::now().timestamp_millis(),
        };
        self.store(&sample).await?;

        info!(
            "recorded bandwidth sample: {:.2} Mbps up / {:.2} Mbps down",
            sample.upload, sample.download
        );
        Ok(sample)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const HOUR_MS: i64 = 60 * 60 * 1000;

    struct StaticSpeedTest {
        upload: f64,
        download: f64,
        fail: bool,
        calls: AtomicUsize,
    }

    impl StaticSpeedTest {
        fn new(upload: f64, download: f64) -> Self {
            Self {
                upload,
                download,
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(0.0, 0.0)
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SpeedTest for StaticSpeedTest {
        async fn measure(&self) -> Result<Measurement> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::Probe("measurement service unavailable".into()));
            }
            Ok(Measurement {
                upload: self.upload,
                download: self.download,
            })
        }
    }

    fn sample_aged(hours: i64) -> BandwidthSample {
        BandwidthSample {
            upload: 12.0,
            download: 32.0,
            timestamp: Utc::now().timestamp_millis() - hours * HOUR_MS,
        }
    }

    /// Test 1: a sample captured 24 hours ago is still fresh.
    #[test]
    fn test_sample_fresh_at_24_hours() {
        assert!(sample_aged(24).is_fresh());
    }

    /// Test 2: a sample captured 26 hours ago is stale.
    #[test]
    fn test_sample_stale_at_26_hours() {
        assert!(!sample_aged(26).is_fresh());
    }

    /// Test 3: exactly at the window boundary is still fresh.
    #[test]
    fn test_sample_fresh_exactly_at_window() {
        let sample = BandwidthSample {
            upload: 1.0,
            download: 1.0,
            timestamp: 0,
        };
        assert!(sample.is_fresh_at(FRESHNESS_WINDOW_MS));
        assert!(!sample.is_fresh_at(FRESHNESS_WINDOW_MS + 1));
    }

    #[tokio::test]
    async fn test_cache_round_trip() {
        let dir = TempDir::new().expect("create temp dir");
        let cache = BandwidthCache::new(dir.path(), "abc123");

        assert!(cache.load().await.is_none());

        let sample = sample_aged(0);
        cache.store(&sample).await.expect("store");
        assert_eq!(cache.load().await, Some(sample));
    }

    #[tokio::test]
    async fn test_cache_path_keyed_by_node_id() {
        let dir = TempDir::new().expect("create temp dir");
        let a = BandwidthCache::new(dir.path(), "node-a");
        let b = BandwidthCache::new(dir.path(), "node-b");

        assert_ne!(a.path(), b.path());
        assert!(a.path().to_string_lossy().contains("node-a"));
    }

    #[tokio::test]
    async fn test_corrupt_cache_treated_as_absent() {
        let dir = TempDir::new().expect("create temp dir");
        let cache = BandwidthCache::new(dir.path(), "abc123");
        std::fs::write(cache.path(), b"not json").unwrap();

        assert!(cache.load().await.is_none());
    }

    #[tokio::test]
    async fn test_current_uses_fresh_cache_without_probing() {
        let dir = TempDir::new().expect("create temp dir");
        let cache = BandwidthCache::new(dir.path(), "abc123");
        let cached = sample_aged(24);
        cache.store(&cached).await.expect("store");

        let probe = StaticSpeedTest::new(99.0, 99.0);
        let sample = cache.current(&probe).await.expect("current");

        assert_eq!(sample, cached);
        assert_eq!(probe.calls(), 0);
    }

    #[tokio::test]
    async fn test_current_remeasures_stale_cache() {
        let dir = TempDir::new().expect("create temp dir");
        let cache = BandwidthCache::new(dir.path(), "abc123");
        cache.store(&sample_aged(26)).await.expect("store");

        let probe = StaticSpeedTest::new(50.0, 150.0);
        let sample = cache.current(&probe).await.expect("current");

        assert_eq!(probe.calls(), 1);
        assert_eq!(sample.upload, 50.0);
        assert_eq!(sample.download, 150.0);

        // New sample overwrote the stale one.
        let reloaded = cache.load().await.expect("reload");
        assert_eq!(reloaded, sample);
    }

    #[tokio::test]
    async fn test_current_measures_when_cache_missing() {
        let dir = TempDir::new().expect("create temp dir");
        let cache = BandwidthCache::new(dir.path(), "abc123");

        let probe = StaticSpeedTest::new(8.0, 80.0);
        let sample = cache.current(&probe).await.expect("current");

        assert_eq!(probe.calls(), 1);
        assert_eq!(sample.upload, 8.0);
    }

    #[tokio::test]
    async fn test_current_surfaces_probe_failure() {
        let dir = TempDir::new().expect("create temp dir");
        let cache = BandwidthCache::new(dir.path(), "abc123");

        let probe = StaticSpeedTest::failing();
        let result = cache.current(&probe).await;

        assert!(matches!(result, Err(Error::Probe(_))));
        // Nothing was persisted for the failed measurement.
        assert!(cache.load().await.is_none());
    }

    #[test]
    fn test_cache_file_wire_format() {
        let sample = BandwidthSample {
            upload: 12.5,
            download: 97.25,
            timestamp: 1_700_000_000_000,
        };
        let json: serde_json::Value =
            serde_json::from_slice(&serde_json::to_vec(&sample).unwrap()).unwrap();
        assert_eq!(json["upload"], 12.5);
        assert_eq!(json["download"], 97.25);
        assert_eq!(json["timestamp"], 1_700_000_000_000i64);
    }
}
