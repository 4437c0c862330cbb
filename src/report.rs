//! Telemetry report assembly.
//!
//! Pure construction of the report record submitted to the collector.
//! No I/O happens here; measurement and submission live in the
//! [`crate::usage`] and [`crate::telemetry`] modules.

use crate::bandwidth::BandwidthSample;
use crate::config::NodeConfig;
use serde::{Deserialize, Serialize};

/// Measured usage against the declared capacity, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityUsage {
    /// Bytes currently used under the storage path.
    pub used: u64,
    /// Declared capacity minus used bytes, saturating at zero when the
    /// storage engine has overcommitted.
    pub free: u64,
}

impl CapacityUsage {
    /// Combine a declared capacity with a measured usage figure.
    #[must_use]
    pub const fn new(declared: u64, used: u64) -> Self {
        Self {
            used,
            free: declared.saturating_sub(used),
        }
    }
}

/// How other parties reach this node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Public hostname or IP address.
    pub address: String,
    /// Listening port.
    pub port: u16,
    /// Stable node identifier (40 hex characters).
    pub node_id: String,
}

/// Storage section of the report payload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StorageReport {
    /// Free bytes remaining out of the declared capacity.
    pub free: u64,
    /// Measured bytes in use.
    pub used: u64,
}

/// Bandwidth section of the report payload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BandwidthReport {
    /// Upload rate in megabits per second.
    pub upload: f64,
    /// Download rate in megabits per second.
    pub download: f64,
}

/// One telemetry report as submitted to the collector.
///
/// Transient: built fresh each cycle and never retried; a failed
/// submission is superseded by the next cycle's report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Capacity usage snapshot.
    pub storage: StorageReport,
    /// Most recent bandwidth sample.
    pub bandwidth: BandwidthReport,
    /// Contact descriptor for this node.
    pub contact: Contact,
    /// Payout address rewards are sent to.
    pub payment: String,
}

/// Build a report from configuration, measured usage, and the current
/// bandwidth sample.
///
/// Declared capacity converts from magnitude+unit to bytes with exact
/// binary multipliers before being combined with `used`.
#[must_use]
pub fn build_report(
    config: &NodeConfig,
    used: u64,
    bandwidth: &BandwidthSample,
    contact: &Contact,
) -> Report {
    let usage = CapacityUsage::new(config.storage.declared_bytes(), used);

    Report {
        storage: StorageReport {
            free: usage.free,
            used: usage.used,
        },
        bandwidth: BandwidthReport {
            upload: bandwidth.upload,
            download: bandwidth.download,
        },
        contact: contact.clone(),
        payment: config.payout_address.clone().unwrap_or_default(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::config::{CapacityUnit, StorageConfig};
    use std::path::PathBuf;

    fn test_config() -> NodeConfig {
        NodeConfig {
            payout_address: Some("1BoatSLRHtKNngkdXEeobR76b53LETtpyT".to_string()),
            storage: StorageConfig {
                path: PathBuf::from("/srv/granary/shards"),
                size: 2,
                unit: CapacityUnit::GB,
            },
            ..NodeConfig::default()
        }
    }

    fn test_contact() -> Contact {
        Contact {
            address: "198.51.100.7".to_string(),
            port: 4000,
            node_id: "ab".repeat(20),
        }
    }

    fn test_sample() -> BandwidthSample {
        BandwidthSample {
            upload: 12.0,
            download: 32.0,
            timestamp: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_free_is_declared_minus_used() {
        let declared = 2 * 1024u64.pow(3);
        let report = build_report(&test_config(), 1_000_000, &test_sample(), &test_contact());

        assert_eq!(report.storage.used, 1_000_000);
        assert_eq!(report.storage.free, declared - 1_000_000);
    }

    #[test]
    fn test_free_saturates_on_overcommit() {
        let declared = 2 * 1024u64.pow(3);
        let report = build_report(&test_config(), declared + 1, &test_sample(), &test_contact());

        assert_eq!(report.storage.free, 0);
        assert_eq!(report.storage.used, declared + 1);
    }

    #[test]
    fn test_capacity_usage_zero_used() {
        let usage = CapacityUsage::new(500, 0);
        assert_eq!(usage.free, 500);
        assert_eq!(usage.used, 0);
    }

    #[test]
    fn test_report_carries_bandwidth_and_payment() {
        let report = build_report(&test_config(), 0, &test_sample(), &test_contact());

        assert_eq!(report.bandwidth.upload, 12.0);
        assert_eq!(report.bandwidth.download, 32.0);
        assert_eq!(report.payment, "1BoatSLRHtKNngkdXEeobR76b53LETtpyT");
        assert_eq!(report.contact, test_contact());
    }

    #[test]
    fn test_payload_wire_format() {
        let report = build_report(&test_config(), 4096, &test_sample(), &test_contact());
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&report).unwrap()).unwrap();

        assert!(json["storage"]["free"].is_u64());
        assert_eq!(json["storage"]["used"], 4096);
        assert_eq!(json["bandwidth"]["upload"], 12.0);
        assert_eq!(json["contact"]["port"], 4000);
        assert_eq!(json["payment"], "1BoatSLRHtKNngkdXEeobR76b53LETtpyT");
    }
}
