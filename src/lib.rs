//! # granary-node
//!
//! Host-side subsystem for a granary storage node: capacity accounting,
//! bandwidth-aware telemetry reporting, and encrypted key management.
//!
//! The peer-to-peer protocol, contract negotiation, and storage engine
//! live in external libraries; this crate covers what the hosting
//! process itself is responsible for:
//! - Measuring how much of the shared storage directory is in use
//! - Measuring link bandwidth, at most once per freshness window
//! - Reporting both to a remote collector on a fixed cadence
//! - Protecting the node's private key at rest with a password
//! - Validating operator-supplied configuration at setup time
//!
//! ## Example
//!
//! ```rust,no_run
//! use granary_node::bandwidth::{BandwidthCache, HttpSpeedTest};
//! use granary_node::telemetry::{HttpCollector, Reporter};
//! use granary_node::{Contact, NodeConfig};
//! use std::sync::Arc;
//!
//! # async fn run() -> granary_node::Result<()> {
//! let config = NodeConfig::default();
//! let contact = Contact {
//!     address: config.network.address.clone(),
//!     port: config.network.port,
//!     node_id: "0f".repeat(20),
//! };
//! let cache = BandwidthCache::new(std::path::Path::new("/var/cache"), &contact.node_id);
//! let probe = Arc::new(HttpSpeedTest::new(config.telemetry.probe_url.clone()));
//! let collector = Arc::new(HttpCollector::new(config.telemetry.collector_url.clone()));
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//! if config.telemetry.enabled {
//!     tokio::spawn(
//!         Reporter::new(config, contact, cache, probe, collector, shutdown_rx).run(),
//!     );
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod bandwidth;
pub mod config;
pub mod error;
pub mod report;
pub mod telemetry;
pub mod usage;
pub mod vault;
pub mod wizard;

pub use bandwidth::{BandwidthCache, BandwidthSample, HttpSpeedTest, SpeedTest};
pub use config::{CapacityUnit, NodeConfig, StorageConfig, TelemetryConfig};
pub use error::{Error, Result};
pub use report::{build_report, CapacityUsage, Contact, Report};
pub use telemetry::{Collector, CycleOutcome, HttpCollector, Reporter, REPORT_INTERVAL};
pub use usage::directory_size;
