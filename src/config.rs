//! Configuration for granary-node.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Unit for the operator-declared storage capacity.
///
/// Declared capacity is always carried as a magnitude plus one of these
/// units, so an out-of-range unit is unrepresentable. Conversion uses
/// exact binary multipliers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapacityUnit {
    /// Mebibytes (1024²).
    MB,
    /// Gibibytes (1024³).
    GB,
    /// Tebibytes (1024⁴).
    TB,
}

impl CapacityUnit {
    /// Number of bytes in one unit.
    #[must_use]
    pub const fn multiplier(self) -> u64 {
        match self {
            Self::MB => 1024u64.pow(2),
            Self::GB => 1024u64.pow(3),
            Self::TB => 1024u64.pow(4),
        }
    }
}

impl fmt::Display for CapacityUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MB => write!(f, "MB"),
            Self::GB => write!(f, "GB"),
            Self::TB => write!(f, "TB"),
        }
    }
}

impl FromStr for CapacityUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "MB" => Ok(Self::MB),
            "GB" => Ok(Self::GB),
            "TB" => Ok(Self::TB),
            other => Err(Error::Config(format!(
                "invalid capacity unit '{other}', expected MB, GB, or TB"
            ))),
        }
    }
}

/// Storage sharing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the shared storage data.
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,

    /// Declared capacity magnitude.
    #[serde(default = "default_storage_size")]
    pub size: u64,

    /// Declared capacity unit.
    #[serde(default = "default_storage_unit")]
    pub unit: CapacityUnit,
}

impl StorageConfig {
    /// Declared capacity in bytes.
    #[must_use]
    pub fn declared_bytes(&self) -> u64 {
        self.size.saturating_mul(self.unit.multiplier())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            size: default_storage_size(),
            unit: default_storage_unit(),
        }
    }
}

/// Network contact configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Public hostname or IP address other nodes can reach us on.
    #[serde(default = "default_address")]
    pub address: String,

    /// Listening port (0 for random).
    #[serde(default)]
    pub port: u16,

    /// Known seed URIs, e.g. `granary://10.0.0.2:4000/<node id>`.
    #[serde(default)]
    pub seeds: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: 0,
            seeds: Vec::new(),
        }
    }
}

/// Telemetry reporting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Whether periodic reports are sent at all. When disabled the
    /// reporting loop is never started.
    #[serde(default)]
    pub enabled: bool,

    /// Collector endpoint that receives reports.
    #[serde(default = "default_collector_url")]
    pub collector_url: String,

    /// Bandwidth measurement service endpoint.
    #[serde(default = "default_probe_url")]
    pub probe_url: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            collector_url: default_collector_url(),
            probe_url: default_probe_url(),
        }
    }
}

/// Node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Path to the encrypted private key.
    #[serde(default = "default_keypath")]
    pub keypath: PathBuf,

    /// Payment address rewards are sent to. Required when telemetry is
    /// enabled.
    #[serde(default)]
    pub payout_address: Option<String>,

    /// Storage sharing configuration.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Network contact configuration.
    #[serde(default)]
    pub network: NetworkConfig,

    /// Telemetry reporting configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            keypath: default_keypath(),
            payout_address: None,
            storage: StorageConfig::default(),
            network: NetworkConfig::default(),
            telemetry: TelemetryConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &std::path::Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check cross-field invariants before the configuration is used or
    /// persisted.
    ///
    /// # Errors
    ///
    /// Returns an error if the declared capacity is zero or if telemetry
    /// is enabled without a payout address.
    pub fn validate(&self) -> Result<()> {
        if self.storage.size == 0 {
            return Err(Error::Config(
                "declared storage capacity must be greater than zero".into(),
            ));
        }
        if self.telemetry.enabled
            && self
                .payout_address
                .as_deref()
                .map_or(true, str::is_empty)
        {
            return Err(Error::Config(
                "a payout address is required when telemetry is enabled".into(),
            ));
        }
        Ok(())
    }
}

/// Default directory for node configuration and data.
#[must_use]
pub fn default_datadir() -> PathBuf {
    directories::ProjectDirs::from("", "", "granary").map_or_else(
        || PathBuf::from(".granary"),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

fn default_storage_path() -> PathBuf {
    default_datadir().join("shards")
}

const fn default_storage_size() -> u64 {
    2
}

const fn default_storage_unit() -> CapacityUnit {
    CapacityUnit::GB
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_collector_url() -> String {
    "https://status.granary.network/api/reports".to_string()
}

fn default_probe_url() -> String {
    "https://speed.granary.network/api/measure".to_string()
}

fn default_keypath() -> PathBuf {
    default_datadir().join("id_granary")
}

fn default_log_level() -> String {
    "info".to_string()
}
