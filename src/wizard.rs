//! Interactive setup wizard.
//!
//! First-run configuration: prompts for network and storage parameters,
//! validates each answer, and assembles a [`NodeConfig`] ready to be
//! persisted. Prompt rendering is delegated to `dialoguer`; everything
//! worth testing lives in the free validation functions.

use crate::config::{
    CapacityUnit, NetworkConfig, NodeConfig, StorageConfig, TelemetryConfig,
};
use crate::error::{Error, Result};
use dialoguer::{Confirm, Input, Password};
use std::path::{Path, PathBuf};
use url::Url;

/// Everything gathered by one wizard run.
pub struct SetupAnswers {
    /// Validated configuration, not yet persisted.
    pub config: NodeConfig,
    /// Password protecting the private key.
    pub password: String,
    /// Data directory chosen by the operator (created by the wizard).
    pub datadir: PathBuf,
}

/// Parse a capacity answer like `50MB`, `2GB`, or `1TB` into its
/// magnitude and unit. Magnitude and unit are validated as a pair.
///
/// # Errors
///
/// Returns an error if the magnitude is missing or zero, or the unit is
/// not one of MB, GB, TB.
pub fn parse_capacity(value: &str) -> Result<(u64, CapacityUnit)> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| Error::Config(format!("invalid capacity '{value}', try 50MB, 2GB, or 1TB")))?;

    let (digits, unit) = value.split_at(split);
    let size: u64 = digits
        .parse()
        .map_err(|_| Error::Config(format!("invalid capacity '{value}', try 50MB, 2GB, or 1TB")))?;
    if size == 0 {
        return Err(Error::Config("capacity must be greater than zero".into()));
    }

    Ok((size, unit.parse()?))
}

/// Whether `value` is a well-formed seed URI:
/// `granary://<host>:<port>/<40 hex char node id>`.
#[must_use]
pub fn valid_seed_uri(value: &str) -> bool {
    let Ok(parsed) = Url::parse(value) else {
        return false;
    };
    let node_id = parsed.path().trim_start_matches('/');

    parsed.scheme() == "granary"
        && parsed.host_str().is_some()
        && parsed.port().is_some()
        && node_id.len() == 40
        && node_id.chars().all(|c| c.is_ascii_hexdigit())
}

/// Whether `value` looks like a payout address (non-empty base-58).
#[must_use]
pub fn valid_payout_address(value: &str) -> bool {
    !value.is_empty() && bs58::decode(value).into_vec().is_ok()
}

/// Check that a proposed data directory can be claimed: it must not
/// already exist.
///
/// # Errors
///
/// Returns an error naming the conflicting path.
pub fn check_datadir(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(Error::Config(format!(
            "{} already exists, refusing to overwrite",
            path.display()
        )));
    }
    Ok(())
}

/// Check that a proposed key path can be written: its parent directory
/// must exist and the target must not.
///
/// # Errors
///
/// Returns an error if the target already exists or the parent
/// directory is missing.
pub fn check_keypath(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(Error::Config(format!(
            "{} already exists, refusing to overwrite",
            path.display()
        )));
    }
    if !path.parent().map_or(false, Path::exists) {
        return Err(Error::Config(format!(
            "cannot write key to {}, parent directory does not exist",
            path.display()
        )));
    }
    Ok(())
}

/// Run the interactive wizard.
///
/// Creates the chosen data directory once its path is accepted, so later
/// defaults (key path, storage path) can live underneath it.
///
/// # Errors
///
/// Returns an error if a prompt fails, the data directory cannot be
/// created, or the assembled configuration fails validation.
pub fn run(default_datadir: &Path) -> Result<SetupAnswers> {
    let address: String = Input::new()
        .with_prompt("Public hostname or IP address")
        .default("127.0.0.1".to_string())
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Port number the service should use (0 for random)")
        .default(4000)
        .interact_text()?;

    let seed: String = Input::new()
        .with_prompt("URI of a known seed (leave empty for discovery)")
        .allow_empty(true)
        .validate_with(|value: &String| -> std::result::Result<(), &str> {
            if value.is_empty() || valid_seed_uri(value) {
                Ok(())
            } else {
                Err("invalid seed URI supplied, make sure the node id is correct")
            }
        })
        .interact_text()?;

    let datadir: String = Input::new()
        .with_prompt("Path to store configuration and data")
        .default(default_datadir.display().to_string())
        .validate_with(|value: &String| -> std::result::Result<(), String> {
            check_datadir(Path::new(value)).map_err(|e| e.to_string())
        })
        .interact_text()?;
    let datadir = PathBuf::from(datadir);
    std::fs::create_dir_all(&datadir)?;

    let capacity: String = Input::new()
        .with_prompt("Amount of storage space to share")
        .default("2GB".to_string())
        .validate_with(|value: &String| -> std::result::Result<(), String> {
            parse_capacity(value).map(|_| ()).map_err(|e| e.to_string())
        })
        .interact_text()?;
    let (size, unit) = parse_capacity(&capacity)?;

    let telemetry: bool = Confirm::new()
        .with_prompt("Share telemetry reports to help improve the network?")
        .default(true)
        .interact()?;

    let payout: String = if telemetry {
        Input::new()
            .with_prompt("Payment address to receive rewards")
            .validate_with(|value: &String| -> std::result::Result<(), &str> {
                if valid_payout_address(value) {
                    Ok(())
                } else {
                    Err("invalid payment address")
                }
            })
            .interact_text()?
    } else {
        Input::new()
            .with_prompt("Payment address to receive rewards (optional)")
            .allow_empty(true)
            .interact_text()?
    };

    let keypath: String = Input::new()
        .with_prompt("Path to store the encrypted private key")
        .default(datadir.join("id_granary").display().to_string())
        .validate_with(|value: &String| -> std::result::Result<(), String> {
            check_keypath(Path::new(value)).map_err(|e| e.to_string())
        })
        .interact_text()?;

    let password = Password::new()
        .with_prompt("Password to protect the private key")
        .with_confirmation("Confirm password", "the passwords do not match")
        .interact()?;

    let config = NodeConfig {
        keypath: PathBuf::from(keypath),
        payout_address: (!payout.is_empty()).then_some(payout),
        storage: StorageConfig {
            path: datadir.join("shards"),
            size,
            unit,
        },
        network: NetworkConfig {
            address,
            port,
            seeds: if seed.is_empty() { Vec::new() } else { vec![seed] },
        },
        telemetry: TelemetryConfig {
            enabled: telemetry,
            ..TelemetryConfig::default()
        },
        ..NodeConfig::default()
    };
    config.validate()?;

    Ok(SetupAnswers {
        config,
        password,
        datadir,
    })
}
