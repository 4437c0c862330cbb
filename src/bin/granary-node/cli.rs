//! Command-line interface definition.

use clap::Parser;
use std::path::PathBuf;

/// Storage node host for the granary network.
#[derive(Parser, Debug)]
#[command(name = "granary-node")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory for configuration and storage data.
    #[arg(long, short, env = "GRANARY_DATADIR")]
    pub datadir: Option<PathBuf>,

    /// Password to unlock the private key (prompted when omitted).
    #[arg(long, short, env = "GRANARY_PASSWORD")]
    pub password: Option<String>,

    /// Path to the configuration file (defaults to <datadir>/config.toml).
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Log level.
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,
}

impl Cli {
    /// Resolve the data directory, falling back to the platform default.
    #[must_use]
    pub fn datadir(&self) -> PathBuf {
        self.datadir
            .clone()
            .unwrap_or_else(granary_node::config::default_datadir)
    }
}
