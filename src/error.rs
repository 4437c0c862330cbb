//! Error types for granary-node.

use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in granary-node.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Bandwidth measurement error.
    #[error("bandwidth probe failed: {0}")]
    Probe(String),

    /// Report submission error.
    #[error("collector error: {0}")]
    Collector(String),

    /// Cryptographic error.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<dialoguer::Error> for Error {
    fn from(err: dialoguer::Error) -> Self {
        Self::Io(std::io::Error::other(err))
    }
}
