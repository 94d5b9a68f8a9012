//! Error types for netplan conversion.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for conversion operations.
pub type Result<T> = std::result::Result<T, NetplanError>;

/// Errors that can occur while converting netplan configuration.
#[derive(Error, Debug)]
pub enum NetplanError {
    /// Netplan version other than 2
    #[error("Unsupported netplan version: {0}")]
    UnsupportedVersion(String),

    /// Malformed interface address
    #[error("Invalid address for {interface}: {address}")]
    InvalidAddress { interface: String, address: String },

    /// Input file does not exist
    #[error("Input file not found: {0}")]
    NotFound(PathBuf),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
