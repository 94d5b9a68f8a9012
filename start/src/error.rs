//! Error types for the usbgate boot core.

use thiserror::Error;

/// Result type alias for boot operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while booting.
#[derive(Error, Debug)]
pub enum Error {
    /// Kernel command line unreadable or missing the root token
    #[error("Kernel command line error: {0}")]
    Parse(String),

    /// Root device does not belong to a known bus family
    #[error("Unsupported root device: {0}")]
    UnsupportedDevice(String),

    /// Boot partition mount failed
    #[error("Mount error: {device} -> {target}: {reason}")]
    Mount {
        device: String,
        target: String,
        reason: String,
    },

    /// A bootstrap unit failed to launch
    #[error("Service failed to launch: {unit}: {reason}")]
    ServiceLaunch { unit: String, reason: String },

    /// Unit references a dependency that is not part of the plan
    #[error("Service dependency error: {unit} depends on {dependency}: {reason}")]
    DependencyError {
        unit: String,
        dependency: String,
        reason: String,
    },

    /// Circular dependency detected
    #[error("Circular dependency detected: {0:?}")]
    CircularDependency(Vec<String>),

    /// Two units share a name
    #[error("Duplicate service unit: {0}")]
    DuplicateUnit(String),

    /// Replacing this process with the application failed
    #[error("Failed to hand off to {program}: {reason}")]
    Handoff { program: String, reason: String },

    /// Not running as PID 1
    #[error("Not running as PID 1 (current PID: {0})")]
    NotPid1(u32),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error must stop the boot sequence.
    ///
    /// Boot partition problems are best-effort and never fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::Parse(_) | Error::UnsupportedDevice(_) | Error::Mount { .. }
        )
    }
}
