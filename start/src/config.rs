//! Boot configuration.
//!
//! Loaded from a TOML file; every field has a default so a missing file
//! boots with the stock layout. `APP_PORT` in the environment overrides
//! the advertised application port.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Default location of the boot configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/usbgate/boot.toml";

/// Environment variable carrying the application port.
pub const APP_PORT_ENV: &str = "APP_PORT";

/// Top-level boot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootConfig {
    /// Boot partition discovery and mounting
    pub boot: BootSection,
    /// Background services
    pub services: ServicesSection,
    /// Main application that takes over PID 1
    pub app: AppSection,
    /// Whether to enforce running as PID 1
    pub require_pid1: bool,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            boot: BootSection::default(),
            services: ServicesSection::default(),
            app: AppSection::default(),
            require_pid1: true,
        }
    }
}

/// `[boot]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootSection {
    /// Kernel boot-parameter source
    pub cmdline_path: PathBuf,
    /// Mount table consulted for the idempotence check
    pub mount_table: PathBuf,
    /// Directory scanned for block devices in diagnostics
    pub dev_dir: PathBuf,
    /// Whether to attempt the boot partition mount at all
    pub mount_boot: bool,
}

impl Default for BootSection {
    fn default() -> Self {
        Self {
            cmdline_path: PathBuf::from("/proc/cmdline"),
            mount_table: PathBuf::from("/proc/self/mounts"),
            dev_dir: PathBuf::from("/dev"),
            mount_boot: true,
        }
    }
}

/// `[services]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesSection {
    /// Pause after starting the message bus, before service discovery
    pub settle_delay_secs: u64,
    /// Instance name published over service discovery
    pub advertise_name: String,
    /// Service type published over service discovery
    pub advertise_type: String,
    /// Port the application listens on
    pub app_port: u16,
}

impl Default for ServicesSection {
    fn default() -> Self {
        Self {
            settle_delay_secs: 2,
            advertise_name: "usbgate".to_string(),
            advertise_type: "_http._tcp".to_string(),
            app_port: 5000,
        }
    }
}

impl ServicesSection {
    /// Settle delay as a duration.
    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }
}

/// `[app]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// Program to exec
    pub program: String,
    /// Arguments passed to the program
    pub args: Vec<String>,
    /// Working directory for the application
    pub working_directory: Option<PathBuf>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["/app/app.py".to_string()],
            working_directory: None,
        }
    }
}

impl BootConfig {
    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::from_file(path)
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: BootConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Configuration for the boot path.
    ///
    /// Never fails: an unusable file falls back to defaults and a malformed
    /// `APP_PORT` to the configured port, each with a warning.
    pub fn load_for_boot(path: &Path) -> Self {
        Self::load_for_boot_with(path, std::env::var(APP_PORT_ENV).ok().as_deref())
    }

    fn load_for_boot_with(path: &Path, port: Option<&str>) -> Self {
        let mut config = Self::load(path).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "Unusable boot configuration, using defaults");
            Self::default()
        });

        if let Some(raw) = port {
            match parse_port(raw) {
                Ok(port) => config.services.app_port = port,
                Err(e) => warn!(
                    error = %e,
                    port = config.services.app_port,
                    "Ignoring APP_PORT"
                ),
            }
        }
        config
    }

    /// Apply `APP_PORT` from the process environment.
    pub fn with_env(self) -> Result<Self> {
        self.with_port_override(std::env::var(APP_PORT_ENV).ok().as_deref())
    }

    /// Override the application port with a raw environment value.
    pub fn with_port_override(mut self, raw: Option<&str>) -> Result<Self> {
        if let Some(raw) = raw {
            self.services.app_port = parse_port(raw)?;
        }
        Ok(self)
    }
}

fn parse_port(raw: &str) -> Result<u16> {
    raw.trim()
        .parse::<u16>()
        .ok()
        .filter(|port| *port != 0)
        .ok_or_else(|| Error::ConfigError(format!("{} is not a valid port: {:?}", APP_PORT_ENV, raw)))
}
