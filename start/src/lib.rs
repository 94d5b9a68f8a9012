//! Usbgate boot core.
//!
//! This crate is what runs as PID 1 when a usbgate device boots. It
//! performs two independent jobs and then steps aside:
//!
//! - Find the boot partition from the kernel's `root=` parameter and mount
//!   it at `/boot`, on a best-effort basis
//! - Launch the fixed set of background services, stopping at the first
//!   failure
//!
//! and finally execs the main application in its own place so that the
//! application becomes PID 1.
//!
//! # Example
//!
//! ```no_run
//! use usbgate_start::{BootConfig, Init};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let config = BootConfig::default().with_env()?;
//!     let init = Init::new(config)?;
//!     let report = init.boot().await?;
//!     Err(report.handoff.exec().into())
//! }
//! ```

pub mod bootstrap;
pub mod cmdline;
pub mod config;
pub mod device;
pub mod error;
pub mod handoff;
pub mod init;
pub mod mount;
pub mod plan;
pub mod runtime;
pub mod unit;

// Re-export main types
pub use bootstrap::{BootstrapReport, LaunchedUnit, ServiceBootstrapper, SystemLauncher, UnitLauncher};
pub use cmdline::KernelCmdline;
pub use config::{BootConfig, DEFAULT_CONFIG_PATH};
pub use device::{BootPartitionTarget, BusFamily, DeviceRoleResolver, RootDeviceSpec, RuleDecision};
pub use error::{Error, Result};
pub use handoff::Handoff;
pub use init::{BootReport, Init, MountStatus};
pub use mount::{DiagnosticBundle, MountBackend, MountCommand, MountExecutor, MountOutcome};
pub use plan::BootstrapPlan;
pub use runtime::RuntimeGuard;
pub use unit::{standard_units, BackgroundingMode, LaunchAction, ServiceUnit};
