//! Boot orchestration.
//!
//! Runs the boot partition mount (best-effort), then the service bootstrap
//! (fail-fast), and hands back the [`Handoff`] that ends boot.

use crate::bootstrap::{BootstrapReport, ServiceBootstrapper, SystemLauncher, UnitLauncher};
use crate::cmdline::KernelCmdline;
use crate::config::BootConfig;
use crate::device::{BootPartitionTarget, DeviceRoleResolver};
use crate::error::{Error, Result};
use crate::handoff::Handoff;
use crate::mount::{MountBackend, MountCommand, MountExecutor, MountOutcome};
use crate::plan::BootstrapPlan;
use crate::unit::standard_units;
use tracing::{info, warn};

/// What happened to the boot partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountStatus {
    /// Mounted during this boot
    Mounted(BootPartitionTarget),
    /// Something was already mounted on the mount point
    AlreadyMounted(BootPartitionTarget),
    /// Mounting disabled in configuration
    Disabled,
    /// Nothing to mount: cmdline unreadable, no root, or unknown device
    Skipped(String),
    /// The mount was attempted and failed
    Failed(String),
}

impl MountStatus {
    pub fn is_mounted(&self) -> bool {
        matches!(self, MountStatus::Mounted(_) | MountStatus::AlreadyMounted(_))
    }
}

/// Everything that happened before handoff.
#[derive(Debug)]
pub struct BootReport {
    pub mount: MountStatus,
    pub bootstrap: BootstrapReport,
    pub handoff: Handoff,
}

/// The boot orchestrator.
pub struct Init<L = SystemLauncher, M = MountCommand> {
    config: BootConfig,
    resolver: DeviceRoleResolver,
    mounter: MountExecutor<M>,
    bootstrapper: ServiceBootstrapper<L>,
}

impl Init {
    /// Create the orchestrator for a real boot.
    pub fn new(config: BootConfig) -> Result<Self> {
        let pid = std::process::id();
        if config.require_pid1 && pid != 1 {
            return Err(Error::NotPid1(pid));
        }

        let plan = BootstrapPlan::new(standard_units(&config))?;
        Ok(Self::with_parts(config, plan, SystemLauncher, MountCommand))
    }
}

impl<L: UnitLauncher, M: MountBackend> Init<L, M> {
    /// Assemble an orchestrator from explicit parts.
    pub fn with_parts(config: BootConfig, plan: BootstrapPlan, launcher: L, backend: M) -> Self {
        let mounter = MountExecutor::new(
            backend,
            config.boot.mount_table.clone(),
            config.boot.dev_dir.clone(),
        );

        Self {
            config,
            resolver: DeviceRoleResolver::new(),
            mounter,
            bootstrapper: ServiceBootstrapper::new(launcher, plan),
        }
    }

    pub fn config(&self) -> &BootConfig {
        &self.config
    }

    pub fn bootstrapper(&self) -> &ServiceBootstrapper<L> {
        &self.bootstrapper
    }

    /// Mount the boot partition if possible. Never fails the boot.
    pub fn mount_boot_partition(&self) -> MountStatus {
        if !self.config.boot.mount_boot {
            info!("Boot partition mount disabled");
            return MountStatus::Disabled;
        }

        let cmdline = match KernelCmdline::read(&self.config.boot.cmdline_path) {
            Ok(cmdline) => cmdline,
            Err(e) => {
                warn!(error = %e, "Skipping boot partition mount");
                return MountStatus::Skipped(e.to_string());
            }
        };

        match self.try_mount(&cmdline) {
            Ok((target, MountOutcome::Mounted)) => MountStatus::Mounted(target),
            Ok((target, MountOutcome::AlreadyMounted)) => MountStatus::AlreadyMounted(target),
            Err(e @ Error::Mount { .. }) => MountStatus::Failed(e.to_string()),
            Err(e) => {
                warn!(error = %e, cmdline = %cmdline.raw(), "Skipping boot partition mount");
                MountStatus::Skipped(e.to_string())
            }
        }
    }

    fn try_mount(&self, cmdline: &KernelCmdline) -> Result<(BootPartitionTarget, MountOutcome)> {
        let root = cmdline.root_device()?;
        let target = self.resolver.resolve(root)?;
        info!(root = root, boot = %target.device_path, "Resolved boot partition");
        let outcome = self.mounter.ensure_mounted(&target, cmdline.raw())?;
        Ok((target, outcome))
    }

    /// Run the whole boot sequence up to, but not including, the handoff.
    pub async fn boot(&self) -> Result<BootReport> {
        info!("Usbgate boot starting");

        let mount = self.mount_boot_partition();
        let bootstrap = self.bootstrapper.run().await?;
        let handoff = Handoff::new(&self.config.app, self.config.services.app_port);

        Ok(BootReport {
            mount,
            bootstrap,
            handoff,
        })
    }
}
