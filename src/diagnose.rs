//! Manual troubleshooting of boot partition discovery.
//!
//! Walks the same steps as the boot path (read cmdline, resolve, check the
//! mount table, optionally mount) and prints every decision along the way.

use anyhow::{Context, Result};
use start::device::DeviceRoleResolver;
use start::mount::{DiagnosticBundle, MountBackend, MountExecutor, MountOutcome};
use start::{BootConfig, KernelCmdline};
use std::io::Write;

/// Options for a diagnostic run.
pub struct DiagnoseOptions {
    /// Use this root device instead of the one on the command line
    pub root_override: Option<String>,
    /// Actually attempt the mount
    pub mount: bool,
}

/// Run the diagnostic against the real system and print to stdout.
pub fn run(config: &BootConfig, options: &DiagnoseOptions) -> Result<()> {
    let executor = MountExecutor::system(&config.boot.mount_table, &config.boot.dev_dir);
    let stdout = std::io::stdout();
    report(config, options, &executor, &mut stdout.lock())
}

/// Run the diagnostic with the given mounter, writing the report to `out`.
pub fn report<M: MountBackend, W: Write>(
    config: &BootConfig,
    options: &DiagnoseOptions,
    executor: &MountExecutor<M>,
    out: &mut W,
) -> Result<()> {
    let boot = &config.boot;

    writeln!(out, "Boot partition diagnostics")?;
    writeln!(out, "==========================")?;
    writeln!(out, "Command line source: {}", boot.cmdline_path.display())?;

    let cmdline = match KernelCmdline::read(&boot.cmdline_path) {
        Ok(cmdline) => {
            writeln!(out, "Command line: {}", cmdline.raw())?;
            Some(cmdline)
        }
        Err(e) => {
            writeln!(out, "Command line: unavailable ({})", e)?;
            None
        }
    };

    let root = match (&options.root_override, &cmdline) {
        (Some(root), _) => {
            writeln!(out, "Root device: {} (override)", root)?;
            root.clone()
        }
        (None, Some(cmdline)) => {
            let root = cmdline
                .root_device()
                .context("Cannot determine root device")?;
            writeln!(out, "Root device: {}", root)?;
            root.to_string()
        }
        (None, None) => anyhow::bail!("No command line and no --root given"),
    };

    writeln!(out)?;
    writeln!(out, "Rules (first match wins):")?;
    let resolver = DeviceRoleResolver::new();
    let (result, decisions) = resolver.resolve_traced(&root);
    for (i, decision) in decisions.iter().enumerate() {
        writeln!(out, "  {}. {}", i + 1, decision)?;
    }

    let target = match result {
        Ok(target) => target,
        Err(e) => {
            writeln!(out)?;
            writeln!(out, "Result: {}", e)?;
            writeln!(out, "The boot path skips the mount and continues booting.")?;
            return Ok(());
        }
    };

    writeln!(out)?;
    writeln!(out, "Bus family: {}", resolver.classify(&root).bus_family)?;
    writeln!(out, "Boot partition: {}", target.device_path)?;
    writeln!(out, "Mount point: {}", target.mount_point)?;

    match executor.is_mounted(&target.mount_point) {
        Ok(mounted) => writeln!(
            out,
            "Currently mounted: {}",
            if mounted { "yes" } else { "no" }
        )?,
        Err(e) => writeln!(
            out,
            "Currently mounted: unknown ({}: {})",
            boot.mount_table.display(),
            e
        )?,
    }

    let raw_cmdline = cmdline.as_ref().map(|c| c.raw()).unwrap_or("");

    if !options.mount {
        writeln!(out)?;
        writeln!(out, "Dry run; pass --mount to attempt the mount.")?;
        writeln!(
            out,
            "{}",
            DiagnosticBundle::collect(&target.device_path, raw_cmdline, &boot.dev_dir)
        )?;
        return Ok(());
    }

    writeln!(out)?;
    match executor.ensure_mounted(&target, raw_cmdline) {
        Ok(MountOutcome::AlreadyMounted) => {
            writeln!(out, "Result: already mounted, nothing to do")?
        }
        Ok(MountOutcome::Mounted) => writeln!(
            out,
            "Result: mounted {} at {}",
            target.device_path, target.mount_point
        )?,
        Err(e) => {
            writeln!(out, "Result: {}", e)?;
            writeln!(
                out,
                "{}",
                DiagnosticBundle::collect(&target.device_path, raw_cmdline, &boot.dev_dir)
            )?;
        }
    }

    Ok(())
}
