//! Usbgate boot binary.
//!
//! Runs as PID 1: mounts the boot partition, starts background services
//! and execs the main application.

use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use usbgate_start::{BootConfig, Init, DEFAULT_CONFIG_PATH};

#[derive(Parser)]
#[command(
    name = "start",
    about = "Usbgate boot - mount /boot, start services, hand off PID 1",
    version,
    author
)]
struct Cli {
    /// Boot configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Don't require running as PID 1
    #[arg(long)]
    no_pid1: bool,

    /// Don't mount the boot partition
    #[arg(long)]
    no_mount: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let mut config = BootConfig::load_for_boot(&cli.config);
    if cli.no_pid1 {
        config.require_pid1 = false;
    }
    if cli.no_mount {
        config.boot.mount_boot = false;
    }

    let init = Init::new(config)?;
    let report = match init.boot().await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "Boot failed");
            return Err(e.into());
        }
    };

    info!(
        mounted = report.mount.is_mounted(),
        units = report.bootstrap.launched.len(),
        "Boot complete"
    );

    let err = report.handoff.exec();
    error!(error = %err, "Handoff failed");
    Err(err.into())
}
