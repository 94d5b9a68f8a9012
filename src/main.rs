mod diagnose;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use start::{standard_units, BootConfig, BootstrapPlan, DEFAULT_CONFIG_PATH};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Usbgate - USB/IP gateway appliance tooling
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Boot configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, env = "USBGATE_CONFIG")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Trace boot partition discovery and, optionally, mount it
    Diagnose {
        /// Root device to resolve instead of the kernel's root=
        #[arg(long)]
        root: Option<String>,
        /// Kernel command line source
        #[arg(long)]
        cmdline: Option<PathBuf>,
        /// Attempt the mount instead of a dry run
        #[arg(long)]
        mount: bool,
    },
    /// Show the service bootstrap order
    Plan,
    /// Convert netplan YAML to /etc/network/interfaces format
    Netplan {
        /// Path to netplan YAML configuration file
        input: PathBuf,
        /// Output directory for generated files (default: write to /etc)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Print generated configs to stdout instead of writing files
        #[arg(short, long)]
        dry_run: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = match (&args.command, args.verbose) {
        (Commands::Diagnose { .. }, true) => "trace",
        (Commands::Diagnose { .. }, false) => "debug",
        (_, true) => "debug",
        (_, false) => "info",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    debug!(config = %args.config.display(), "Using boot configuration");

    match args.command {
        Commands::Diagnose {
            root,
            cmdline,
            mount,
        } => {
            let mut config = BootConfig::load(&args.config)?;
            if let Some(cmdline) = cmdline {
                config.boot.cmdline_path = cmdline;
            }
            diagnose::run(
                &config,
                &diagnose::DiagnoseOptions {
                    root_override: root,
                    mount,
                },
            )?;
        }
        Commands::Plan => {
            let config = BootConfig::load(&args.config)?.with_env()?;
            let plan = BootstrapPlan::new(standard_units(&config))?;

            println!("Bootstrap plan:");
            for (i, unit) in plan.units().iter().enumerate() {
                println!("  {}. {} [{}]", i + 1, unit.name, unit.mode);
                if !unit.description.is_empty() {
                    println!("       {}", unit.description);
                }
                println!("       run: {}", unit.action);
                if !unit.depends_on.is_empty() {
                    println!("       after: {}", unit.depends_on.join(", "));
                }
            }
            println!(
                "Then: exec {} {} (APP_PORT={})",
                config.app.program,
                config.app.args.join(" "),
                config.services.app_port
            );
        }
        Commands::Netplan {
            input,
            output_dir,
            dry_run,
        } => {
            if !input.exists() {
                bail!("Input file '{}' not found", input.display());
            }
            if !dry_run && output_dir.is_none() && !is_root() {
                bail!(
                    "Root privileges required to write to /etc. \
                     Use --output-dir to write to a custom directory."
                );
            }

            eprintln!("Loading configuration from {}...", input.display());
            let rendered = netplan::convert_file(&input)?;

            if dry_run {
                print!("{}", netplan::dry_run_report(&rendered));
            } else {
                for path in netplan::write_files(&rendered, output_dir.as_deref())? {
                    println!("Wrote {}", path.display());
                }
                println!("Configuration files written successfully!");
            }
        }
    }

    Ok(())
}

/// Check if running as root
fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}
