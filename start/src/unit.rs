//! Service unit definitions.

use crate::config::BootConfig;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// How a launched program gets into the background.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundingMode {
    /// The program forks into the background itself; the launcher waits
    /// for the foreground part to exit and checks its status.
    SelfDaemonizing,
    /// The program stays in the foreground; the launcher detaches it into
    /// its own session and moves on.
    RequiresDetach,
}

impl fmt::Display for BackgroundingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackgroundingMode::SelfDaemonizing => write!(f, "self-daemonizing"),
            BackgroundingMode::RequiresDetach => write!(f, "detached"),
        }
    }
}

/// What a unit does when it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchAction {
    /// Remove stale lock and state files left by a previous boot
    ClearStaleState(Vec<PathBuf>),
    /// Start a program
    Exec { program: String, args: Vec<String> },
    /// Pause before continuing
    Settle(Duration),
}

impl fmt::Display for LaunchAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchAction::ClearStaleState(paths) => {
                write!(f, "clear")?;
                for path in paths {
                    write!(f, " {}", path.display())?;
                }
                Ok(())
            }
            LaunchAction::Exec { program, args } => {
                write!(f, "{}", program)?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                Ok(())
            }
            LaunchAction::Settle(delay) => write!(f, "sleep {}s", delay.as_secs_f64()),
        }
    }
}

/// A background service started during boot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUnit {
    /// Unique name of the unit
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// What to run
    pub action: LaunchAction,
    /// How the program gets into the background
    pub mode: BackgroundingMode,
    /// Directories that must exist before the action runs
    pub runtime_dirs: Vec<PathBuf>,
    /// Units that must be launched first
    pub depends_on: Vec<String>,
}

impl ServiceUnit {
    /// Create a unit that execs `program` with `args`.
    pub fn exec(
        name: impl Into<String>,
        program: impl Into<String>,
        args: &[&str],
        mode: BackgroundingMode,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            action: LaunchAction::Exec {
                program: program.into(),
                args: args.iter().map(|a| a.to_string()).collect(),
            },
            mode,
            runtime_dirs: Vec::new(),
            depends_on: Vec::new(),
        }
    }

    /// Create a unit that runs a built-in action.
    pub fn builtin(name: impl Into<String>, action: LaunchAction) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            action,
            mode: BackgroundingMode::SelfDaemonizing,
            runtime_dirs: Vec::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_runtime_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.runtime_dirs.push(dir.into());
        self
    }

    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }
}

/// Runtime directory of the system message bus.
pub const BUS_RUNTIME_DIR: &str = "/var/run/dbus";

/// The fixed boot-time unit list, in launch order.
pub fn standard_units(config: &BootConfig) -> Vec<ServiceUnit> {
    let services = &config.services;
    let port = services.app_port.to_string();

    vec![
        ServiceUnit::builtin(
            "bus-cleanup",
            LaunchAction::ClearStaleState(vec![
                PathBuf::from("/var/run/dbus/pid"),
                PathBuf::from("/var/run/dbus.pid"),
                PathBuf::from("/var/run/dbus/system_bus_socket"),
            ]),
        )
        .with_description("Remove stale message bus state"),
        ServiceUnit::exec(
            "remote-shell",
            "dropbear",
            &["-R"],
            BackgroundingMode::SelfDaemonizing,
        )
        .with_description("SSH server for tunnel access"),
        ServiceUnit::exec(
            "usbip-host",
            "usbipd",
            &["-D"],
            BackgroundingMode::SelfDaemonizing,
        )
        .with_description("USB/IP device sharing daemon"),
        ServiceUnit::exec(
            "message-bus",
            "dbus-daemon",
            &["--system"],
            BackgroundingMode::SelfDaemonizing,
        )
        .with_description("System message bus")
        .with_runtime_dir(BUS_RUNTIME_DIR)
        .depends_on("bus-cleanup"),
        // Heuristic: there is no readiness signal from the bus, so a slow
        // bus can still lose this race.
        ServiceUnit::builtin("bus-settle", LaunchAction::Settle(services.settle_delay()))
            .with_description("Give the message bus time to accept clients")
            .depends_on("message-bus"),
        ServiceUnit::exec(
            "service-discovery",
            "avahi-daemon",
            &["--no-chroot"],
            BackgroundingMode::RequiresDetach,
        )
        .with_description("mDNS/DNS-SD responder")
        .depends_on("bus-settle"),
        ServiceUnit::exec(
            "advertise",
            "avahi-publish-service",
            &[
                services.advertise_name.as_str(),
                services.advertise_type.as_str(),
                port.as_str(),
            ],
            BackgroundingMode::RequiresDetach,
        )
        .with_description("Advertise the application over DNS-SD")
        .depends_on("service-discovery"),
    ]
}
