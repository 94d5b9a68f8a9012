//! Service bootstrap.
//!
//! Units run strictly one after another. The first unit that fails to
//! launch stops the sequence and fails the boot. Launched daemons are not
//! tracked afterwards; once handoff happens the application inherits them.

use crate::error::{Error, Result};
use crate::plan::BootstrapPlan;
use crate::runtime::RuntimeGuard;
use crate::unit::{BackgroundingMode, LaunchAction, ServiceUnit};
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// PATH given to launched programs; the kernel starts PID 1 without one.
pub const DEFAULT_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Starts the program behind an exec unit.
pub trait UnitLauncher: Send + Sync {
    /// Launch `unit`, returning the PID of the detached process if there
    /// is one to report.
    fn launch(&self, unit: &ServiceUnit) -> Result<Option<u32>>;
}

/// Launches units as real processes.
#[derive(Debug, Default, Clone)]
pub struct SystemLauncher;

impl UnitLauncher for SystemLauncher {
    fn launch(&self, unit: &ServiceUnit) -> Result<Option<u32>> {
        let (program, args) = match &unit.action {
            LaunchAction::Exec { program, args } => (program, args),
            other => {
                return Err(launch_error(
                    unit,
                    format!("not an executable action: {}", other),
                ))
            }
        };

        let mut cmd = Command::new(program);
        cmd.args(args).stdin(Stdio::null());
        if std::env::var_os("PATH").is_none() {
            cmd.env("PATH", DEFAULT_PATH);
        }

        match unit.mode {
            BackgroundingMode::SelfDaemonizing => {
                let status = cmd
                    .status()
                    .map_err(|e| launch_error(unit, format!("{}: {}", program, e)))?;
                if !status.success() {
                    return Err(launch_error(unit, format!("{} exited with {}", program, status)));
                }
                Ok(None)
            }
            BackgroundingMode::RequiresDetach => {
                // Own session, so the child is not tied to our terminal
                unsafe {
                    cmd.pre_exec(|| {
                        nix::unistd::setsid()
                            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
                        Ok(())
                    });
                }

                let child = cmd
                    .spawn()
                    .map_err(|e| launch_error(unit, format!("{}: {}", program, e)))?;
                let pid = child.id();
                debug!(unit = %unit.name, pid = pid, "Detached process");
                Ok(Some(pid))
            }
        }
    }
}

fn launch_error(unit: &ServiceUnit, reason: impl Into<String>) -> Error {
    Error::ServiceLaunch {
        unit: unit.name.clone(),
        reason: reason.into(),
    }
}

/// A unit that was launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchedUnit {
    pub name: String,
    pub pid: Option<u32>,
}

/// Result of a completed bootstrap.
#[derive(Debug, Clone, Default)]
pub struct BootstrapReport {
    pub launched: Vec<LaunchedUnit>,
}

/// Runs a [`BootstrapPlan`] in order, fail-fast.
pub struct ServiceBootstrapper<L = SystemLauncher> {
    launcher: L,
    plan: BootstrapPlan,
}

impl<L: UnitLauncher> ServiceBootstrapper<L> {
    pub fn new(launcher: L, plan: BootstrapPlan) -> Self {
        Self { launcher, plan }
    }

    pub fn plan(&self) -> &BootstrapPlan {
        &self.plan
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Launch every unit of the plan.
    pub async fn run(&self) -> Result<BootstrapReport> {
        let mut guard = RuntimeGuard::new();
        let mut report = BootstrapReport::default();

        info!(units = self.plan.len(), "Starting bootstrap");

        for unit in self.plan.units() {
            for dir in &unit.runtime_dirs {
                guard
                    .ensure_dir(dir)
                    .map_err(|e| launch_error(unit, format!("{}: {}", dir.display(), e)))?;
            }

            let pid = match &unit.action {
                LaunchAction::ClearStaleState(paths) => {
                    guard
                        .clear_markers(paths)
                        .map_err(|e| launch_error(unit, e.to_string()))?;
                    None
                }
                LaunchAction::Settle(delay) => {
                    debug!(unit = %unit.name, delay_ms = delay.as_millis() as u64, "Settling");
                    tokio::time::sleep(*delay).await;
                    None
                }
                LaunchAction::Exec { .. } => {
                    self.launcher.launch(unit).map_err(|e| match e {
                        err @ Error::ServiceLaunch { .. } => err,
                        other => launch_error(unit, other.to_string()),
                    })?
                }
            };

            info!(unit = %unit.name, mode = %unit.mode, pid = ?pid, "Unit launched");
            report.launched.push(LaunchedUnit {
                name: unit.name.clone(),
                pid,
            });
        }

        guard.commit();
        info!(units = report.launched.len(), "Bootstrap complete");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        launched: Mutex<Vec<String>>,
        fail: Option<&'static str>,
    }

    impl UnitLauncher for Recorder {
        fn launch(&self, unit: &ServiceUnit) -> Result<Option<u32>> {
            if self.fail == Some(unit.name.as_str()) {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no such file",
                )));
            }
            self.launched.lock().unwrap().push(unit.name.clone());
            Ok(None)
        }
    }

    fn exec(name: &str) -> ServiceUnit {
        ServiceUnit::exec(name, name, &[], BackgroundingMode::SelfDaemonizing)
    }

    #[tokio::test]
    async fn test_runs_in_plan_order() {
        let plan = BootstrapPlan::new(vec![
            exec("one"),
            ServiceUnit::builtin("pause", LaunchAction::Settle(Duration::ZERO)),
            exec("two"),
        ])
        .unwrap();
        let bootstrapper = ServiceBootstrapper::new(Recorder::default(), plan);

        let report = bootstrapper.run().await.unwrap();
        let names: Vec<&str> = report.launched.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, ["one", "pause", "two"]);
        assert_eq!(*bootstrapper.launcher().launched.lock().unwrap(), ["one", "two"]);
    }

    #[tokio::test]
    async fn test_failure_stops_sequence() {
        let plan = BootstrapPlan::new(vec![exec("one"), exec("two"), exec("three")]).unwrap();
        let launcher = Recorder {
            fail: Some("two"),
            ..Default::default()
        };
        let bootstrapper = ServiceBootstrapper::new(launcher, plan);

        let err = bootstrapper.run().await.unwrap_err();
        assert!(matches!(err, Error::ServiceLaunch { ref unit, .. } if unit == "two"));
        assert!(err.is_fatal());
        assert_eq!(*bootstrapper.launcher().launched.lock().unwrap(), ["one"]);
    }

    #[tokio::test]
    async fn test_failure_rolls_back_runtime_state() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = dir.path().join("run/dbus");
        let marker = dir.path().join("dbus.pid");

        let plan = BootstrapPlan::new(vec![
            ServiceUnit::builtin("cleanup", LaunchAction::ClearStaleState(vec![marker.clone()])),
            exec("bus").with_runtime_dir(&runtime).depends_on("cleanup"),
            exec("broken").depends_on("bus"),
        ])
        .unwrap();
        let launcher = Recorder {
            fail: Some("broken"),
            ..Default::default()
        };

        assert!(ServiceBootstrapper::new(launcher, plan).run().await.is_err());
        assert!(!runtime.exists());
    }

    /// Writes the bus socket when "bus" launches, fails on "broken".
    struct BusLauncher {
        socket: PathBuf,
    }

    impl UnitLauncher for BusLauncher {
        fn launch(&self, unit: &ServiceUnit) -> Result<Option<u32>> {
            match unit.name.as_str() {
                "bus" => {
                    std::fs::write(&self.socket, "")?;
                    Ok(Some(4242))
                }
                "broken" => Err(launch_error(unit, "exited with 1")),
                _ => Ok(None),
            }
        }
    }

    #[tokio::test]
    async fn test_failure_leaves_launched_daemon_state() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = dir.path().join("run/dbus");
        let socket = runtime.join("system_bus_socket");

        let plan = BootstrapPlan::new(vec![
            ServiceUnit::builtin("cleanup", LaunchAction::ClearStaleState(vec![socket.clone()])),
            exec("bus").with_runtime_dir(&runtime).depends_on("cleanup"),
            exec("broken").depends_on("bus"),
        ])
        .unwrap();
        let launcher = BusLauncher {
            socket: socket.clone(),
        };

        let err = ServiceBootstrapper::new(launcher, plan).run().await.unwrap_err();
        assert!(matches!(err, Error::ServiceLaunch { ref unit, .. } if unit == "broken"));
        assert!(socket.exists());
        assert!(runtime.is_dir());
    }

    #[tokio::test]
    async fn test_success_keeps_runtime_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let runtime: PathBuf = dir.path().join("run/dbus");

        let plan = BootstrapPlan::new(vec![exec("bus").with_runtime_dir(&runtime)]).unwrap();
        ServiceBootstrapper::new(Recorder::default(), plan)
            .run()
            .await
            .unwrap();
        assert!(runtime.is_dir());
    }

    #[tokio::test]
    async fn test_system_launcher_exit_status() {
        let ok = ServiceUnit::exec("ok", "true", &[], BackgroundingMode::SelfDaemonizing);
        assert_eq!(SystemLauncher.launch(&ok).unwrap(), None);

        let bad = ServiceUnit::exec("bad", "false", &[], BackgroundingMode::SelfDaemonizing);
        assert!(matches!(
            SystemLauncher.launch(&bad),
            Err(Error::ServiceLaunch { ref unit, .. }) if unit == "bad"
        ));

        let missing = ServiceUnit::exec(
            "missing",
            "/nonexistent/usbgate-daemon",
            &[],
            BackgroundingMode::RequiresDetach,
        );
        assert!(SystemLauncher.launch(&missing).is_err());
    }

    #[tokio::test]
    async fn test_system_launcher_detaches() {
        let unit = ServiceUnit::exec("sleeper", "sleep", &["0"], BackgroundingMode::RequiresDetach);
        let pid = SystemLauncher.launch(&unit).unwrap();
        assert!(pid.is_some());
    }
}
