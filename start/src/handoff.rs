//! Handoff of PID 1 to the main application.
//!
//! The boot process execs the application in place, so the application
//! keeps our PID and with it signal delivery and orphan reaping. Children
//! started during bootstrap become the application's children.

use crate::config::{AppSection, APP_PORT_ENV};
use crate::error::Error;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::Command;
use tracing::info;

/// The final step of boot. Only a successful bootstrap produces one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handoff {
    program: String,
    args: Vec<String>,
    working_directory: Option<PathBuf>,
    port: u16,
}

impl Handoff {
    pub(crate) fn new(app: &AppSection, port: u16) -> Self {
        Self {
            program: app.program.clone(),
            args: app.args.clone(),
            working_directory: app.working_directory.clone(),
            port,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env(APP_PORT_ENV, self.port.to_string());
        if std::env::var_os("PATH").is_none() {
            cmd.env("PATH", crate::bootstrap::DEFAULT_PATH);
        }
        if let Some(ref dir) = self.working_directory {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Replace this process with the application.
    ///
    /// Never returns on success; the returned error describes why the exec
    /// failed.
    pub fn exec(self) -> Error {
        info!(
            program = %self.program,
            args = ?self.args,
            port = self.port,
            "Handing off to application"
        );

        let err = self.command().exec();
        Error::Handoff {
            program: self.program,
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_carries_port() {
        let handoff = Handoff::new(&AppSection::default(), 5001);
        let cmd = handoff.command();

        assert_eq!(cmd.get_program(), "python3");
        assert_eq!(cmd.get_args().collect::<Vec<_>>(), ["/app/app.py"]);
        let port = cmd
            .get_envs()
            .find(|(k, _)| *k == APP_PORT_ENV)
            .and_then(|(_, v)| v);
        assert_eq!(port, Some(std::ffi::OsStr::new("5001")));
    }

    #[test]
    fn test_working_directory() {
        let app = AppSection {
            working_directory: Some(PathBuf::from("/app")),
            ..AppSection::default()
        };
        let cmd = Handoff::new(&app, 5000).command();
        assert_eq!(cmd.get_current_dir(), Some(std::path::Path::new("/app")));
    }

    #[test]
    fn test_exec_failure_returns_error() {
        let app = AppSection {
            program: "/nonexistent/usbgate-app".to_string(),
            args: Vec::new(),
            working_directory: None,
        };
        let err = Handoff::new(&app, 5000).exec();
        assert!(matches!(err, Error::Handoff { ref program, .. } if program == "/nonexistent/usbgate-app"));
    }
}
