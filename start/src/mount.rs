//! Boot partition mounting.
//!
//! Mounting is best-effort: a failure is reported together with a
//! diagnostic bundle and the caller carries on booting.

use crate::device::BootPartitionTarget;
use crate::error::{Error, Result};
use std::fmt;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, error, info};

/// Something that can mount a block device on a directory.
pub trait MountBackend: Send + Sync {
    /// Mount `device` on `target`, letting the backend pick the filesystem
    /// type.
    fn mount(&self, device: &str, target: &Path) -> Result<()>;
}

/// Mounts through `mount(8)`, which probes the filesystem type itself.
///
/// The call blocks until `mount` returns; there is no timeout.
#[derive(Debug, Default, Clone)]
pub struct MountCommand;

impl MountBackend for MountCommand {
    fn mount(&self, device: &str, target: &Path) -> Result<()> {
        if !target.exists() {
            std::fs::create_dir_all(target)?;
        }

        let output = Command::new("mount")
            .arg(device)
            .arg(target)
            .output()
            .map_err(|e| Error::Mount {
                device: device.to_string(),
                target: target.display().to_string(),
                reason: format!("failed to execute mount: {}", e),
            })?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(Error::Mount {
                device: device.to_string(),
                target: target.display().to_string(),
                reason: format!("{}: {}", output.status, stderr.trim()),
            })
        }
    }
}

/// One line of the mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub source: String,
    pub target: String,
    pub fstype: String,
}

/// Parse `/proc/self/mounts` style content.
pub fn parse_mount_table(content: &str) -> Vec<MountEntry> {
    content
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            Some(MountEntry {
                source: unescape(fields.next()?),
                target: unescape(fields.next()?),
                fstype: fields.next()?.to_string(),
            })
        })
        .collect()
}

/// Decode the octal escapes (`\040` etc.) the kernel uses in mount paths.
fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|b| (b'0'..=b'7').contains(b)) {
                let value = digits.iter().fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
                if let Ok(value) = u8::try_from(value) {
                    out.push(value);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

/// What is gathered when a mount attempt fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticBundle {
    pub device: String,
    pub cmdline: String,
    pub block_devices: Vec<String>,
}

impl DiagnosticBundle {
    /// Collect the bundle, listing block device nodes under `dev_dir`.
    pub fn collect(device: &str, cmdline: &str, dev_dir: &Path) -> Self {
        Self {
            device: device.to_string(),
            cmdline: cmdline.to_string(),
            block_devices: list_block_devices(dev_dir),
        }
    }
}

impl fmt::Display for DiagnosticBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "attempted device: {}", self.device)?;
        writeln!(f, "kernel cmdline: {}", self.cmdline)?;
        if self.block_devices.is_empty() {
            write!(f, "block devices: (none visible)")
        } else {
            write!(f, "block devices: {}", self.block_devices.join(" "))
        }
    }
}

/// Block device nodes directly under `dev_dir`, sorted.
pub fn list_block_devices(dev_dir: &Path) -> Vec<String> {
    let entries = match std::fs::read_dir(dev_dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dev_dir.display(), error = %e, "Cannot list block devices");
            return Vec::new();
        }
    };

    let mut devices: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .file_type()
                .map(|ft| ft.is_block_device())
                .unwrap_or(false)
        })
        .map(|entry| entry.path().display().to_string())
        .collect();
    devices.sort();
    devices
}

/// Outcome of an [`MountExecutor::ensure_mounted`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountOutcome {
    /// The mount point was already in the mount table
    AlreadyMounted,
    /// The device was mounted by this call
    Mounted,
}

/// Idempotent mounter for the boot partition.
pub struct MountExecutor<M = MountCommand> {
    backend: M,
    mount_table: PathBuf,
    dev_dir: PathBuf,
}

impl MountExecutor<MountCommand> {
    /// Create an executor that shells out to `mount(8)`.
    pub fn system(mount_table: impl Into<PathBuf>, dev_dir: impl Into<PathBuf>) -> Self {
        Self::new(MountCommand, mount_table, dev_dir)
    }
}

impl<M: MountBackend> MountExecutor<M> {
    /// Create an executor over an arbitrary backend.
    pub fn new(backend: M, mount_table: impl Into<PathBuf>, dev_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            mount_table: mount_table.into(),
            dev_dir: dev_dir.into(),
        }
    }

    /// Whether anything is mounted on `mount_point`.
    pub fn is_mounted(&self, mount_point: &str) -> Result<bool> {
        let content = std::fs::read_to_string(&self.mount_table)?;
        Ok(parse_mount_table(&content)
            .iter()
            .any(|entry| entry.target == mount_point))
    }

    /// Mount the target unless its mount point is already in use.
    ///
    /// On failure the diagnostic bundle is logged and the mount error is
    /// returned for the caller to report.
    pub fn ensure_mounted(&self, target: &BootPartitionTarget, cmdline: &str) -> Result<MountOutcome> {
        match self.is_mounted(&target.mount_point) {
            Ok(true) => {
                info!(mount_point = %target.mount_point, "Boot partition already mounted");
                return Ok(MountOutcome::AlreadyMounted);
            }
            Ok(false) => {}
            Err(e) => {
                debug!(table = %self.mount_table.display(), error = %e, "Mount table unreadable, attempting mount");
            }
        }

        info!(
            device = %target.device_path,
            mount_point = %target.mount_point,
            "Mounting boot partition"
        );

        match self
            .backend
            .mount(&target.device_path, Path::new(&target.mount_point))
        {
            Ok(()) => {
                info!(device = %target.device_path, "Boot partition mounted");
                Ok(MountOutcome::Mounted)
            }
            Err(e) => {
                let bundle = DiagnosticBundle::collect(&target.device_path, cmdline, &self.dev_dir);
                error!(
                    device = %bundle.device,
                    cmdline = %bundle.cmdline,
                    block_devices = ?bundle.block_devices,
                    error = %e,
                    "Failed to mount boot partition"
                );
                Err(match e {
                    err @ Error::Mount { .. } => err,
                    other => Error::Mount {
                        device: target.device_path.clone(),
                        target: target.mount_point.clone(),
                        reason: other.to_string(),
                    },
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Appends an entry to a mount table file instead of mounting.
    struct TableMount {
        table: PathBuf,
        calls: Mutex<u32>,
    }

    impl MountBackend for TableMount {
        fn mount(&self, device: &str, target: &Path) -> Result<()> {
            *self.calls.lock().unwrap() += 1;
            let mut content = std::fs::read_to_string(&self.table)?;
            content.push_str(&format!("{} {} vfat rw 0 0\n", device, target.display()));
            std::fs::write(&self.table, content)?;
            Ok(())
        }
    }

    struct FailingMount;

    impl MountBackend for FailingMount {
        fn mount(&self, device: &str, target: &Path) -> Result<()> {
            Err(Error::Mount {
                device: device.to_string(),
                target: target.display().to_string(),
                reason: "exit status: 32".to_string(),
            })
        }
    }

    fn target(device: &str) -> BootPartitionTarget {
        BootPartitionTarget {
            device_path: device.to_string(),
            mount_point: "/boot".to_string(),
        }
    }

    #[test]
    fn test_parse_mount_table() {
        let entries = parse_mount_table(
            "proc /proc proc rw,nosuid 0 0\n/dev/mmcblk0p1 /boot vfat rw 0 0\n\nbroken\n",
        );
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].source, "/dev/mmcblk0p1");
        assert_eq!(entries[1].target, "/boot");
        assert_eq!(entries[1].fstype, "vfat");
    }

    #[test]
    fn test_unescape_spaces() {
        let entries = parse_mount_table("/dev/sda1 /mnt/my\\040disk ext4 rw 0 0\n");
        assert_eq!(entries[0].target, "/mnt/my disk");
        assert_eq!(unescape("plain"), "plain");
        assert_eq!(unescape("trailing\\"), "trailing\\");
    }

    #[test]
    fn test_mount_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let table = dir.path().join("mounts");
        std::fs::write(&table, "proc /proc proc rw 0 0\n").unwrap();

        let backend = TableMount {
            table: table.clone(),
            calls: Mutex::new(0),
        };
        let executor = MountExecutor::new(backend, &table, dir.path());

        let first = executor.ensure_mounted(&target("/dev/mmcblk0p1"), "").unwrap();
        let second = executor.ensure_mounted(&target("/dev/mmcblk0p1"), "").unwrap();

        assert_eq!(first, MountOutcome::Mounted);
        assert_eq!(second, MountOutcome::AlreadyMounted);
        assert_eq!(*executor.backend.calls.lock().unwrap(), 1);

        let content = std::fs::read_to_string(&table).unwrap();
        let boot_entries = parse_mount_table(&content)
            .into_iter()
            .filter(|e| e.target == "/boot")
            .count();
        assert_eq!(boot_entries, 1);
    }

    #[test]
    fn test_failure_returns_mount_error() {
        let dir = tempfile::tempdir().unwrap();
        let table = dir.path().join("mounts");
        std::fs::write(&table, "").unwrap();

        let executor = MountExecutor::new(FailingMount, &table, dir.path());
        let err = executor
            .ensure_mounted(&target("/dev/sda1"), "root=/dev/sda2")
            .unwrap_err();
        assert!(matches!(err, Error::Mount { ref device, .. } if device == "/dev/sda1"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_bundle_without_block_devices() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("null"), "").unwrap();

        let bundle = DiagnosticBundle::collect("/dev/sda1", "root=/dev/sda2", dir.path());
        assert!(bundle.block_devices.is_empty());

        let text = bundle.to_string();
        assert!(text.contains("attempted device: /dev/sda1"));
        assert!(text.contains("kernel cmdline: root=/dev/sda2"));
        assert!(text.contains("(none visible)"));
    }

    #[test]
    fn test_list_missing_dev_dir() {
        assert!(list_block_devices(Path::new("/nonexistent/usbgate/dev")).is_empty());
    }
}
