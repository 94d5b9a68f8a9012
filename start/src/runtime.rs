//! Scoped runtime state for bootstrap.
//!
//! Stale markers are removed and runtime directories created through a
//! [`RuntimeGuard`]. If bootstrap fails, dropping the guard removes the
//! directories it created that are still empty. Marker paths are left
//! alone on rollback: by then they belong to daemons that did launch.

use crate::error::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Tracks filesystem state touched during bootstrap.
#[derive(Debug, Default)]
pub struct RuntimeGuard {
    created_dirs: Vec<PathBuf>,
    committed: bool,
}

impl RuntimeGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove stale marker files. Missing files are fine.
    pub fn clear_markers(&self, paths: &[PathBuf]) -> Result<()> {
        for path in paths {
            remove_marker(path)?;
        }
        Ok(())
    }

    /// Create `dir` and any missing parents, remembering which ones did not
    /// exist before.
    pub fn ensure_dir(&mut self, dir: &Path) -> Result<()> {
        let mut missing = Vec::new();
        let mut current = Some(dir);
        while let Some(path) = current {
            if path.as_os_str().is_empty() || path.exists() {
                break;
            }
            missing.push(path.to_path_buf());
            current = path.parent();
        }

        std::fs::create_dir_all(dir)?;
        debug!(dir = %dir.display(), created = missing.len(), "Runtime directory ready");

        // Deepest last, so rollback can remove in reverse
        missing.reverse();
        self.created_dirs.extend(missing);
        Ok(())
    }

    /// Keep everything in place.
    pub fn commit(mut self) {
        self.committed = true;
    }

    fn rollback(&mut self) {
        for dir in self.created_dirs.iter().rev() {
            // Only empty directories; anything a daemon left inside stays
            if let Err(e) = std::fs::remove_dir(dir) {
                debug!(dir = %dir.display(), error = %e, "Runtime directory not removed");
            }
        }
    }
}

impl Drop for RuntimeGuard {
    fn drop(&mut self) {
        if !self.committed {
            self.rollback();
        }
    }
}

fn remove_marker(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "Removed stale marker");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_missing_markers() {
        let dir = tempfile::tempdir().unwrap();
        let guard = RuntimeGuard::new();
        guard.clear_markers(&[dir.path().join("pid")]).unwrap();
        guard.commit();
    }

    #[test]
    fn test_clear_removes_existing() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("pid");
        std::fs::write(&marker, "42").unwrap();

        let guard = RuntimeGuard::new();
        guard.clear_markers(&[marker.clone()]).unwrap();
        assert!(!marker.exists());
        guard.commit();
    }

    #[test]
    fn test_commit_keeps_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = dir.path().join("run/dbus");

        let mut guard = RuntimeGuard::new();
        guard.ensure_dir(&runtime).unwrap();
        guard.commit();

        assert!(runtime.is_dir());
    }

    #[test]
    fn test_drop_removes_created_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = dir.path().join("run/dbus");

        {
            let mut guard = RuntimeGuard::new();
            guard.ensure_dir(&runtime).unwrap();
        }

        assert!(!runtime.exists());
        assert!(!dir.path().join("run").exists());
        assert!(dir.path().exists());
    }

    #[test]
    fn test_drop_keeps_state_written_by_daemons() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = dir.path().join("run/dbus");
        let pid_file = dir.path().join("bus.pid");
        let socket = runtime.join("system_bus_socket");

        {
            let mut guard = RuntimeGuard::new();
            guard.clear_markers(&[pid_file.clone(), socket.clone()]).unwrap();
            guard.ensure_dir(&runtime).unwrap();
            // The bus started before a later unit failed
            std::fs::write(&pid_file, "99").unwrap();
            std::fs::write(&socket, "").unwrap();
        }

        assert_eq!(std::fs::read_to_string(&pid_file).unwrap(), "99");
        assert!(socket.exists());
        assert!(runtime.is_dir());
    }

    #[test]
    fn test_rollback_keeps_preexisting_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = dir.path().join("dbus");
        std::fs::create_dir(&runtime).unwrap();

        {
            let mut guard = RuntimeGuard::new();
            guard.ensure_dir(&runtime).unwrap();
        }

        assert!(runtime.is_dir());
    }
}
