//! Writing converted configuration to disk.

use crate::convert::{Rendered, WPA_SUPPLICANT_DIR};
use crate::error::Result;
use std::fmt::Write as _;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::info;

/// System location of the interfaces file.
pub const INTERFACES_PATH: &str = "/etc/network/interfaces";

/// Human-readable dump of everything that would be written.
pub fn dry_run_report(rendered: &Rendered) -> String {
    let rule = "=".repeat(60);
    let mut out = String::new();

    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "Generated {}:", INTERFACES_PATH);
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "{}", rendered.interfaces);
    let _ = writeln!(out);

    for (iface, content) in &rendered.wpa_configs {
        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(
            out,
            "Generated {}/wpa_supplicant-{}.conf:",
            WPA_SUPPLICANT_DIR, iface
        );
        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out, "{}", content);
        let _ = writeln!(out);
    }

    out
}

/// Write the interfaces file and wpa_supplicant files.
///
/// With `output_dir` the files go to `<dir>/interfaces` and
/// `<dir>/wpa_supplicant/`; otherwise to the system paths. wpa_supplicant
/// files hold passwords and are made readable by the owner only.
pub fn write_files(rendered: &Rendered, output_dir: Option<&Path>) -> Result<Vec<PathBuf>> {
    let (interfaces_path, wpa_dir) = match output_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            (dir.join("interfaces"), dir.join("wpa_supplicant"))
        }
        None => (
            PathBuf::from(INTERFACES_PATH),
            PathBuf::from(WPA_SUPPLICANT_DIR),
        ),
    };
    std::fs::create_dir_all(&wpa_dir)?;
    if let Some(parent) = interfaces_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut written = Vec::new();

    info!(path = %interfaces_path.display(), "Writing interfaces");
    std::fs::write(&interfaces_path, &rendered.interfaces)?;
    written.push(interfaces_path);

    for (iface, content) in &rendered.wpa_configs {
        let path = wpa_dir.join(format!("wpa_supplicant-{}.conf", iface));
        info!(path = %path.display(), "Writing wpa_supplicant config");
        std::fs::write(&path, content)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        written.push(path);
    }

    Ok(written)
}
