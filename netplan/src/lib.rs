//! Netplan to `/etc/network/interfaces` conversion.
//!
//! Usbgate images run ifupdown and wpa_supplicant rather than networkd, so
//! network settings written in netplan YAML are converted to the classic
//! interfaces format plus one wpa_supplicant file per wifi interface.
//!
//! ```
//! use usbgate_netplan::{convert, NetplanConfig};
//!
//! let config = NetplanConfig::from_yaml("network:\n  version: 2\n").unwrap();
//! let rendered = convert(&config).unwrap();
//! assert!(rendered.interfaces.contains("iface eth0 inet dhcp"));
//! ```

pub mod convert;
pub mod error;
pub mod model;
pub mod output;

pub use convert::{cidr_to_netmask, convert, wpa_conf_path, Rendered};
pub use error::{NetplanError, Result};
pub use model::{AccessPoint, InterfaceConfig, NetplanConfig};
pub use output::{dry_run_report, write_files, INTERFACES_PATH};

use std::path::Path;

/// Load and convert a netplan file.
pub fn convert_file(path: &Path) -> Result<Rendered> {
    if !path.exists() {
        return Err(NetplanError::NotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    let config = NetplanConfig::from_yaml(&content)?;
    convert(&config)
}
