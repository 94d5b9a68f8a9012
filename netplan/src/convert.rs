//! Rendering of `/etc/network/interfaces` and wpa_supplicant files.

use crate::error::{NetplanError, Result};
use crate::model::{AccessPoint, InterfaceConfig, NetplanConfig};
use indexmap::IndexMap;
use std::net::Ipv4Addr;

/// Directory holding per-interface wpa_supplicant configuration.
pub const WPA_SUPPLICANT_DIR: &str = "/etc/wpa_supplicant";

/// Path of the wpa_supplicant file referenced for `iface`.
pub fn wpa_conf_path(iface: &str) -> String {
    format!("{}/wpa_supplicant-{}.conf", WPA_SUPPLICANT_DIR, iface)
}

/// Converted output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rendered {
    /// Content of `/etc/network/interfaces`
    pub interfaces: String,
    /// wpa_supplicant content per wifi interface, in file order
    pub wpa_configs: IndexMap<String, String>,
}

/// Convert a netplan document.
pub fn convert(config: &NetplanConfig) -> Result<Rendered> {
    let mut lines: Vec<String> = vec![
        "auto lo".to_string(),
        "iface lo inet loopback".to_string(),
        String::new(),
    ];
    let mut wpa_configs = IndexMap::new();

    for (name, iface) in &config.ethernets {
        interface_block(name, iface, false, &mut lines, &mut wpa_configs)?;
    }

    if !config.ethernets.contains_key("eth0") {
        lines.push("auto eth0".to_string());
        lines.push("iface eth0 inet dhcp".to_string());
        lines.push(String::new());
    }

    for (name, iface) in &config.wifis {
        interface_block(name, iface, true, &mut lines, &mut wpa_configs)?;
    }

    Ok(Rendered {
        interfaces: lines.join("\n"),
        wpa_configs,
    })
}

fn interface_block(
    name: &str,
    iface: &InterfaceConfig,
    is_wifi: bool,
    lines: &mut Vec<String>,
    wpa_configs: &mut IndexMap<String, String>,
) -> Result<()> {
    // Interfaces are always brought up, `optional` or not
    lines.push(format!("auto {}", name));

    if iface.dhcp4 {
        lines.push(format!("iface {} inet dhcp", name));
    } else if !iface.addresses.is_empty() {
        lines.push(format!("iface {} inet static", name));
        for address in &iface.addresses {
            match address.split_once('/') {
                Some((ip, prefix)) => {
                    let netmask = prefix
                        .parse::<u8>()
                        .ok()
                        .and_then(cidr_to_netmask)
                        .ok_or_else(|| NetplanError::InvalidAddress {
                            interface: name.to_string(),
                            address: address.clone(),
                        })?;
                    lines.push(format!("    address {}", ip));
                    lines.push(format!("    netmask {}", netmask));
                }
                None => lines.push(format!("    address {}", address)),
            }
        }

        if let Some(ref gateway) = iface.gateway4 {
            lines.push(format!("    gateway {}", gateway));
        }

        if let Some(ref nameservers) = iface.nameservers {
            if !nameservers.addresses.is_empty() {
                lines.push(format!(
                    "    dns-nameservers {}",
                    nameservers.addresses.join(" ")
                ));
            }
        }
    } else {
        lines.push(format!("iface {} inet manual", name));
    }

    if is_wifi && !iface.access_points.is_empty() {
        wpa_configs.insert(name.to_string(), wpa_supplicant_config(&iface.access_points));
        lines.push("    wpa-driver wext".to_string());
        lines.push(format!("    wpa-conf {}", wpa_conf_path(name)));
    }

    if let Some(mtu) = iface.mtu {
        lines.push(format!("    mtu {}", mtu));
    }

    for route in &iface.routes {
        if let (Some(to), Some(via)) = (&route.to, &route.via) {
            lines.push(format!("    up route add -net {} gw {}", to, via));
            lines.push(format!("    down route del -net {} gw {}", to, via));
        }
    }

    lines.push(String::new());
    Ok(())
}

/// Render a wpa_supplicant configuration with one network per SSID.
pub fn wpa_supplicant_config(access_points: &IndexMap<String, AccessPoint>) -> String {
    let mut lines = vec!["update_config=1".to_string(), String::new()];

    for (ssid, ap) in access_points {
        lines.push("network={".to_string());
        lines.push(format!("    ssid=\"{}\"", ssid));

        if let Some(ref password) = ap.password {
            if is_hashed_psk(password) {
                lines.push(format!("    psk={}", password));
            } else {
                lines.push(format!("    psk=\"{}\"", password));
            }
        }

        if ap.hidden {
            lines.push("    scan_ssid=1".to_string());
        }

        if let Some(priority) = ap.priority {
            lines.push(format!("    priority={}", priority));
        }

        if ap.mode.as_deref() == Some("adhoc") {
            lines.push("    mode=1".to_string());
        }

        if ap.is_open() {
            lines.push("    key_mgmt=NONE".to_string());
        }

        lines.push("}".to_string());
        lines.push(String::new());
    }

    lines.join("\n")
}

/// A pre-hashed PSK is exactly 64 hex digits and goes in unquoted.
fn is_hashed_psk(password: &str) -> bool {
    password.len() == 64 && password.chars().all(|c| c.is_ascii_hexdigit())
}

/// Dotted netmask for a prefix length, `None` above 32.
pub fn cidr_to_netmask(prefix: u8) -> Option<Ipv4Addr> {
    match prefix {
        0 => Some(Ipv4Addr::UNSPECIFIED),
        1..=32 => Some(Ipv4Addr::from(u32::MAX << (32 - u32::from(prefix)))),
        _ => None,
    }
}
