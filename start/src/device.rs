//! Root device classification and boot partition derivation.
//!
//! The boot partition is always taken to be partition 1 of the device the
//! root filesystem lives on. Rules are evaluated in order and the first
//! match wins; a root device that no rule recognises is reported as
//! unsupported rather than guessed at.

use crate::error::{Error, Result};
use regex::{Captures, Regex};
use std::fmt;
use tracing::trace;

/// Fixed mount point for the boot partition.
pub const BOOT_MOUNT_POINT: &str = "/boot";

/// Storage interconnect inferred from the device name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusFamily {
    /// MMC/SD card (`mmcblk<N>p<P>`)
    Mmc,
    /// SATA, SCSI or USB mass storage (`sd<letter><P>`)
    SataUsb,
    /// NVMe namespace (`nvme<N>n<M>p<P>`)
    Nvme,
    /// No known naming convention
    Unknown,
}

impl fmt::Display for BusFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BusFamily::Mmc => "mmc",
            BusFamily::SataUsb => "sata/usb",
            BusFamily::Nvme => "nvme",
            BusFamily::Unknown => "unknown",
        };
        f.pad(name)
    }
}

/// A classified root device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootDeviceSpec {
    pub bus_family: BusFamily,
    pub raw_path: String,
}

/// Where the boot partition lives and where it gets mounted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootPartitionTarget {
    pub device_path: String,
    pub mount_point: String,
}

impl BootPartitionTarget {
    fn new(device_path: String) -> Self {
        Self {
            device_path,
            mount_point: BOOT_MOUNT_POINT.to_string(),
        }
    }
}

/// One step of a traced resolution, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleDecision {
    pub bus_family: BusFamily,
    pub pattern: String,
    pub matched: bool,
}

impl fmt::Display for RuleDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.matched { "match" } else { "no match" };
        write!(f, "{:<9} {:<40} {}", self.bus_family, self.pattern, verdict)
    }
}

struct Rule {
    bus_family: BusFamily,
    pattern: Regex,
    derive: fn(&Captures<'_>) -> String,
}

/// Ordered `(matcher, deriver)` rules mapping a root device to its boot
/// partition.
pub struct DeviceRoleResolver {
    rules: Vec<Rule>,
}

impl Default for DeviceRoleResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRoleResolver {
    /// Create a resolver with the MMC, SATA/USB and NVMe rules.
    pub fn new() -> Self {
        let rules = vec![
            Rule {
                bus_family: BusFamily::Mmc,
                pattern: Regex::new(r"^(?P<base>/dev/mmcblk[0-9]+)p[0-9]+$")
                    .expect("Invalid MMC regex"),
                derive: |caps| format!("{}p1", &caps["base"]),
            },
            Rule {
                bus_family: BusFamily::SataUsb,
                pattern: Regex::new(r"^(?P<base>/dev/sd[a-z])[0-9]+$")
                    .expect("Invalid SATA regex"),
                derive: |caps| format!("{}1", &caps["base"]),
            },
            Rule {
                bus_family: BusFamily::Nvme,
                pattern: Regex::new(r"^(?P<base>/dev/nvme[0-9]+n[0-9]+)p[0-9]+$")
                    .expect("Invalid NVMe regex"),
                derive: |caps| format!("{}p1", &caps["base"]),
            },
        ];

        Self { rules }
    }

    /// Classify a root device path.
    pub fn classify(&self, root_path: &str) -> RootDeviceSpec {
        let bus_family = self
            .rules
            .iter()
            .find(|rule| rule.pattern.is_match(root_path))
            .map(|rule| rule.bus_family)
            .unwrap_or(BusFamily::Unknown);

        RootDeviceSpec {
            bus_family,
            raw_path: root_path.to_string(),
        }
    }

    /// Derive the boot partition for a root device path.
    pub fn resolve(&self, root_path: &str) -> Result<BootPartitionTarget> {
        self.resolve_traced(root_path).0
    }

    /// Like [`resolve`](Self::resolve), also returning every rule that was
    /// evaluated and whether it matched.
    pub fn resolve_traced(
        &self,
        root_path: &str,
    ) -> (Result<BootPartitionTarget>, Vec<RuleDecision>) {
        let mut decisions = Vec::with_capacity(self.rules.len());

        for rule in &self.rules {
            let captures = rule.pattern.captures(root_path);
            trace!(
                device = root_path,
                bus = %rule.bus_family,
                pattern = rule.pattern.as_str(),
                matched = captures.is_some(),
                "Evaluated device rule"
            );
            decisions.push(RuleDecision {
                bus_family: rule.bus_family,
                pattern: rule.pattern.as_str().to_string(),
                matched: captures.is_some(),
            });

            if let Some(caps) = captures {
                let target = BootPartitionTarget::new((rule.derive)(&caps));
                trace!(
                    device = root_path,
                    boot = %target.device_path,
                    "Derived boot partition"
                );
                return (Ok(target), decisions);
            }
        }

        (
            Err(Error::UnsupportedDevice(root_path.to_string())),
            decisions,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boot_of(path: &str) -> String {
        DeviceRoleResolver::new().resolve(path).unwrap().device_path
    }

    #[test]
    fn test_mmc() {
        assert_eq!(boot_of("/dev/mmcblk0p2"), "/dev/mmcblk0p1");
        assert_eq!(boot_of("/dev/mmcblk12p7"), "/dev/mmcblk12p1");
        assert_eq!(boot_of("/dev/mmcblk1p1"), "/dev/mmcblk1p1");
    }

    #[test]
    fn test_sata_usb() {
        assert_eq!(boot_of("/dev/sda2"), "/dev/sda1");
        assert_eq!(boot_of("/dev/sdz15"), "/dev/sdz1");
    }

    #[test]
    fn test_nvme() {
        assert_eq!(boot_of("/dev/nvme0n1p3"), "/dev/nvme0n1p1");
        assert_eq!(boot_of("/dev/nvme10n2p12"), "/dev/nvme10n2p1");
    }

    #[test]
    fn test_all_digit_combinations_map_to_partition_one() {
        let resolver = DeviceRoleResolver::new();
        for n in ["0", "1", "9", "10", "123"] {
            for p in ["1", "2", "8", "16", "128"] {
                let mmc = resolver.resolve(&format!("/dev/mmcblk{n}p{p}")).unwrap();
                assert_eq!(mmc.device_path, format!("/dev/mmcblk{n}p1"));

                let nvme = resolver.resolve(&format!("/dev/nvme{n}n{p}p{n}")).unwrap();
                assert_eq!(nvme.device_path, format!("/dev/nvme{n}n{p}p1"));
            }
        }
        for letter in 'a'..='z' {
            let target = resolver.resolve(&format!("/dev/sd{letter}3")).unwrap();
            assert_eq!(target.device_path, format!("/dev/sd{letter}1"));
        }
    }

    #[test]
    fn test_mount_point_is_fixed() {
        let target = DeviceRoleResolver::new().resolve("/dev/sda2").unwrap();
        assert_eq!(target.mount_point, "/boot");
    }

    #[test]
    fn test_unsupported() {
        let resolver = DeviceRoleResolver::new();
        for path in [
            "/dev/xvda1",
            "/dev/vda2",
            "/dev/loop0",
            "/dev/sda",
            "/dev/mmcblk0",
            "/dev/nvme0n1",
            "/dev/sdA2",
            "sda2",
            "PARTUUID=1234-02",
            "/dev/mmcblk0p2x",
        ] {
            assert!(
                matches!(resolver.resolve(path), Err(Error::UnsupportedDevice(ref p)) if p == path),
                "{} should be unsupported",
                path
            );
        }
    }

    #[test]
    fn test_classify() {
        let resolver = DeviceRoleResolver::new();
        assert_eq!(resolver.classify("/dev/mmcblk0p2").bus_family, BusFamily::Mmc);
        assert_eq!(resolver.classify("/dev/sdb1").bus_family, BusFamily::SataUsb);
        assert_eq!(resolver.classify("/dev/nvme0n1p2").bus_family, BusFamily::Nvme);
        assert_eq!(resolver.classify("/dev/xvda1").bus_family, BusFamily::Unknown);
        assert_eq!(resolver.classify("/dev/xvda1").raw_path, "/dev/xvda1");
    }

    #[test]
    fn test_trace_stops_at_first_match() {
        let (result, decisions) = DeviceRoleResolver::new().resolve_traced("/dev/sda2");
        assert!(result.is_ok());
        assert_eq!(decisions.len(), 2);
        assert!(!decisions[0].matched);
        assert!(decisions[1].matched);
        assert_eq!(decisions[1].bus_family, BusFamily::SataUsb);
    }

    #[test]
    fn test_trace_records_every_miss() {
        let (result, decisions) = DeviceRoleResolver::new().resolve_traced("/dev/xvda1");
        assert!(result.is_err());
        assert_eq!(decisions.len(), 3);
        assert!(decisions.iter().all(|d| !d.matched));
    }
}
