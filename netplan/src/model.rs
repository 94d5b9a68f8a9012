//! Netplan configuration model.

use crate::error::{NetplanError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use serde_yaml::Value;

/// Key that may appear among interfaces and is not an interface.
const RENDERER_KEY: &str = "renderer";

/// A parsed netplan document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetplanConfig {
    pub version: u64,
    /// Ethernet interfaces in file order
    pub ethernets: IndexMap<String, InterfaceConfig>,
    /// WiFi interfaces in file order
    pub wifis: IndexMap<String, InterfaceConfig>,
}

/// Settings for one interface.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct InterfaceConfig {
    #[serde(deserialize_with = "flexible_bool")]
    pub dhcp4: bool,
    #[serde(deserialize_with = "flexible_bool")]
    pub dhcp6: bool,
    pub addresses: Vec<String>,
    pub gateway4: Option<String>,
    pub nameservers: Option<Nameservers>,
    pub access_points: IndexMap<String, AccessPoint>,
    pub mtu: Option<u32>,
    pub routes: Vec<Route>,
    #[serde(deserialize_with = "flexible_bool")]
    pub optional: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Nameservers {
    pub addresses: Vec<String>,
    pub search: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Route {
    pub to: Option<String>,
    pub via: Option<String>,
}

/// A WiFi network an interface may join.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AccessPoint {
    #[serde(deserialize_with = "scalar_string")]
    pub password: Option<String>,
    #[serde(deserialize_with = "flexible_bool")]
    pub hidden: bool,
    pub priority: Option<i64>,
    pub mode: Option<String>,
    pub auth: Option<Value>,
}

impl AccessPoint {
    /// Whether the network needs no key management.
    pub fn is_open(&self) -> bool {
        match &self.auth {
            Some(Value::String(auth)) => auth == "open",
            Some(Value::Mapping(map)) => map
                .get("key-management")
                .and_then(Value::as_str)
                .map(|km| km == "none")
                .unwrap_or(false),
            _ => false,
        }
    }
}

impl NetplanConfig {
    /// Parse netplan YAML. Settings may sit under `network:` or at the top
    /// level.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let doc: Value = serde_yaml::from_str(content)?;
        let network = doc.get("network").unwrap_or(&doc);

        let version = match doc.get("version").or_else(|| network.get("version")) {
            None => 2,
            Some(value) => value
                .as_u64()
                .ok_or_else(|| NetplanError::UnsupportedVersion(format!("{:?}", value)))?,
        };
        if version != 2 {
            return Err(NetplanError::UnsupportedVersion(version.to_string()));
        }

        Ok(Self {
            version,
            ethernets: interfaces(network, "ethernets")?,
            wifis: interfaces(network, "wifis")?,
        })
    }
}

fn interfaces(network: &Value, key: &str) -> Result<IndexMap<String, InterfaceConfig>> {
    let mut out = IndexMap::new();
    let Some(Value::Mapping(section)) = network.get(key) else {
        return Ok(out);
    };

    for (name, settings) in section {
        let Some(name) = name.as_str() else {
            continue;
        };
        if name == RENDERER_KEY {
            continue;
        }
        let config = if settings.is_null() {
            InterfaceConfig::default()
        } else {
            serde_yaml::from_value(settings.clone())?
        };
        out.insert(name.to_string(), config);
    }

    Ok(out)
}

/// Accept YAML 1.1 style booleans (`yes`, `on`, ...) as well as real ones.
fn flexible_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Bool(b) => Ok(b),
        Value::Null => Ok(false),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "y" => Ok(true),
            "false" | "no" | "off" | "n" => Ok(false),
            other => Err(serde::de::Error::custom(format!("invalid boolean: {}", other))),
        },
        other => Err(serde::de::Error::custom(format!("invalid boolean: {:?}", other))),
    }
}

/// Accept numbers where a string is expected (e.g. all-digit passwords).
fn scalar_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        other => Err(serde::de::Error::custom(format!("expected a string: {:?}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_section() {
        let config = NetplanConfig::from_yaml(
            r#"
network:
  version: 2
  renderer: networkd
  ethernets:
    eth0:
      dhcp4: true
  wifis:
    wlan0:
      dhcp4: yes
      access-points:
        "home":
          password: "secret123"
"#,
        )
        .unwrap();

        assert_eq!(config.version, 2);
        assert!(config.ethernets["eth0"].dhcp4);
        assert!(config.wifis["wlan0"].dhcp4);
        assert_eq!(
            config.wifis["wlan0"].access_points["home"].password.as_deref(),
            Some("secret123")
        );
    }

    #[test]
    fn test_top_level_settings() {
        let config = NetplanConfig::from_yaml(
            "ethernets:\n  eth1:\n    addresses: [10.0.0.2/8]\n",
        )
        .unwrap();
        assert_eq!(config.ethernets["eth1"].addresses, ["10.0.0.2/8"]);
        assert!(config.wifis.is_empty());
    }

    #[test]
    fn test_renderer_inside_section_is_skipped() {
        let config = NetplanConfig::from_yaml(
            "network:\n  ethernets:\n    renderer: networkd\n    eth0: {}\n    eth1:\n",
        )
        .unwrap();
        let names: Vec<&str> = config.ethernets.keys().map(String::as_str).collect();
        assert_eq!(names, ["eth0", "eth1"]);
    }

    #[test]
    fn test_version_rejected() {
        let err = NetplanConfig::from_yaml("network:\n  version: 1\n").unwrap_err();
        assert!(matches!(err, NetplanError::UnsupportedVersion(ref v) if v == "1"));

        let err = NetplanConfig::from_yaml("version: 3\nnetwork: {}\n").unwrap_err();
        assert!(matches!(err, NetplanError::UnsupportedVersion(ref v) if v == "3"));
    }

    #[test]
    fn test_numeric_password_and_open_auth() {
        let config = NetplanConfig::from_yaml(
            r#"
wifis:
  wlan0:
    access-points:
      cafe:
        auth: open
      lab:
        password: 12345678
        auth:
          key-management: none
"#,
        )
        .unwrap();
        let aps = &config.wifis["wlan0"].access_points;
        assert!(aps["cafe"].is_open());
        assert!(aps["lab"].is_open());
        assert_eq!(aps["lab"].password.as_deref(), Some("12345678"));
    }
}
