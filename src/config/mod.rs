use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::error::Error;
use crate::net::InterfaceAddress;

/// CNI version stamped on generated configs and replies.
pub const DEFAULT_CNI_VERSION: &str = "1.0.0";
/// Value of the `type` field that selects this plugin.
pub const PLUGIN_TYPE: &str = "sbcni";
/// Versions `VERSION` reports as supported.
pub const SUPPORTED_VERSIONS: &[&str] = &["0.3.0", "0.3.1", "0.4.0", "1.0.0"];

const IFNAMSIZ: usize = 16;

/// Configuration for installing SBCNI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SbcniConfig {
    /// Path to the CNI bin directory
    pub cni_bin_dir: PathBuf,
    /// Path to the CNI config directory
    pub cni_conf_dir: PathBuf,
    /// Network name written into generated configs
    pub default_network: String,
    /// Bridge name written into generated configs
    pub default_bridge: String,
    /// Container address written into generated configs
    pub default_ip: String,
}

impl Default for SbcniConfig {
    fn default() -> Self {
        Self {
            cni_bin_dir: PathBuf::from("/opt/cni/bin"),
            cni_conf_dir: PathBuf::from("/etc/cni/net.d"),
            default_network: "sbcni".to_string(),
            default_bridge: "sbcni0".to_string(),
            default_ip: "10.22.0.2/24".to_string(),
        }
    }
}

/// Network configuration handed to the plugin on stdin
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetConf {
    /// CNI specification version
    #[serde(rename = "cniVersion", default = "default_cni_version")]
    pub cni_version: String,
    /// Name of the network
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Type of CNI plugin
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub plugin_type: Option<String>,
    /// Bridge to attach the container to
    #[serde(rename = "bridgeName", default, skip_serializing_if = "Option::is_none")]
    pub bridge_name: Option<String>,
    /// Container address in CIDR notation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

fn default_cni_version() -> String {
    DEFAULT_CNI_VERSION.to_string()
}

/// Validated input for one ADD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentSpec {
    pub bridge_name: String,
    pub address: InterfaceAddress,
}

impl NetConf {
    /// Parse NetConf from bytes. Unknown fields are ignored.
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::Input(format!("failed to parse network configuration: {e}")))
    }

    /// Create a configuration for a bridge and address
    pub fn new_default(name: &str, bridge: &str, ip: Option<&str>) -> Self {
        Self {
            cni_version: DEFAULT_CNI_VERSION.to_string(),
            name: Some(name.to_string()),
            plugin_type: Some(PLUGIN_TYPE.to_string()),
            bridge_name: Some(bridge.to_string()),
            ip: ip.map(str::to_string),
        }
    }

    /// Everything ADD needs, fully validated.
    pub fn attachment(&self) -> Result<AttachmentSpec, Error> {
        let bridge_name = self.bridge()?;
        let ip = self
            .ip
            .as_deref()
            .ok_or_else(|| Error::Input("ip is required".to_string()))?;
        Ok(AttachmentSpec {
            bridge_name,
            address: InterfaceAddress::parse(ip)?,
        })
    }

    /// The bridge name alone, which is all DEL needs.
    pub fn bridge(&self) -> Result<String, Error> {
        let name = self
            .bridge_name
            .as_deref()
            .ok_or_else(|| Error::Input("bridgeName is required".to_string()))?;
        validate_ifname("bridgeName", name)?;
        Ok(name.to_string())
    }
}

/// Check a name against the kernel's rules for interface names.
pub fn validate_ifname(field: &str, name: &str) -> Result<(), Error> {
    if name.is_empty() {
        return Err(Error::Input(format!("{field} must not be empty")));
    }
    if name.len() >= IFNAMSIZ {
        return Err(Error::Input(format!(
            "{field} {name:?} is longer than {} bytes",
            IFNAMSIZ - 1
        )));
    }
    if name == "." || name == ".." {
        return Err(Error::Input(format!("{field} {name:?} is reserved")));
    }
    if name.chars().any(|c| c == '/' || c == ':' || c.is_whitespace()) {
        return Err(Error::Input(format!(
            "{field} {name:?} contains '/', ':' or whitespace"
        )));
    }
    Ok(())
}

/// A CNI network configuration list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetConfList {
    #[serde(rename = "cniVersion")]
    pub cni_version: String,
    pub name: String,
    pub plugins: Vec<NetConf>,
}

impl NetConfList {
    /// Wrap a single plugin configuration
    pub fn single(name: &str, bridge: &str, ip: &str) -> Self {
        let mut plugin = NetConf::new_default(name, bridge, Some(ip));
        plugin.name = None;
        Self {
            cni_version: DEFAULT_CNI_VERSION.to_string(),
            name: name.to_string(),
            plugins: vec![plugin],
        }
    }
}

/// Installer for the plugin configuration
pub struct Installer {
    config: SbcniConfig,
}

impl Installer {
    /// Create a new installer
    pub fn new(config: SbcniConfig) -> Self {
        Self { config }
    }

    /// Create CNI directories and write the default network list.
    /// Returns the path of the written config.
    pub fn install(&self) -> Result<PathBuf> {
        for dir in [&self.config.cni_bin_dir, &self.config.cni_conf_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }

        InterfaceAddress::parse(&self.config.default_ip)?;
        validate_ifname("bridge", &self.config.default_bridge)?;

        let list = NetConfList::single(
            &self.config.default_network,
            &self.config.default_bridge,
            &self.config.default_ip,
        );
        let config_path = self
            .config
            .cni_conf_dir
            .join(format!("10-{}.conflist", self.config.default_network));
        let json = serde_json::to_string_pretty(&list)?;
        fs::write(&config_path, json)
            .with_context(|| format!("Failed to write CNI config to {}", config_path.display()))?;

        Ok(config_path)
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// `EnvFilter` directive
    pub filter: String,
    /// Write logs here instead of stderr
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            file: None,
        }
    }
}

impl LogConfig {
    /// Read `SBCNI_LOG` (falling back to `RUST_LOG`) and `SBCNI_LOG_FILE`.
    pub fn from_env() -> Self {
        let filter = env::var("SBCNI_LOG")
            .or_else(|_| env::var("RUST_LOG"))
            .unwrap_or_else(|_| "info".to_string());
        let file = env::var_os("SBCNI_LOG_FILE")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        Self { filter, file }
    }

    /// Install the global subscriber. Never writes to stdout, which belongs
    /// to the CNI result.
    pub fn init(&self) -> Result<()> {
        let filter = EnvFilter::try_new(&self.filter).unwrap_or_else(|_| EnvFilter::new("info"));
        let (writer, ansi) = match &self.file {
            Some(path) => {
                let file = fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("Failed to open log file {}", path.display()))?;
                (BoxMakeWriter::new(Mutex::new(file)), false)
            }
            None => (BoxMakeWriter::new(std::io::stderr), true),
        };

        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(ansi)
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .context("Failed to set default subscriber")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ignores_unknown_fields() {
        let conf = NetConf::parse(
            br#"{"cniVersion":"0.4.0","name":"n","type":"sbcni","bridgeName":"br0","ip":"10.0.0.5/24","mtu":9000}"#,
        )
        .unwrap();
        assert_eq!(conf.cni_version, "0.4.0");
        let spec = conf.attachment().unwrap();
        assert_eq!(spec.bridge_name, "br0");
        assert_eq!(spec.address.to_string(), "10.0.0.5/24");
    }

    #[test]
    fn version_defaults_when_absent() {
        let conf = NetConf::parse(br#"{"bridgeName":"br0"}"#).unwrap();
        assert_eq!(conf.cni_version, DEFAULT_CNI_VERSION);
    }

    #[test]
    fn missing_fields_are_input_errors() {
        let conf = NetConf::parse(br#"{"ip":"10.0.0.5/24"}"#).unwrap();
        assert!(matches!(conf.attachment(), Err(Error::Input(_))));

        let conf = NetConf::parse(br#"{"bridgeName":"br0"}"#).unwrap();
        assert!(matches!(conf.attachment(), Err(Error::Input(_))));
        assert_eq!(conf.bridge().unwrap(), "br0");
    }

    #[test]
    fn malformed_document_is_input_error() {
        assert!(matches!(NetConf::parse(b"{not json"), Err(Error::Input(_))));
    }

    #[test]
    fn interface_names() {
        assert!(validate_ifname("bridgeName", "br-test").is_ok());
        assert!(validate_ifname("bridgeName", "fifteen-chars-x").is_ok());
        assert!(validate_ifname("bridgeName", "sixteen-chars-xx").is_err());
        assert!(validate_ifname("bridgeName", "").is_err());
        assert!(validate_ifname("bridgeName", "..").is_err());
        assert!(validate_ifname("bridgeName", "br/0").is_err());
        assert!(validate_ifname("bridgeName", "br 0").is_err());
    }

    #[test]
    fn conf_list_round_trip_shape() {
        let list = NetConfList::single("net", "br0", "10.0.0.5/24");
        let value = serde_json::to_value(&list).unwrap();
        assert_eq!(value["plugins"][0]["type"], PLUGIN_TYPE);
        assert_eq!(value["plugins"][0]["bridgeName"], "br0");
        assert!(value["plugins"][0].get("name").is_none());
    }

    #[test]
    fn installer_writes_conflist() {
        let dir = tempfile::tempdir().unwrap();
        let config = SbcniConfig {
            cni_bin_dir: dir.path().join("bin"),
            cni_conf_dir: dir.path().join("net.d"),
            ..SbcniConfig::default()
        };
        let path = Installer::new(config).install().unwrap();
        assert!(path.ends_with("10-sbcni.conflist"));
        assert!(dir.path().join("bin").is_dir());

        let list: NetConfList = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(list.plugins[0].bridge().unwrap(), "sbcni0");
    }
}
