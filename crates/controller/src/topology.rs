//! Controller topology file.
//!
//! ```toml
//! banner = "topology 0: client, router, two servers"
//! auth_file = "auth.hash"
//!
//! [[interfaces]]
//! name = "eth1"
//! mac = "02:00:00:00:00:01"
//! ip = "10.0.1.1"
//! mask = "255.255.255.0"
//! peer = "127.0.0.1:9001"
//! bind = "127.0.0.1:9101"
//! ```

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use srouter_core::MacAddr;
use srouter_proto::{HwInterface, IFACE_NAME_LEN, VnsMessage, hwinfo_entries};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub banner: Option<String>,
    /// File holding the Argon2 hash routers must authenticate against.
    pub auth_file: Option<PathBuf>,
    pub interfaces: Vec<InterfaceConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceConfig {
    pub name: String,
    pub mac: String,
    pub ip: Ipv4Addr,
    pub mask: Ipv4Addr,
    /// Host at the far end of the link, reached over UDP.
    pub peer: Option<SocketAddr>,
    /// Local address of the UDP bridge socket. Defaults to an ephemeral
    /// loopback port.
    pub bind: Option<SocketAddr>,
}

impl Topology {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading topology {}", path.display()))?;
        let mut topo = Self::from_toml_str(&content)
            .with_context(|| format!("loading topology {}", path.display()))?;
        if let Some(auth) = topo.auth_file.take() {
            topo.auth_file = Some(match path.parent() {
                Some(dir) if auth.is_relative() => dir.join(auth),
                _ => auth,
            });
        }
        Ok(topo)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let topo: Self = toml::from_str(content).context("TOML parsing error")?;
        topo.validate()?;
        Ok(topo)
    }

    fn validate(&self) -> Result<()> {
        if self.interfaces.is_empty() {
            bail!("topology has no interfaces");
        }
        let mut seen = HashSet::new();
        for iface in &self.interfaces {
            if iface.name.is_empty() || iface.name.len() > IFACE_NAME_LEN {
                bail!(
                    "interface name {:?} must be 1 to {IFACE_NAME_LEN} bytes",
                    iface.name
                );
            }
            if !seen.insert(iface.name.as_str()) {
                bail!("duplicate interface {}", iface.name);
            }
            iface.mac()?;
        }
        Ok(())
    }

    pub fn hw_interfaces(&self) -> Result<Vec<HwInterface>> {
        self.interfaces
            .iter()
            .map(|iface| {
                Ok(HwInterface {
                    name: iface.name.clone(),
                    mac: iface.mac()?.octets(),
                    ip: iface.ip,
                    mask: iface.mask,
                })
            })
            .collect()
    }

    /// Hardware announcement for the router attached to this topology.
    pub fn hwinfo(&self) -> Result<VnsMessage> {
        Ok(VnsMessage::HwInfo {
            entries: hwinfo_entries(&self.hw_interfaces()?),
        })
    }
}

impl InterfaceConfig {
    pub fn mac(&self) -> Result<MacAddr> {
        self.mac
            .parse::<MacAddr>()
            .with_context(|| format!("interface {}", self.name))
    }
}
