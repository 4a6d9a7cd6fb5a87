//! Static routing table.
//!
//! The on-disk format has one route per line:
//!
//! ```text
//! # dest       gateway      mask             iface
//! 0.0.0.0      10.0.1.100   0.0.0.0          eth3
//! 192.168.2.2  192.168.2.2  255.255.255.255  eth1
//! ```

use std::fmt;
use std::net::Ipv4Addr;
use std::path::Path;

use crate::error::{Result, RouterError};
use crate::iface::Interfaces;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub dest: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub iface: String,
}

impl Route {
    fn matches(&self, ip: Ipv4Addr) -> bool {
        let mask = u32::from(self.mask);
        u32::from(ip) & mask == u32::from(self.dest) & mask
    }

    /// Where to send a packet for `dst`: the gateway, or `dst` itself on a
    /// directly connected route.
    pub fn next_hop(&self, dst: Ipv4Addr) -> Ipv4Addr {
        if self.gateway.is_unspecified() {
            dst
        } else {
            self.gateway
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingTable {
    routes: Vec<Route>,
}

impl RoutingTable {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut routes = Vec::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            let &[dest, gateway, mask, iface] = fields.as_slice() else {
                return Err(RouterError::Rtable {
                    line: idx + 1,
                    reason: format!("expected 4 fields, found {}", fields.len()),
                });
            };
            let addr = |field: &str, what: &str| {
                field.parse::<Ipv4Addr>().map_err(|_| RouterError::Rtable {
                    line: idx + 1,
                    reason: format!("invalid {what} {field:?}"),
                })
            };
            routes.push(Route {
                dest: addr(dest, "destination")?,
                gateway: addr(gateway, "gateway")?,
                mask: addr(mask, "mask")?,
                iface: iface.to_string(),
            });
        }
        Ok(Self { routes })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| RouterError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Check that every route leaves through an interface the router has.
    pub fn verify(&self, ifaces: &Interfaces) -> Result<()> {
        if self.routes.is_empty() {
            tracing::warn!("routing table is empty");
        }
        for route in &self.routes {
            if ifaces.by_name(&route.iface).is_none() {
                return Err(RouterError::UnknownInterface {
                    dest: route.dest.to_string(),
                    iface: route.iface.clone(),
                });
            }
        }
        Ok(())
    }

    /// Longest-prefix match for `ip`.
    pub fn lookup(&self, ip: Ipv4Addr) -> Option<&Route> {
        self.routes
            .iter()
            .filter(|r| r.matches(ip))
            .max_by_key(|r| u32::from(r.mask).count_ones())
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl fmt::Display for RoutingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Destination\tGateway\t\tMask\t\tIface")?;
        for r in &self.routes {
            writeln!(f, "{}\t{}\t{}\t{}", r.dest, r.gateway, r.mask, r.iface)?;
        }
        Ok(())
    }
}
