use std::fmt;
use std::net::Ipv4Addr;

use srouter_proto::{HwInterface, IFACE_NAME_LEN};

use crate::error::{Result, RouterError};
use crate::wire::MacAddr;

/// One router port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub name: String,
    pub mac: MacAddr,
    pub ip: Ipv4Addr,
    pub mask: Ipv4Addr,
}

/// Names must fit the iface field of a Packet message, and lossy decoding
/// leaves U+FFFD where the controller sent bytes that are not UTF-8.
fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= IFACE_NAME_LEN
        && !name.chars().any(|c| c == char::REPLACEMENT_CHARACTER || c.is_control())
}

impl TryFrom<&HwInterface> for Interface {
    type Error = RouterError;

    fn try_from(hw: &HwInterface) -> Result<Self> {
        if !valid_name(&hw.name) {
            return Err(RouterError::BadInterfaceName(hw.name.clone()));
        }
        Ok(Self {
            name: hw.name.clone(),
            mac: MacAddr(hw.mac),
            ip: hw.ip,
            mask: hw.mask,
        })
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<8} HWaddr {}  inet addr {}  mask {}",
            self.name, self.mac, self.ip, self.mask
        )
    }
}

/// The router's interface list.
#[derive(Debug, Clone, Default)]
pub struct Interfaces {
    list: Vec<Interface>,
}

impl Interfaces {
    pub fn new(list: Vec<Interface>) -> Result<Self> {
        let mut ifaces = Self::default();
        for iface in list {
            ifaces.add(iface)?;
        }
        Ok(ifaces)
    }

    /// Build the interface list from a controller hardware announcement.
    pub fn from_hwinfo(hw: &[HwInterface]) -> Result<Self> {
        Self::new(hw.iter().map(Interface::try_from).collect::<Result<_>>()?)
    }

    pub fn add(&mut self, iface: Interface) -> Result<()> {
        if self.by_name(&iface.name).is_some() {
            return Err(RouterError::DuplicateInterface(iface.name));
        }
        self.list.push(iface);
        Ok(())
    }

    pub fn by_name(&self, name: &str) -> Option<&Interface> {
        self.list.iter().find(|i| i.name == name)
    }

    pub fn by_ip(&self, ip: Ipv4Addr) -> Option<&Interface> {
        self.list.iter().find(|i| i.ip == ip)
    }

    pub fn by_mac(&self, mac: MacAddr) -> Option<&Interface> {
        self.list.iter().find(|i| i.mac == mac)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interface> {
        self.list.iter()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eth(name: &str, last: u8) -> Interface {
        Interface {
            name: name.into(),
            mac: MacAddr([0, 0, 0, 0, 0, last]),
            ip: Ipv4Addr::new(10, 0, last, 1),
            mask: Ipv4Addr::new(255, 255, 255, 0),
        }
    }

    #[test]
    fn lookups() {
        let ifaces = Interfaces::new(vec![eth("eth1", 1), eth("eth2", 2)]).unwrap();
        assert_eq!(ifaces.len(), 2);
        assert_eq!(ifaces.by_name("eth2").unwrap().mac, MacAddr([0, 0, 0, 0, 0, 2]));
        assert_eq!(
            ifaces.by_ip(Ipv4Addr::new(10, 0, 1, 1)).unwrap().name,
            "eth1"
        );
        assert_eq!(
            ifaces.by_mac(MacAddr([0, 0, 0, 0, 0, 2])).unwrap().name,
            "eth2"
        );
        assert!(ifaces.by_name("eth3").is_none());
        assert!(ifaces.by_ip(Ipv4Addr::new(10, 0, 3, 1)).is_none());
    }

    #[test]
    fn rejects_duplicate_names() {
        let err = Interfaces::new(vec![eth("eth1", 1), eth("eth1", 2)]).unwrap_err();
        assert!(matches!(err, RouterError::DuplicateInterface(name) if name == "eth1"));
    }

    #[test]
    fn from_hwinfo() {
        let hw = vec![HwInterface {
            name: "eth0".into(),
            mac: [1, 2, 3, 4, 5, 6],
            ip: Ipv4Addr::new(192, 168, 2, 1),
            mask: Ipv4Addr::new(255, 255, 255, 0),
        }];
        let ifaces = Interfaces::from_hwinfo(&hw).unwrap();
        let eth0 = ifaces.by_name("eth0").unwrap();
        assert_eq!(eth0.mac.to_string(), "01:02:03:04:05:06");
        assert_eq!(eth0.ip, Ipv4Addr::new(192, 168, 2, 1));
    }

    #[test]
    fn rejects_undecodable_and_long_names() {
        let mut body = vec![0, 0, 0, 1];
        body.extend_from_slice(&[0xff; 32]);
        let srouter_proto::VnsMessage::HwInfo { entries } =
            srouter_proto::VnsMessage::decode(16, &body).unwrap()
        else {
            panic!("expected hwinfo");
        };
        let hw = srouter_proto::hwinfo_interfaces(&entries);
        assert_eq!(hw.len(), 1);
        let err = Interfaces::from_hwinfo(&hw).unwrap_err();
        assert!(matches!(err, RouterError::BadInterfaceName(_)));

        let long = HwInterface {
            name: "x".repeat(IFACE_NAME_LEN + 1),
            mac: [0; 6],
            ip: Ipv4Addr::UNSPECIFIED,
            mask: Ipv4Addr::UNSPECIFIED,
        };
        assert!(Interfaces::from_hwinfo(&[long]).is_err());
    }
}
