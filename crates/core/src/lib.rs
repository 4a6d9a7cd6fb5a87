//! Router data plane: wire formats, interfaces, routing, ARP and the
//! packet handler, plus the framed connection to the controller.

pub mod arpcache;
pub mod error;
pub mod hex;
pub mod iface;
pub mod pcap;
pub mod router;
pub mod rtable;
pub mod transport;
pub mod wire;

pub use arpcache::ArpCache;
pub use error::{Result, RouterError};
pub use iface::{Interface, Interfaces};
pub use pcap::PcapWriter;
pub use router::{Outbound, Router};
pub use rtable::{Route, RoutingTable};
pub use transport::{Transport, TransportError};
pub use wire::MacAddr;
