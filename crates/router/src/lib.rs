//! Runtime for the virtual router: connects to the controller, learns its
//! interfaces and drives the packet handler.

use std::path::PathBuf;

pub mod local;
pub mod remote;

pub use local::LocalRouter;
pub use remote::{VnsClient, connect};

/// Address of the controller when none is given.
pub const DEFAULT_ADDR: &str = "127.0.0.1:8888";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    /// Controller `host:port`.
    pub addr: String,
    pub topo_id: u16,
    pub vhost: String,
    pub user: String,
    /// Answer to the controller's authentication challenge.
    pub secret: Option<String>,
    /// Routing table file. When it does not exist the table sent by the
    /// controller is used instead.
    pub rtable: PathBuf,
    /// pcap capture of every frame seen or sent.
    pub log_file: Option<PathBuf>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.into(),
            topo_id: 0,
            vhost: "vrhost".into(),
            user: "unknown".into(),
            secret: None,
            rtable: PathBuf::from("rtable"),
            log_file: None,
        }
    }
}
