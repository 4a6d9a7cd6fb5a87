//! UDP bridge between the fabric and the hosts at the far end of each link.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, trace, warn};

use crate::fabric::{Fabric, PortFrame};
use crate::topology::Topology;

const MAX_DATAGRAM: usize = 65_536;
const MIN_BACKOFF: Duration = Duration::from_millis(10);
const MAX_BACKOFF: Duration = Duration::from_secs(1);

/// Errors a UDP socket reports for a peer that went away or a signal; the
/// socket itself is still usable.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

fn next_backoff(prev: Option<Duration>) -> Duration {
    prev.map_or(MIN_BACKOFF, |d| (d * 2).min(MAX_BACKOFF))
}

struct Port {
    iface: String,
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
}

/// Bound UDP sockets, one per interface that has a peer.
pub struct Bridge {
    ports: Vec<Port>,
}

impl Bridge {
    pub async fn bind(topology: &Topology) -> io::Result<Self> {
        let mut ports = Vec::new();
        for iface in &topology.interfaces {
            let Some(peer) = iface.peer else {
                continue;
            };
            let bind = iface
                .bind
                .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 0)));
            let socket = UdpSocket::bind(bind).await?;
            info!(
                "bridging {} between {} and {peer}",
                iface.name,
                socket.local_addr()?
            );
            ports.push(Port {
                iface: iface.name.clone(),
                socket: Arc::new(socket),
                peer,
            });
        }
        Ok(Self { ports })
    }

    pub fn local_addr(&self, iface: &str) -> Option<SocketAddr> {
        self.ports
            .iter()
            .find(|p| p.iface == iface)
            .and_then(|p| p.socket.local_addr().ok())
    }

    /// Shuttle frames until the router side of the fabric goes away.
    pub async fn run(self, fabric: Fabric) -> io::Result<()> {
        let Fabric {
            ingress,
            mut egress,
        } = fabric;

        let readers: Vec<_> = self
            .ports
            .iter()
            .map(|port| {
                let socket = Arc::clone(&port.socket);
                let iface = port.iface.clone();
                let peer = port.peer;
                let ingress = ingress.clone();
                tokio::spawn(read_link(socket, iface, peer, ingress))
            })
            .collect();
        drop(ingress);

        while let Some(PortFrame { iface, frame }) = egress.recv().await {
            match self.ports.iter().find(|p| p.iface == iface) {
                Some(port) => {
                    if let Err(e) = port.socket.send_to(&frame, port.peer).await {
                        warn!("sending {} bytes on {iface} failed: {e}", frame.len());
                    }
                }
                None => trace!("no link attached to {iface}, dropping frame"),
            }
        }

        for reader in readers {
            reader.abort();
        }
        Ok(())
    }
}

async fn read_link(
    socket: Arc<UdpSocket>,
    iface: String,
    peer: SocketAddr,
    ingress: mpsc::Sender<PortFrame>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    let mut backoff = None;
    loop {
        let (n, from) = match socket.recv_from(&mut buf).await {
            Ok(r) => {
                backoff = None;
                r
            }
            Err(e) if is_transient(&e) => {
                let delay = next_backoff(backoff);
                warn!("link {iface} receive failed: {e}, retrying in {delay:?}");
                backoff = Some(delay);
                tokio::time::sleep(delay).await;
                continue;
            }
            Err(e) => {
                error!("link {iface} receive failed: {e}, closing the link");
                return;
            }
        };
        if from != peer {
            debug!("ignoring datagram on {iface} from {from}");
            continue;
        }
        let port = PortFrame {
            iface: iface.clone(),
            frame: buf[..n].to_vec(),
        };
        match ingress.try_send(port) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!("fabric full, dropping frame from {iface}"),
            Err(TrySendError::Closed(_)) => return,
        }
    }
}

/// Bind the bridge for `topology` and run it.
pub async fn run_udp(topology: &Topology, fabric: Fabric) -> io::Result<()> {
    Bridge::bind(topology).await?.run(fabric).await
}
