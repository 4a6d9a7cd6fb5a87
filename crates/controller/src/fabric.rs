//! Channels joining the router session to the links.

use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, mpsc};

/// Frames buffered in each direction before senders wait or drop.
pub const FABRIC_DEPTH: usize = 256;

/// An Ethernet frame on a named router port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortFrame {
    pub iface: String,
    pub frame: Vec<u8>,
}

/// Link side: frames from hosts go into `ingress`, frames the router sent
/// come out of `egress`.
pub struct Fabric {
    pub ingress: mpsc::Sender<PortFrame>,
    pub egress: mpsc::Receiver<PortFrame>,
}

/// Router side, shared by successive sessions.
#[derive(Clone)]
pub struct FabricHandle {
    to_links: mpsc::Sender<PortFrame>,
    from_links: Arc<Mutex<mpsc::Receiver<PortFrame>>>,
}

pub fn fabric(depth: usize) -> (Fabric, FabricHandle) {
    let (ingress, from_links) = mpsc::channel(depth);
    let (to_links, egress) = mpsc::channel(depth);
    (
        Fabric { ingress, egress },
        FabricHandle {
            to_links,
            from_links: Arc::new(Mutex::new(from_links)),
        },
    )
}

impl FabricHandle {
    pub async fn send(&self, frame: PortFrame) -> bool {
        self.to_links.send(frame).await.is_ok()
    }

    /// Exclusive access to frames arriving from the links for as long as the
    /// guard is held.
    pub async fn attach(&self) -> OwnedMutexGuard<mpsc::Receiver<PortFrame>> {
        Arc::clone(&self.from_links).lock_owned().await
    }
}
