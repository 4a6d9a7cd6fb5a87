//! VNS controller: owns the links of a topology and serves them to one
//! virtual router at a time.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};

pub mod acceptor;
pub mod auth;
pub mod bridge;
pub mod fabric;
pub mod session;
pub mod topology;

pub use bridge::Bridge;
pub use fabric::{FABRIC_DEPTH, Fabric, FabricHandle, PortFrame, fabric};
pub use topology::Topology;

/// State shared by every router session.
#[derive(Clone)]
pub struct Controller {
    pub topology: Arc<Topology>,
    /// Argon2 hash routers must match; `None` disables authentication.
    pub secret_hash: Option<String>,
    pub fabric: FabricHandle,
}

impl Controller {
    pub fn new(topology: Topology, secret_hash: Option<String>, fabric: FabricHandle) -> Self {
        Self {
            topology: Arc::new(topology),
            secret_hash,
            fabric,
        }
    }
}

/// Load `topology_path`, bridge its links and accept routers on `listen`.
pub async fn serve(topology_path: &Path, listen: &str) -> Result<()> {
    let topology = Topology::from_file(topology_path)?;
    let secret_hash = match &topology.auth_file {
        Some(path) => {
            let hash = auth::load_hash(path)
                .with_context(|| format!("reading auth file {}", path.display()))?;
            if hash.is_none() {
                warn!(
                    "auth file {} not found, routers will not be authenticated",
                    path.display()
                );
            }
            hash
        }
        None => None,
    };

    let (links, handle) = fabric(FABRIC_DEPTH);
    let bridge = Bridge::bind(&topology).await?;
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("binding {listen}"))?;
    info!(
        "controller listening on {} with {} interface(s)",
        listener.local_addr()?,
        topology.interfaces.len()
    );

    let ctx = Controller::new(topology, secret_hash, handle);
    tokio::select! {
        res = acceptor::run_tcp(listener, ctx) => res?,
        res = bridge.run(links) => res?,
    }
    Ok(())
}
