use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use srouter_core::Transport;
use srouter_proto::VnsMessage;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::{Controller, session};

async fn handle_busy<S>(transport: Transport<S>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let _ = transport.send(&VnsMessage::close("busy")).await;
    let _ = transport.shutdown().await;
}

/// Accept routers on `listener`, serving one session at a time.
pub async fn run_tcp(listener: TcpListener, ctx: Controller) -> tokio::io::Result<()> {
    let active = Arc::new(AtomicBool::new(false));
    loop {
        let (stream, peer) = listener.accept().await?;
        let _ = stream.set_nodelay(true);
        let transport = Transport::new(stream);
        if active.load(Ordering::SeqCst) {
            info!("rejecting router at {peer}: a session is already active");
            tokio::spawn(handle_busy(transport));
        } else {
            active.store(true, Ordering::SeqCst);
            info!("router connected from {peer}");
            let active_clone = Arc::clone(&active);
            let ctx = ctx.clone();
            tokio::spawn(async move {
                match session::run(transport, &ctx).await {
                    Ok(()) => info!("session with {peer} ended"),
                    Err(e) => warn!("session with {peer} failed: {e:#}"),
                }
                active_clone.store(false, Ordering::SeqCst);
            });
        }
    }
}
