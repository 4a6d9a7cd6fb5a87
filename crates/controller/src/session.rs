use anyhow::{Context, Result, anyhow, bail};
use srouter_core::Transport;
use srouter_proto::VnsMessage;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::Controller;
use crate::auth;
use crate::fabric::PortFrame;

/// Serve one router connection until either side closes it.
pub async fn run<S>(mut transport: Transport<S>, ctx: &Controller) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let res = match handshake(&mut transport, ctx).await {
        Ok(()) => relay(&mut transport, ctx).await,
        Err(e) => Err(e),
    };
    let _ = transport.shutdown().await;
    res
}

async fn handshake<S>(transport: &mut Transport<S>, ctx: &Controller) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut authenticated = ctx.secret_hash.is_none();
    if !authenticated {
        transport
            .send(&VnsMessage::AuthRequest {
                salt: auth::challenge(),
            })
            .await?;
    }

    // The router opens without waiting for the challenge, so Open and
    // AuthReply may arrive in either order.
    let mut opened = false;
    while !opened || !authenticated {
        let msg = transport
            .recv()
            .await
            .ok_or_else(|| anyhow!("router disconnected during handshake"))??;
        match msg {
            VnsMessage::Open {
                topo_id,
                vhost,
                user,
                ..
            } if !opened => {
                info!("router {user}@{vhost} opened topology {topo_id}");
                opened = true;
            }
            VnsMessage::AuthReply { user, key } if !authenticated => {
                let hash = ctx.secret_hash.as_deref().unwrap_or_default();
                if !auth::verify(hash, &key) {
                    transport
                        .send(&VnsMessage::AuthStatus {
                            ok: false,
                            message: "authentication failed".into(),
                        })
                        .await?;
                    bail!("authentication failed for {user}");
                }
                transport
                    .send(&VnsMessage::AuthStatus {
                        ok: true,
                        message: format!("authenticated {user}"),
                    })
                    .await?;
                authenticated = true;
            }
            other => {
                transport.send(&VnsMessage::close("expected open")).await?;
                bail!("unexpected {:?} during handshake", other.message_type());
            }
        }
    }

    if let Some(message) = &ctx.topology.banner {
        transport
            .send(&VnsMessage::Banner {
                message: message.clone(),
            })
            .await?;
    }
    transport.send(&ctx.topology.hwinfo()?).await?;
    Ok(())
}

async fn relay<S>(transport: &mut Transport<S>, ctx: &Controller) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut links = ctx.fabric.attach().await;
    loop {
        tokio::select! {
            msg = transport.recv() => match msg {
                Some(Ok(VnsMessage::Packet { iface, frame })) => {
                    if !ctx.fabric.send(PortFrame { iface, frame }).await {
                        transport.send(&VnsMessage::close("links are down")).await?;
                        bail!("links are down");
                    }
                }
                Some(Ok(VnsMessage::Close { reason })) => {
                    info!("router closed the session: {reason}");
                    return Ok(());
                }
                Some(Ok(other)) => debug!("ignoring {:?} from router", other.message_type()),
                Some(Err(e)) => return Err(e).context("reading from router"),
                None => {
                    info!("router disconnected");
                    return Ok(());
                }
            },
            port = links.recv() => match port {
                Some(PortFrame { iface, frame }) => {
                    transport.send(&VnsMessage::Packet { iface, frame }).await?;
                }
                None => {
                    warn!("links closed, ending session");
                    transport.send(&VnsMessage::close("controller shutting down")).await?;
                    return Ok(());
                }
            },
        }
    }
}
