use std::fs::File;
use std::io::BufWriter;
use std::time::{Instant, SystemTime};

use anyhow::{Context, Result, anyhow, bail};
use srouter_core::router::ARP_RESEND_INTERVAL;
use srouter_core::{Interfaces, Outbound, PcapWriter, Router, RoutingTable, Transport};
use srouter_proto::{VnsMessage, hwinfo_interfaces};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::RouterConfig;

/// Router connected to a controller.
pub struct VnsClient<S> {
    transport: Transport<S>,
    router: Router,
    pcap: Option<PcapWriter<BufWriter<File>>>,
}

/// Connect to the controller at `config.addr` and complete the handshake.
pub async fn connect(config: &RouterConfig) -> Result<VnsClient<TcpStream>> {
    let stream = TcpStream::connect(&config.addr)
        .await
        .with_context(|| format!("connecting to controller at {}", config.addr))?;
    stream.set_nodelay(true)?;
    info!("connected to controller at {}", config.addr);
    VnsClient::handshake(stream, config).await
}

impl<S> VnsClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Open the topology, answer authentication and wait for the hardware
    /// description of this router.
    pub async fn handshake(stream: S, config: &RouterConfig) -> Result<Self> {
        let mut transport = Transport::new(stream);
        transport
            .send(&VnsMessage::Open {
                topo_id: config.topo_id,
                vhost: config.vhost.clone(),
                user: config.user.clone(),
                pass: String::new(),
            })
            .await?;

        let mut sent_table = None;
        let hw = loop {
            let msg = transport
                .recv()
                .await
                .ok_or_else(|| anyhow!("controller closed the connection during handshake"))??;
            match msg {
                VnsMessage::AuthRequest { salt } => {
                    debug!("authentication requested ({} byte salt)", salt.len());
                    let key = config.secret.clone().unwrap_or_default().into_bytes();
                    transport
                        .send(&VnsMessage::AuthReply {
                            user: config.user.clone(),
                            key,
                        })
                        .await?;
                }
                VnsMessage::AuthStatus { ok, message } => {
                    if !ok {
                        bail!("authentication failed: {message}");
                    }
                    info!("authenticated as {}: {message}", config.user);
                }
                VnsMessage::Banner { message } => info!("{message}"),
                VnsMessage::Rtable { vhost, table } => {
                    debug!("controller sent routing table for {vhost}");
                    sent_table = Some(table);
                }
                VnsMessage::HwInfo { entries } => break hwinfo_interfaces(&entries),
                VnsMessage::Close { reason } => bail!("controller closed the connection: {reason}"),
                other => warn!("unexpected {:?} during handshake", other.message_type()),
            }
        };

        let ifaces = Interfaces::from_hwinfo(&hw)?;
        for iface in ifaces.iter() {
            info!("{iface}");
        }

        let rtable = if config.rtable.exists() {
            RoutingTable::load(&config.rtable)?
        } else if let Some(table) = sent_table {
            info!(
                "{} not found, using the controller's routing table",
                config.rtable.display()
            );
            RoutingTable::parse(&table)?
        } else {
            bail!("routing table {} not found", config.rtable.display());
        };
        rtable.verify(&ifaces)?;
        info!("routing table:\n{rtable}");

        let pcap = match &config.log_file {
            Some(path) => {
                let file = File::create(path)
                    .with_context(|| format!("creating packet log {}", path.display()))?;
                Some(PcapWriter::new(BufWriter::new(file))?)
            }
            None => None,
        };

        Ok(Self {
            transport,
            router: Router::new(ifaces, rtable),
            pcap,
        })
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Serve packets until the controller closes the session. Returns the
    /// controller's reason.
    pub async fn run(mut self) -> Result<String> {
        let mut ticker = tokio::time::interval(ARP_RESEND_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                msg = self.transport.recv() => match msg {
                    Some(Ok(VnsMessage::Packet { iface, frame })) => {
                        self.capture(&frame);
                        let out = self.router.handle_packet(&frame, &iface, Instant::now());
                        self.emit(out).await?;
                    }
                    Some(Ok(VnsMessage::Close { reason })) => {
                        info!("controller closed the session: {reason}");
                        return Ok(reason);
                    }
                    Some(Ok(other)) => debug!("ignoring {:?}", other.message_type()),
                    Some(Err(e)) => return Err(e).context("reading from controller"),
                    None => bail!("controller went away"),
                },
                _ = ticker.tick() => {
                    let out = self.router.tick(Instant::now());
                    self.emit(out).await?;
                }
            }
        }
    }

    async fn emit(&mut self, out: Vec<Outbound>) -> Result<()> {
        for Outbound { iface, frame } in out {
            self.capture(&frame);
            self.transport
                .send(&VnsMessage::Packet { iface, frame })
                .await
                .context("sending to controller")?;
        }
        Ok(())
    }

    fn capture(&mut self, frame: &[u8]) {
        if let Some(pcap) = &mut self.pcap
            && let Err(e) = pcap.write_frame(SystemTime::now(), frame)
        {
            warn!("packet log disabled: {e}");
            self.pcap = None;
        }
    }
}
