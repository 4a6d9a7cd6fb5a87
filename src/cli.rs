use anyhow::{Context, Result, anyhow};
use clap::Parser;
use srouter_router::{DEFAULT_ADDR, RouterConfig};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Run the controller for the topology described in this TOML file
    #[arg(long, value_name = "TOPOLOGY", env = "SROUTER_TOPOLOGY", conflicts_with_all = ["connect", "hash_secret"])]
    pub controller: Option<PathBuf>,

    /// Address the controller accepts routers on
    #[arg(long, value_name = "ADDR", env = "SROUTER_LISTEN", default_value = DEFAULT_ADDR)]
    pub listen: String,

    /// Run the router against the controller at this address
    #[arg(long, value_name = "ADDR", env = "SROUTER_CONNECT", conflicts_with = "hash_secret")]
    pub connect: Option<String>,

    /// Routing table file
    #[arg(long, value_name = "FILE", env = "SROUTER_RTABLE", default_value = "rtable")]
    pub rtable: PathBuf,

    /// Topology id to open
    #[arg(long, value_name = "ID", env = "SROUTER_TOPO", default_value_t = 0)]
    pub topo: u16,

    /// Virtual host name of this router
    #[arg(long, value_name = "NAME", env = "SROUTER_VHOST", default_value = "vrhost")]
    pub vhost: String,

    /// User to open the topology as [default: $USER]
    #[arg(long, value_name = "USER", env = "SROUTER_USER")]
    pub user: Option<String>,

    /// Secret answering the controller's authentication challenge
    #[arg(long, value_name = "SECRET", env = "SROUTER_SECRET", hide_env_values = true)]
    pub secret: Option<String>,

    /// Capture every frame to this pcap file
    #[arg(long, value_name = "FILE", env = "SROUTER_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Print an Argon2 hash of SECRET for the controller's auth file
    #[arg(long, value_name = "SECRET")]
    pub hash_secret: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Mode {
    Controller { topology: PathBuf, listen: String },
    Router(RouterConfig),
    HashSecret { secret: String },
}

impl Args {
    pub fn mode(&self) -> Result<Mode> {
        if self.controller.is_some() && self.connect.is_some() {
            return Err(anyhow!("--controller and --connect are mutually exclusive"));
        }
        if let Some(secret) = &self.hash_secret {
            if self.controller.is_some() || self.connect.is_some() {
                return Err(anyhow!("--hash-secret cannot be combined with a mode"));
            }
            return Ok(Mode::HashSecret {
                secret: secret.clone(),
            });
        }
        if let Some(topology) = &self.controller {
            return Ok(Mode::Controller {
                topology: topology.clone(),
                listen: self.listen.clone(),
            });
        }
        Ok(Mode::Router(RouterConfig {
            addr: self.connect.clone().unwrap_or_else(|| DEFAULT_ADDR.into()),
            topo_id: self.topo,
            vhost: self.vhost.clone(),
            user: self
                .user
                .clone()
                .or_else(|| std::env::var("USER").ok())
                .unwrap_or_else(|| "unknown".into()),
            secret: self.secret.clone(),
            rtable: self.rtable.clone(),
            log_file: self.log_file.clone(),
        }))
    }
}

pub fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

pub async fn run() -> Result<()> {
    run_with_args(Args::parse()).await.map(|_| ())
}

async fn run_with_args(args: Args) -> Result<String> {
    init_logging();
    let output = dispatch(args.mode()?).await?;
    println!("{output}");
    Ok(output)
}

async fn dispatch(mode: Mode) -> Result<String> {
    match mode {
        Mode::Controller { topology, listen } => {
            tracing::info!("mode = controller");
            srouter_controller::serve(&topology, &listen).await?;
            Ok("controller stopped".into())
        }
        Mode::Router(config) => {
            tracing::info!("mode = router");
            let client = srouter_router::connect(&config).await?;
            let reason = client.run().await.context("router session")?;
            Ok(format!("session closed: {reason}"))
        }
        Mode::HashSecret { secret } => srouter_controller::auth::hash_secret(&secret),
    }
}
