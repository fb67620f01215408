use core::time::Duration;
use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use const_format::concatcp;
use eyre::Result as EyreResult;
use iprs_network::client::NetworkClient;
use iprs_network_primitives::config::{
    BootstrapConfig, BootstrapNodes, DiscoveryConfig, NetworkConfig, NodeMode, SwarmConfig,
};
use iprs_store::Peer;
use libp2p_identity::Keypair;
use multiaddr::Multiaddr;
use tokio::signal::ctrl_c;
use tokio::spawn;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ConfigFile;

mod advertise;
mod genosr;
mod keygen;
mod resolve;
mod update;

use advertise::AdvertiseCommand;
use genosr::GenosrCommand;
use keygen::KeygenCommand;
use resolve::ResolveCommand;
use update::UpdateCommand;

pub const EXAMPLES: &str = r"
  # Create a signing key
  $ iprs keygen -o alice.key

  # Sign a record pointing at some content
  $ iprs genosr /ipfs/QmFoo -k alice.key -o site.osr

  # Serve the record and announce it every ten minutes
  $ iprs advertise site.osr -k alice.key -t 600

  # Look a name up, giving up after 30 seconds
  $ iprs --bootstrap /ip4/10.0.0.1/tcp/4001/p2p/<peer-id> resolve /iprs/<fingerprint> -t 30

  # Push a newer record to providers still serving an older one
  $ iprs update site.osr
";

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
#[command(after_help = concatcp!(
    "Environment variables:\n",
    "  IPRS_CONFIG       Configuration file\n",
    "  IPRS_LISTEN       Listen addresses, comma separated\n",
    "  IPRS_BOOTSTRAP    Bootstrap peers, comma separated\n",
    "  IPRS_MDNS         Discover peers on the local network\n\n",
    "Examples:",
    EXAMPLES
))]
pub struct RootCommand {
    #[command(flatten)]
    pub args: RootArgs,

    #[command(subcommand)]
    pub action: SubCommands,
}

#[derive(Debug, Subcommand)]
pub enum SubCommands {
    Keygen(KeygenCommand),
    #[command(alias = "sign")]
    Genosr(GenosrCommand),
    #[command(alias = "serve")]
    Advertise(AdvertiseCommand),
    Resolve(ResolveCommand),
    Update(UpdateCommand),
}

#[derive(Debug, Parser)]
pub struct RootArgs {
    /// Configuration file
    #[arg(long, short = 'c', global = true, value_name = "PATH")]
    #[arg(env = "IPRS_CONFIG", hide_env_values = true)]
    pub config: Option<Utf8PathBuf>,

    /// Address to listen on, replaces the configured ones
    #[arg(long, global = true, value_name = "MULTIADDR", value_delimiter = ',')]
    #[arg(env = "IPRS_LISTEN")]
    pub listen: Vec<Multiaddr>,

    /// Peer to bootstrap from, added to the configured ones
    #[arg(long, global = true, value_name = "MULTIADDR", value_delimiter = ',')]
    #[arg(env = "IPRS_BOOTSTRAP")]
    pub bootstrap: Vec<Multiaddr>,

    /// Discover peers on the local network
    #[arg(long, global = true, env = "IPRS_MDNS")]
    pub mdns: bool,
}

impl RootCommand {
    pub async fn run(self) -> EyreResult<()> {
        match self.action {
            SubCommands::Keygen(keygen) => keygen.run(),
            SubCommands::Genosr(genosr) => genosr.run(),
            SubCommands::Advertise(advertise) => advertise.run(self.args).await,
            SubCommands::Resolve(resolve) => resolve.run(self.args).await,
            SubCommands::Update(update) => update.run(self.args).await,
        }
    }
}

impl RootArgs {
    pub fn load_config(&self) -> EyreResult<ConfigFile> {
        match &self.config {
            Some(path) => ConfigFile::load(path),
            None => Ok(ConfigFile::default()),
        }
    }

    /// Merges flags over `file`. `--listen` wins over the file's swarm
    /// section, which wins over `fallback`.
    pub fn network_config(
        &self,
        file: &ConfigFile,
        identity: Keypair,
        mode: NodeMode,
        fallback: fn() -> SwarmConfig,
    ) -> NetworkConfig {
        let swarm = if self.listen.is_empty() {
            file.swarm.clone().unwrap_or_else(fallback)
        } else {
            SwarmConfig::new(self.listen.clone())
        };

        let mut nodes = file.bootstrap.nodes.list.clone();
        nodes.extend(self.bootstrap.iter().cloned());

        NetworkConfig::new(
            identity,
            mode,
            swarm,
            BootstrapConfig::new(BootstrapNodes::new(nodes)),
            DiscoveryConfig::new(self.mdns || file.discovery.mdns),
            file.lookup.request_timeout(),
        )
    }
}

/// Starts the network and prints how to reach this node.
pub async fn start_network(
    config: &NetworkConfig,
    peer: Arc<dyn Peer>,
) -> EyreResult<Arc<NetworkClient>> {
    let client = iprs_network::run(config, peer).await?;

    println!("Peer id: {}", config.identity.public().to_peer_id());

    Ok(Arc::new(client))
}

/// A token cancelled on Ctrl-C or, when given, once `timeout` elapses.
pub fn shutdown_token(timeout: Option<Duration>) -> CancellationToken {
    let token = CancellationToken::new();

    let interrupted = token.clone();
    drop(spawn(async move {
        match ctrl_c().await {
            Ok(()) => {
                info!("Interrupted, shutting down");
                interrupted.cancel();
            }
            Err(err) => warn!(%err, "Failed to listen for Ctrl-C"),
        }
    }));

    if let Some(timeout) = timeout {
        let expired = token.clone();
        drop(spawn(async move {
            sleep(timeout).await;
            info!(?timeout, "Timed out");
            expired.cancel();
        }));
    }

    token
}
