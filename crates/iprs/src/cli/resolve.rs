use core::pin::pin;
use core::time::Duration;
use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::Parser;
use eyre::Result as EyreResult;
use futures_util::StreamExt;
use iprs_network::client::NetworkClient;
use iprs_network_primitives::config::NodeMode;
use iprs_node::{resolve, LookupConfig, Resolution};
use iprs_primitives::Name;
use iprs_store::RecordStore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::cli::{shutdown_token, start_network, RootArgs};
use crate::defaults;
use crate::keys::load_or_generate;

/// Look names up and print the newest record found for each
#[derive(Debug, Parser)]
pub struct ResolveCommand {
    /// Names to resolve, e.g. /iprs/<fingerprint>
    #[arg(required = true, value_name = "NAME")]
    pub names: Vec<Name>,

    /// Network identity, an ephemeral one is used when omitted
    #[arg(short, long, value_name = "PATH")]
    pub key: Option<Utf8PathBuf>,

    /// Give up after this many seconds
    #[arg(short = 't', long, value_name = "SECONDS")]
    pub timeout: Option<u64>,
}

impl ResolveCommand {
    pub async fn run(self, root_args: RootArgs) -> EyreResult<()> {
        let config = root_args.load_config()?;
        let lookup = config.lookup;

        let identity = load_or_generate(self.key.as_deref(), "network identity")?;
        let network_config = root_args.network_config(
            &config,
            identity,
            NodeMode::Client,
            defaults::dialing_swarm,
        );

        // Records found so far, also served back to peers asking for them.
        let cache = Arc::new(RecordStore::new());

        let peer = Arc::clone(&cache);
        let network = start_network(&network_config, peer).await?;

        let token = shutdown_token(self.timeout.map(Duration::from_secs));
        let tracker = TaskTracker::new();

        for name in &self.names {
            drop(tracker.spawn(resolve_name(
                Arc::clone(&network),
                Arc::clone(&cache),
                name.clone(),
                lookup,
                token.child_token(),
            )));
        }

        tracker.close();
        tracker.wait().await;

        // Unresolved names are an outcome, not a failure.
        for line in summary(&cache, &self.names) {
            println!("{line}");
        }

        Ok(())
    }
}

/// The newest cached record per name, or "not found".
fn summary(cache: &RecordStore, names: &[Name]) -> Vec<String> {
    names
        .iter()
        .map(|name| match cache.record(name) {
            Some(record) => format!("{name} -> {} (order {})", record.target(), record.order()),
            None => format!("{name}: not found"),
        })
        .collect()
}

async fn resolve_name(
    network: Arc<NetworkClient>,
    cache: Arc<RecordStore>,
    name: Name,
    lookup: LookupConfig,
    token: CancellationToken,
) {
    let mut results = pin!(resolve(network, name.clone(), &lookup, token));

    while let Some(resolution) = results.next().await {
        match resolution {
            Resolution::Found { provider, fetched } => {
                println!(
                    "{name}: order {} from {}",
                    fetched.record.order(),
                    provider.peer_id
                );

                match cache.offer(&name, &fetched.envelope) {
                    Ok(acceptance) => debug!(%name, ?acceptance, "Cached resolved record"),
                    Err(err) => warn!(%name, %err, "Verified record failed to cache"),
                }
            }
            Resolution::Failed { provider, error } => {
                println!("{name}: error from {}: {error}", provider.peer_id);
            }
            Resolution::SearchFailed(err) => {
                println!("{name}: {err}");
            }
        }
    }
}
