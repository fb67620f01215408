use core::pin::pin;
use core::time::Duration;
use std::fs::read;
use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::Parser;
use eyre::{Result as EyreResult, WrapErr};
use futures_util::StreamExt;
use iprs_network::client::NetworkClient;
use iprs_network_primitives::config::NodeMode;
use iprs_node::{update, LookupConfig, Reference, UpdateEvent, UpdateOutcome};
use iprs_store::{Acceptance, RecordStore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::warn;

use crate::cli::{shutdown_token, start_network, RootArgs};
use crate::defaults;
use crate::keys::load_or_generate;

/// Push records to providers still serving an older order
#[derive(Debug, Parser)]
pub struct UpdateCommand {
    /// Signed record files
    #[arg(required = true, value_name = "RECORD")]
    pub records: Vec<Utf8PathBuf>,

    /// Network identity, an ephemeral one is used when omitted
    #[arg(short, long, value_name = "PATH")]
    pub key: Option<Utf8PathBuf>,

    /// Give up after this many seconds
    #[arg(short = 't', long, value_name = "SECONDS")]
    pub timeout: Option<u64>,
}

#[derive(Clone, Copy, Debug, Default)]
struct Tally {
    up_to_date: usize,
    remote_newer: usize,
    repaired: usize,
    failed: usize,
}

impl UpdateCommand {
    pub async fn run(self, root_args: RootArgs) -> EyreResult<()> {
        let config = root_args.load_config()?;
        let lookup = config.lookup;

        let (store, references) = load_references(&self.records)?;

        let identity = load_or_generate(self.key.as_deref(), "network identity")?;
        let network_config = root_args.network_config(
            &config,
            identity,
            NodeMode::Client,
            defaults::dialing_swarm,
        );

        let network = start_network(&network_config, store).await?;

        let token = shutdown_token(self.timeout.map(Duration::from_secs));
        let tracker = TaskTracker::new();

        let tasks: Vec<_> = references
            .iter()
            .map(|reference| {
                tracker.spawn(update_reference(
                    Arc::clone(&network),
                    Arc::clone(reference),
                    lookup,
                    token.child_token(),
                ))
            })
            .collect();

        tracker.close();
        tracker.wait().await;

        for (reference, task) in references.iter().zip(tasks) {
            let tally = task.await?;

            println!(
                "{}: {} up to date, {} repaired, {} newer, {} failed",
                reference.name(),
                tally.up_to_date,
                tally.repaired,
                tally.remote_newer,
                tally.failed
            );
        }

        Ok(())
    }
}

/// Loads every record file into one store and returns a reference per name.
///
/// When several files carry the same name only the highest order is kept, so
/// an older file never gets pushed over a newer one.
fn load_references(
    paths: &[Utf8PathBuf],
) -> EyreResult<(Arc<RecordStore>, Vec<Arc<Reference>>)> {
    let store = Arc::new(RecordStore::new());
    let mut names = Vec::with_capacity(paths.len());

    for path in paths {
        let envelope = read(path).wrap_err_with(|| format!("failed to read {path:?}"))?;
        let reference = Reference::from_envelope(envelope)
            .wrap_err_with(|| format!("{path:?} is not a valid record"))?;
        let name = reference.name();

        match store.offer(name, reference.envelope())? {
            Acceptance::Inserted { .. } => names.push(name.clone()),
            Acceptance::Replaced { previous, order } => {
                warn!(%path, %name, previous, order, "Record supersedes an earlier file");
            }
            acceptance @ (Acceptance::Duplicate { .. } | Acceptance::Stale { .. }) => {
                warn!(%path, %name, ?acceptance, "Skipping record, another file is as new");
            }
        }
    }

    let references = names
        .iter()
        .filter_map(|name| store.get(name))
        .map(|envelope| Reference::from_envelope(envelope).map(Arc::new))
        .collect::<Result<_, _>>()?;

    Ok((store, references))
}

async fn update_reference(
    network: Arc<NetworkClient>,
    reference: Arc<Reference>,
    lookup: LookupConfig,
    token: CancellationToken,
) -> Tally {
    let name = reference.name().clone();
    let mut tally = Tally::default();
    let mut events = pin!(update(network, reference, &lookup, token));

    while let Some(event) = events.next().await {
        match event {
            UpdateEvent::Checked { provider, outcome } => {
                let peer_id = provider.peer_id;

                match outcome {
                    Ok(UpdateOutcome::UpToDate) => {
                        tally.up_to_date += 1;
                        println!("{name}: same record from {peer_id}");
                    }
                    Ok(UpdateOutcome::RemoteNewer { remote }) => {
                        tally.remote_newer += 1;
                        println!("{name}: newer record from {peer_id} ({remote})");
                    }
                    Ok(UpdateOutcome::Repaired { previous }) => {
                        tally.repaired += 1;
                        println!("{name}: old record from {peer_id} ({previous}), sent ours");
                    }
                    Err(err) => {
                        tally.failed += 1;
                        println!("{name}: {err}");
                    }
                }
            }
            UpdateEvent::SearchFailed(err) => println!("{name}: {err}"),
        }
    }

    tally
}
