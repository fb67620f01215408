use core::time::Duration;
use std::fs::read;
use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::Parser;
use eyre::{Result as EyreResult, WrapErr};
use iprs_network_primitives::config::NodeMode;
use iprs_node::advertise::DEFAULT_ADVERTISE_INTERVAL;
use iprs_node::Advertiser;
use iprs_primitives::{Name, VerifiedRecord};
use iprs_store::RecordStore;
use tokio_util::task::TaskTracker;
use tracing::info;

use crate::cli::{shutdown_token, start_network, RootArgs};
use crate::defaults;
use crate::keys::load_or_generate;

/// Serve a signed record and announce it as provider until interrupted
#[derive(Debug, Parser)]
pub struct AdvertiseCommand {
    /// Signed record file
    #[arg(value_name = "RECORD")]
    pub record: Utf8PathBuf,

    /// Name to serve the record under, derived from the record when omitted
    #[arg(value_name = "NAME")]
    pub name: Option<Name>,

    /// Network identity, an ephemeral one is used when omitted
    #[arg(short, long, value_name = "PATH")]
    pub key: Option<Utf8PathBuf>,

    /// Seconds between announcements
    #[arg(short = 't', long, value_name = "SECONDS")]
    #[arg(default_value_t = DEFAULT_ADVERTISE_INTERVAL.as_secs())]
    pub interval: u64,
}

impl AdvertiseCommand {
    pub async fn run(self, root_args: RootArgs) -> EyreResult<()> {
        let config = root_args.load_config()?;

        let envelope =
            read(&self.record).wrap_err_with(|| format!("failed to read {:?}", self.record))?;
        let record = VerifiedRecord::decode(&envelope)
            .wrap_err_with(|| format!("{:?} is not a valid record", self.record))?;

        let name = self.name.unwrap_or_else(|| record.name().clone());

        let store = Arc::new(RecordStore::new());
        let _acceptance = store
            .offer(&name, &envelope)
            .wrap_err_with(|| format!("record cannot be served as {name}"))?;

        println!("Record: {name}");
        println!("Target: {} (order {})", record.target(), record.order());

        let identity = load_or_generate(self.key.as_deref(), "network identity")?;
        let network_config = root_args.network_config(
            &config,
            identity,
            NodeMode::Server,
            defaults::serving_swarm,
        );

        let network = start_network(&network_config, store).await?;

        let token = shutdown_token(None);
        let tracker = TaskTracker::new();

        let advertiser = Advertiser::new(network, name, Duration::from_secs(self.interval));
        let advertising = tracker.spawn(advertiser.run(token));

        tracker.close();
        tracker.wait().await;

        let report = advertising.await?;

        info!(
            announcements = report.announcements,
            failures = report.failures,
            "Stopped advertising"
        );

        Ok(())
    }
}
