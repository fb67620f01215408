use core::cmp::Ordering;
use core::pin::pin;
use core::time::Duration;
use std::sync::Arc;

use async_stream::stream;
use futures_util::{Stream, StreamExt};
use iprs_network_primitives::client::{ProviderCandidate, RecordNetwork};
use iprs_primitives::{Name, RecordError, VerifiedRecord};
use libp2p_identity::PeerId;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::LookupConfig;
use crate::fetch::{fetch_verified, FetchError};
use crate::search::{discover_providers, SearchError};

/// The locally trusted version every provider is compared against.
#[derive(Clone, Debug)]
pub struct Reference {
    record: VerifiedRecord,
    envelope: Vec<u8>,
}

impl Reference {
    /// Verifies `envelope`; the reference is for the name derived from it.
    pub fn from_envelope(envelope: Vec<u8>) -> Result<Self, RecordError> {
        let record = VerifiedRecord::decode(&envelope)?;

        Ok(Self { record, envelope })
    }

    #[must_use]
    pub const fn name(&self) -> &Name {
        self.record.name()
    }

    #[must_use]
    pub const fn order(&self) -> u64 {
        self.record.order()
    }

    #[must_use]
    pub const fn record(&self) -> &VerifiedRecord {
        &self.record
    }

    #[must_use]
    pub fn envelope(&self) -> &[u8] {
        &self.envelope
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UpdateOutcome {
    UpToDate,
    /// The provider holds something newer than the reference. Left alone.
    RemoteNewer { remote: u64 },
    /// The provider held `previous` and was sent the reference.
    Repaired { previous: u64 },
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UpdateError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("failed to push record to {peer_id}: {report}")]
    Push { peer_id: PeerId, report: eyre::Report },
    #[error("push to {peer_id} timed out")]
    PushTimeout { peer_id: PeerId },
}

#[derive(Debug)]
pub enum UpdateEvent {
    Checked {
        provider: ProviderCandidate,
        outcome: Result<UpdateOutcome, UpdateError>,
    },
    SearchFailed(SearchError),
}

enum Step {
    Batch(Option<Result<Vec<ProviderCandidate>, SearchError>>),
    Checked(Result<UpdateEvent, JoinError>),
    Cancelled,
}

/// Compares every provider's copy of the reference's name and pushes the
/// reference to those holding an older order.
///
/// Each provider is checked in its own task, at most `max_concurrent_fetches`
/// at a time. The stream ends once discovery closed and every check was
/// reported, or when `token` is cancelled, in which case outstanding checks
/// are aborted.
pub fn update<N>(
    network: Arc<N>,
    reference: Arc<Reference>,
    config: &LookupConfig,
    token: CancellationToken,
) -> impl Stream<Item = UpdateEvent> + Send + 'static
where
    N: RecordNetwork + ?Sized + 'static,
{
    let timeout = config.request_timeout();
    let permits = Arc::new(Semaphore::new(config.max_concurrent_fetches.max(1)));

    let providers = discover_providers(
        Arc::clone(&network),
        reference.name().object_address(),
        config,
        token.clone(),
    );

    stream! {
        let mut providers = pin!(providers);
        let mut checks = JoinSet::new();
        let mut searching = true;

        loop {
            if !searching && checks.is_empty() {
                break;
            }

            let step = select! {
                biased;
                () = token.cancelled() => Step::Cancelled,
                Some(joined) = checks.join_next(), if !checks.is_empty() => Step::Checked(joined),
                batch = providers.next(), if searching => Step::Batch(batch),
            };

            match step {
                Step::Cancelled => {
                    checks.shutdown().await;
                    break;
                }
                Step::Checked(Ok(event)) => yield event,
                Step::Checked(Err(err)) => {
                    warn!(name = %reference.name(), %err, "Repair task ended abnormally");
                }
                Step::Batch(None) => searching = false,
                Step::Batch(Some(Err(err))) => {
                    warn!(name = %reference.name(), %err, "Provider search failed");
                    yield UpdateEvent::SearchFailed(err);
                }
                Step::Batch(Some(Ok(candidates))) => {
                    for provider in candidates {
                        let network = Arc::clone(&network);
                        let reference = Arc::clone(&reference);
                        let permits = Arc::clone(&permits);

                        let _handle = checks.spawn(async move {
                            let _permit = permits.acquire_owned().await.ok();
                            let outcome =
                                check_provider(&*network, &reference, provider.peer_id, timeout)
                                    .await;
                            UpdateEvent::Checked { provider, outcome }
                        });
                    }
                }
            }
        }
    }
}

async fn check_provider<N>(
    network: &N,
    reference: &Reference,
    peer_id: PeerId,
    timeout: Duration,
) -> Result<UpdateOutcome, UpdateError>
where
    N: RecordNetwork + ?Sized,
{
    let name = reference.name();
    let remote = fetch_verified(network, name, peer_id, timeout)
        .await?
        .record
        .order();

    match remote.cmp(&reference.order()) {
        Ordering::Equal => {
            debug!(%name, %peer_id, order = remote, "Provider is up to date");
            Ok(UpdateOutcome::UpToDate)
        }
        Ordering::Greater => {
            info!(
                %name,
                %peer_id,
                remote,
                local = reference.order(),
                "Provider holds a newer record"
            );
            Ok(UpdateOutcome::RemoteNewer { remote })
        }
        Ordering::Less => {
            time::timeout(
                timeout,
                network.push_record(peer_id, name, reference.envelope().to_vec()),
            )
            .await
            .map_err(|_elapsed| UpdateError::PushTimeout { peer_id })?
            .map_err(|report| UpdateError::Push { peer_id, report })?;

            info!(
                %name,
                %peer_id,
                previous = remote,
                order = reference.order(),
                "Pushed newer record to stale provider"
            );
            Ok(UpdateOutcome::Repaired { previous: remote })
        }
    }
}
