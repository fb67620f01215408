use std::collections::HashSet;
use std::sync::Arc;

use async_stream::stream;
use futures_util::Stream;
use iprs_network_primitives::client::{ProviderCandidate, RecordNetwork};
use iprs_primitives::ObjectAddress;
use thiserror::Error;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::LookupConfig;

#[derive(Debug, Error)]
#[error("provider discovery failed: {0}")]
pub struct SearchError(pub eyre::Report);

/// Lazily discovers providers of `address` in rounds of doubling width.
///
/// Each batch holds only providers not yielded before. The stream ends when a
/// round comes back short of its window, when the next window would pass
/// `max_window`, after yielding a discovery error, or once `token` is
/// cancelled.
pub fn discover_providers<N>(
    network: Arc<N>,
    address: ObjectAddress,
    config: &LookupConfig,
    token: CancellationToken,
) -> impl Stream<Item = Result<Vec<ProviderCandidate>, SearchError>> + Send + 'static
where
    N: RecordNetwork + ?Sized + 'static,
{
    let initial = config.initial_window.max(1);
    let max = config.max_window.max(initial);

    stream! {
        let mut window = initial;
        let mut seen = HashSet::new();

        loop {
            let round = select! {
                biased;
                () = token.cancelled() => break,
                round = network.find_providers(&address, window) => round,
            };

            let found = match round {
                Ok(found) => found,
                Err(err) => {
                    yield Err(SearchError(err));
                    break;
                }
            };

            let exhausted = found.len() < window;

            let fresh: Vec<_> = found
                .into_iter()
                .filter(|candidate| seen.insert(candidate.peer_id))
                .collect();

            debug!(%address, window, fresh = fresh.len(), "Provider search round complete");

            if !fresh.is_empty() {
                yield Ok(fresh);
            }

            if exhausted {
                break;
            }

            match window.checked_mul(2) {
                Some(next) if next <= max => window = next,
                _ => break,
            }
        }
    }
}
