use std::sync::Arc;

use futures_util::{stream, Stream, StreamExt};
use iprs_network_primitives::client::{ProviderCandidate, RecordNetwork};
use iprs_primitives::Name;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::LookupConfig;
use crate::fetch::{fetch_verified, FetchError, Fetched};
use crate::search::{discover_providers, SearchError};

/// One report from a running lookup.
#[derive(Debug)]
pub enum Resolution {
    Found {
        provider: ProviderCandidate,
        fetched: Fetched,
    },
    Failed {
        provider: ProviderCandidate,
        error: FetchError,
    },
    SearchFailed(SearchError),
}

/// Streams every provider's copy of `name`.
///
/// Up to `max_concurrent_fetches` fetches run at once; reports come out in
/// discovery order. A failed provider is reported and never stops the
/// others. Cancelling `token` drops in-flight fetches and ends the stream.
pub fn resolve<N>(
    network: Arc<N>,
    name: Name,
    config: &LookupConfig,
    token: CancellationToken,
) -> impl Stream<Item = Resolution> + Send + 'static
where
    N: RecordNetwork + ?Sized + 'static,
{
    let timeout = config.request_timeout();
    let limit = config.max_concurrent_fetches.max(1);

    let providers = discover_providers(
        Arc::clone(&network),
        name.object_address(),
        config,
        token.clone(),
    );

    providers
        .flat_map(|batch| {
            stream::iter(match batch {
                Ok(candidates) => candidates.into_iter().map(Ok).collect::<Vec<_>>(),
                Err(err) => vec![Err(err)],
            })
        })
        .map(move |item| {
            let network = Arc::clone(&network);
            let name = name.clone();

            async move {
                let provider = match item {
                    Ok(provider) => provider,
                    Err(err) => {
                        warn!(%name, %err, "Provider search failed");
                        return Resolution::SearchFailed(err);
                    }
                };

                match fetch_verified(&*network, &name, provider.peer_id, timeout).await {
                    Ok(fetched) => {
                        debug!(
                            %name,
                            peer_id = %provider.peer_id,
                            order = fetched.record.order(),
                            "Fetched record"
                        );
                        Resolution::Found { provider, fetched }
                    }
                    Err(error) => {
                        warn!(%name, peer_id = %provider.peer_id, %error, "Failed to fetch record");
                        Resolution::Failed { provider, error }
                    }
                }
            }
        })
        .buffered(limit)
        .take_until(token.cancelled_owned())
}
