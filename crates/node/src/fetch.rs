use core::time::Duration;

use iprs_network_primitives::client::RecordNetwork;
use iprs_primitives::{Name, RecordError, VerifiedRecord};
use libp2p_identity::PeerId;
use thiserror::Error;
use tokio::time;

/// Failure to obtain a trustworthy record from one provider.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FetchError {
    #[error("request to {peer_id} failed: {report}")]
    Network { peer_id: PeerId, report: eyre::Report },
    #[error("request to {peer_id} timed out")]
    Timeout { peer_id: PeerId },
    #[error("record from {peer_id} rejected: {source}")]
    Record {
        peer_id: PeerId,
        #[source]
        source: RecordError,
    },
}

/// A provider's copy, verified against the requested name.
#[derive(Clone, Debug)]
pub struct Fetched {
    pub record: VerifiedRecord,
    pub envelope: Vec<u8>,
}

pub(crate) async fn fetch_verified<N>(
    network: &N,
    name: &Name,
    peer_id: PeerId,
    timeout: Duration,
) -> Result<Fetched, FetchError>
where
    N: RecordNetwork + ?Sized,
{
    let envelope = time::timeout(timeout, network.fetch_record(peer_id, name))
        .await
        .map_err(|_elapsed| FetchError::Timeout { peer_id })?
        .map_err(|report| FetchError::Network { peer_id, report })?;

    let record = VerifiedRecord::decode_for(name, &envelope)
        .map_err(|source| FetchError::Record { peer_id, source })?;

    Ok(Fetched { record, envelope })
}
