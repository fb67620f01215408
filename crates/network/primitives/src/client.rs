use async_trait::async_trait;
use eyre::Result as EyreResult;
use iprs_primitives::{Name, ObjectAddress};
use libp2p::{Multiaddr, PeerId};

/// A peer that claims to hold a record for some object address.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProviderCandidate {
    pub peer_id: PeerId,
    pub addrs: Vec<Multiaddr>,
}

impl ProviderCandidate {
    #[must_use]
    pub const fn new(peer_id: PeerId, addrs: Vec<Multiaddr>) -> Self {
        Self { peer_id, addrs }
    }
}

/// Overlay operations the naming layer consumes.
///
/// Dropping a returned future abandons the call.
#[async_trait]
pub trait RecordNetwork: Send + Sync {
    /// Announces that this node provides `address`.
    async fn announce_provider(&self, address: &ObjectAddress) -> EyreResult<()>;

    /// One discovery round returning at most `window` providers of `address`.
    async fn find_providers(
        &self,
        address: &ObjectAddress,
        window: usize,
    ) -> EyreResult<Vec<ProviderCandidate>>;

    /// Fetches the envelope `peer_id` holds for `name`.
    async fn fetch_record(&self, peer_id: PeerId, name: &Name) -> EyreResult<Vec<u8>>;

    /// Pushes `envelope` for `name` to `peer_id`.
    async fn push_record(&self, peer_id: PeerId, name: &Name, envelope: Vec<u8>)
        -> EyreResult<()>;
}
