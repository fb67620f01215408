use async_trait::async_trait;
use eyre::{bail, eyre, Result as EyreResult};
use iprs_network_primitives::client::{ProviderCandidate, RecordNetwork};
use iprs_network_primitives::record_protocol::{RecordRequest, RecordResponse};
use iprs_primitives::{Name, ObjectAddress};
use libp2p::{Multiaddr, PeerId};
use tokio::sync::{mpsc, oneshot};

use crate::Command;

/// Handle to the network event loop. Cheap to clone; the loop stops once
/// every handle is dropped.
#[derive(Clone, Debug)]
pub struct NetworkClient {
    sender: mpsc::Sender<Command>,
}

impl NetworkClient {
    pub(crate) const fn new(sender: mpsc::Sender<Command>) -> Self {
        Self { sender }
    }

    async fn call<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<EyreResult<T>>) -> Command,
    ) -> EyreResult<T> {
        let (sender, receiver) = oneshot::channel();

        self.sender
            .send(command(sender))
            .await
            .map_err(|_closed| eyre!("network event loop has stopped"))?;

        receiver
            .await
            .map_err(|_dropped| eyre!("network event loop dropped the request"))?
    }

    pub async fn listen_on(&self, addr: Multiaddr) -> EyreResult<()> {
        self.call(|sender| Command::ListenOn { addr, sender }).await
    }

    pub async fn bootstrap(&self) -> EyreResult<()> {
        self.call(|sender| Command::Bootstrap { sender }).await
    }

    async fn request(&self, peer_id: PeerId, request: RecordRequest) -> EyreResult<RecordResponse> {
        self.call(|sender| Command::Request {
            peer_id,
            request,
            sender,
        })
        .await
    }
}

#[async_trait]
impl RecordNetwork for NetworkClient {
    async fn announce_provider(&self, address: &ObjectAddress) -> EyreResult<()> {
        let key = address.as_bytes().to_vec();

        self.call(|sender| Command::StartProviding { key, sender })
            .await
    }

    async fn find_providers(
        &self,
        address: &ObjectAddress,
        window: usize,
    ) -> EyreResult<Vec<ProviderCandidate>> {
        let key = address.as_bytes().to_vec();

        self.call(|sender| Command::GetProviders {
            key,
            window,
            sender,
        })
        .await
    }

    async fn fetch_record(&self, peer_id: PeerId, name: &Name) -> EyreResult<Vec<u8>> {
        let request = RecordRequest::Get {
            name: name.to_string(),
        };

        match self.request(peer_id, request).await? {
            RecordResponse::Found { envelope } => Ok(envelope),
            RecordResponse::NotFound => bail!("{peer_id} has no record for {name}"),
            RecordResponse::Accepted => bail!("{peer_id} answered a get with an acknowledgement"),
        }
    }

    async fn push_record(&self, peer_id: PeerId, name: &Name, envelope: Vec<u8>) -> EyreResult<()> {
        let request = RecordRequest::Put {
            name: name.to_string(),
            envelope,
        };

        match self.request(peer_id, request).await? {
            RecordResponse::Accepted => Ok(()),
            response => bail!("{peer_id} answered a put with {response:?}"),
        }
    }
}
