use std::collections::hash_map::HashMap;
use std::iter;
use std::sync::Arc;

use eyre::{bail, Result as EyreResult, WrapErr};
use futures_util::StreamExt;
use iprs_network_primitives::client::ProviderCandidate;
use iprs_network_primitives::config::{NetworkConfig, NodeMode};
use iprs_network_primitives::record_protocol::{
    RecordCodec, RecordRequest, RecordResponse, RECORD_PROTOCOL,
};
use iprs_store::Peer;
use libp2p::identify::{Behaviour as IdentifyBehaviour, Config as IdentifyConfig};
use libp2p::kad::store::MemoryStore;
use libp2p::kad::{Behaviour as KadBehaviour, Config as KadConfig, Mode, QueryId};
use libp2p::mdns::tokio::Behaviour as MdnsTokioBehaviour;
use libp2p::mdns::Config as MdnsConfig;
use libp2p::noise::Config as NoiseConfig;
use libp2p::ping::Behaviour as PingBehaviour;
use libp2p::request_response::{
    Behaviour as RequestResponseBehaviour, Config as RequestResponseConfig, OutboundRequestId,
    ProtocolSupport,
};
use libp2p::swarm::behaviour::toggle::Toggle;
use libp2p::swarm::{NetworkBehaviour, Swarm, SwarmEvent};
use libp2p::tcp::Config as TcpConfig;
use libp2p::tls::Config as TlsConfig;
use libp2p::yamux::Config as YamuxConfig;
use libp2p::{Multiaddr, PeerId, StreamProtocol, SwarmBuilder};
use multiaddr::Protocol;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Duration;
use tokio::{select, spawn};
use tracing::{debug, info, trace, warn};

use crate::client::NetworkClient;
use crate::events::EventHandler;

pub mod client;
mod events;

const PROTOCOL_VERSION: &str = concat!("/", env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
const IPRS_KAD_PROTO_NAME: StreamProtocol = StreamProtocol::new("/iprs/kad/1.0.0");

#[derive(NetworkBehaviour)]
struct Behaviour {
    identify: IdentifyBehaviour,
    kad: KadBehaviour<MemoryStore>,
    mdns: Toggle<MdnsTokioBehaviour>,
    ping: PingBehaviour,
    record: RequestResponseBehaviour<RecordCodec>,
}

/// Starts the swarm, listens on the configured addresses and bootstraps the
/// routing table. Inbound record requests are answered by `peer`.
pub async fn run(config: &NetworkConfig, peer: Arc<dyn Peer>) -> EyreResult<NetworkClient> {
    let peer_id = config.identity.public().to_peer_id();

    info!(%peer_id, mode = ?config.mode, "Starting network");

    let (client, event_loop) = init(peer_id, config, peer)?;

    drop(spawn(event_loop.run()));

    let mut listening = false;
    let mut first_failure = None;

    for addr in &config.swarm.listen {
        match client.listen_on(addr.clone()).await {
            Ok(()) => listening = true,
            Err(err) => {
                warn!(%addr, %err, "Failed to listen");
                let _previous = first_failure.get_or_insert((addr, err));
            }
        }
    }

    // One usable address is enough, e.g. on hosts without IPv6.
    if let (false, Some((addr, err))) = (listening, first_failure) {
        return Err(err.wrap_err(format!("failed to listen on {addr}")));
    }

    if let Err(err) = client.bootstrap().await {
        warn!(%err, "Failed to bootstrap Kademlia");
    }

    Ok(client)
}

fn init(
    peer_id: PeerId,
    config: &NetworkConfig,
    peer: Arc<dyn Peer>,
) -> EyreResult<(NetworkClient, EventLoop)> {
    let bootstrap_peers = {
        let mut peers = vec![];

        for mut addr in config.bootstrap.nodes.list.iter().cloned() {
            let Some(Protocol::P2p(peer_id)) = addr.pop() else {
                bail!("Failed to parse peer id from addr {:?}", addr);
            };

            peers.push((peer_id, addr));
        }

        peers
    };

    let mdns = if config.discovery.mdns {
        Some(
            MdnsTokioBehaviour::new(MdnsConfig::default(), peer_id)
                .wrap_err("failed to start mDNS")?,
        )
    } else {
        None
    };

    let swarm = SwarmBuilder::with_existing_identity(config.identity.clone())
        .with_tokio()
        .with_tcp(
            TcpConfig::default(),
            (TlsConfig::new, NoiseConfig::new),
            YamuxConfig::default,
        )?
        .with_quic()
        .with_behaviour(|key| Behaviour {
            identify: IdentifyBehaviour::new(
                IdentifyConfig::new(PROTOCOL_VERSION.to_owned(), key.public())
                    .with_push_listen_addr_updates(true),
            ),
            kad: {
                let kad_config = KadConfig::new(IPRS_KAD_PROTO_NAME);

                let mut kad =
                    KadBehaviour::with_config(peer_id, MemoryStore::new(peer_id), kad_config);

                kad.set_mode(Some(match config.mode {
                    NodeMode::Server => Mode::Server,
                    NodeMode::Client => Mode::Client,
                }));

                for (peer_id, addr) in bootstrap_peers {
                    let _update = kad.add_address(&peer_id, addr);
                }

                kad
            },
            mdns: mdns.into(),
            ping: PingBehaviour::default(),
            record: RequestResponseBehaviour::with_codec(
                RecordCodec,
                iter::once((RECORD_PROTOCOL, ProtocolSupport::Full)),
                RequestResponseConfig::default().with_request_timeout(config.request_timeout),
            ),
        })?
        .with_swarm_config(|cfg| cfg.with_idle_connection_timeout(Duration::from_secs(30)))
        .build();

    let (command_sender, command_receiver) = mpsc::channel(32);

    let client = NetworkClient::new(command_sender);

    let event_loop = EventLoop::new(swarm, command_receiver, peer);

    Ok((client, event_loop))
}

struct PendingProviders {
    window: usize,
    found: Vec<PeerId>,
    sender: oneshot::Sender<EyreResult<Vec<ProviderCandidate>>>,
}

pub(crate) struct EventLoop {
    swarm: Box<Swarm<Behaviour>>,
    command_receiver: mpsc::Receiver<Command>,
    peer: Arc<dyn Peer>,
    known_addresses: HashMap<PeerId, Vec<Multiaddr>>,
    pending_bootstrap: HashMap<QueryId, oneshot::Sender<EyreResult<()>>>,
    pending_start_providing: HashMap<QueryId, oneshot::Sender<EyreResult<()>>>,
    pending_get_providers: HashMap<QueryId, PendingProviders>,
    pending_requests: HashMap<OutboundRequestId, oneshot::Sender<EyreResult<RecordResponse>>>,
}

impl EventLoop {
    fn new(
        swarm: Swarm<Behaviour>,
        command_receiver: mpsc::Receiver<Command>,
        peer: Arc<dyn Peer>,
    ) -> Self {
        Self {
            swarm: Box::new(swarm),
            command_receiver,
            peer,
            known_addresses: HashMap::default(),
            pending_bootstrap: HashMap::default(),
            pending_start_providing: HashMap::default(),
            pending_get_providers: HashMap::default(),
            pending_requests: HashMap::default(),
        }
    }

    pub(crate) async fn run(mut self) {
        #[expect(clippy::redundant_pub_crate, reason = "Needed for Tokio code")]
        loop {
            select! {
                event = self.swarm.next() => {
                    let Some(event) = event else { break };
                    self.handle_swarm_event(event).await;
                },
                command = self.command_receiver.recv() => {
                    let Some(command) = command else { break };
                    self.handle_command(command);
                }
            }
        }

        debug!("Network event loop stopped");
    }

    async fn handle_swarm_event(&mut self, event: SwarmEvent<BehaviourEvent>) {
        match event {
            SwarmEvent::Behaviour(event) => match event {
                BehaviourEvent::Identify(event) => EventHandler::handle(self, event).await,
                BehaviourEvent::Kad(event) => EventHandler::handle(self, event).await,
                BehaviourEvent::Mdns(event) => EventHandler::handle(self, event).await,
                BehaviourEvent::Ping(event) => EventHandler::handle(self, event).await,
                BehaviourEvent::Record(event) => EventHandler::handle(self, event).await,
            },
            SwarmEvent::NewListenAddr { address, .. } => {
                let local_peer_id = *self.swarm.local_peer_id();
                info!("Listening on {}", address.with(Protocol::P2p(local_peer_id)));
            }
            SwarmEvent::ConnectionEstablished {
                peer_id, endpoint, ..
            } => {
                debug!(%peer_id, address = %endpoint.get_remote_address(), "Connection established");
            }
            SwarmEvent::ConnectionClosed { peer_id, cause, .. } => {
                debug!(%peer_id, ?cause, "Connection closed");
            }
            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                debug!(?peer_id, %error, "Outgoing connection failed");
            }
            unhandled => trace!("Unhandled event: {:?}", unhandled),
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::ListenOn { addr, sender } => {
                let _ignored = match self.swarm.listen_on(addr) {
                    Ok(_) => sender.send(Ok(())),
                    Err(err) => sender.send(Err(err.into())),
                };
            }
            Command::Bootstrap { sender } => match self.swarm.behaviour_mut().kad.bootstrap() {
                Ok(query_id) => {
                    drop(self.pending_bootstrap.insert(query_id, sender));
                }
                Err(err) => {
                    let _ignored = sender.send(Err(err.into()));
                }
            },
            Command::StartProviding { key, sender } => {
                match self.swarm.behaviour_mut().kad.start_providing(key.into()) {
                    Ok(query_id) => {
                        drop(self.pending_start_providing.insert(query_id, sender));
                    }
                    Err(err) => {
                        let _ignored = sender.send(Err(err.into()));
                    }
                }
            }
            Command::GetProviders {
                key,
                window,
                sender,
            } => {
                let query_id = self.swarm.behaviour_mut().kad.get_providers(key.into());

                drop(self.pending_get_providers.insert(
                    query_id,
                    PendingProviders {
                        window,
                        found: Vec::new(),
                        sender,
                    },
                ));
            }
            Command::Request {
                peer_id,
                request,
                sender,
            } => {
                for addr in self.known_addresses.get(&peer_id).into_iter().flatten() {
                    self.swarm.add_peer_address(peer_id, addr.clone());
                }

                let request_id = self
                    .swarm
                    .behaviour_mut()
                    .record
                    .send_request(&peer_id, request);

                drop(self.pending_requests.insert(request_id, sender));
            }
        }
    }

    fn remember_address(&mut self, peer_id: PeerId, addr: Multiaddr) {
        let addrs = self.known_addresses.entry(peer_id).or_default();

        if !addrs.contains(&addr) {
            addrs.push(addr);
        }
    }

    fn provider_candidate(&self, peer_id: PeerId) -> ProviderCandidate {
        let addrs = self
            .known_addresses
            .get(&peer_id)
            .cloned()
            .unwrap_or_default();

        ProviderCandidate::new(peer_id, addrs)
    }
}

#[derive(Debug)]
pub(crate) enum Command {
    ListenOn {
        addr: Multiaddr,
        sender: oneshot::Sender<EyreResult<()>>,
    },
    Bootstrap {
        sender: oneshot::Sender<EyreResult<()>>,
    },
    StartProviding {
        key: Vec<u8>,
        sender: oneshot::Sender<EyreResult<()>>,
    },
    GetProviders {
        key: Vec<u8>,
        window: usize,
        sender: oneshot::Sender<EyreResult<Vec<ProviderCandidate>>>,
    },
    Request {
        peer_id: PeerId,
        request: RecordRequest,
        sender: oneshot::Sender<EyreResult<RecordResponse>>,
    },
}
