#[cfg(test)]
#[path = "tests/config.rs"]
mod tests;

use core::fmt::{self, Formatter};
use core::net::{Ipv4Addr, Ipv6Addr};
use core::time::Duration;

use libp2p::identity::Keypair;
use multiaddr::{Multiaddr, Protocol};
use serde::de::{Error as SerdeError, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

pub const DEFAULT_PORT: u16 = 4001;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum NodeMode {
    /// Answers DHT queries and record requests.
    #[default]
    Server,
    /// Only issues queries; never stored in other peers' routing tables.
    Client,
}

#[derive(Debug)]
#[non_exhaustive]
pub struct NetworkConfig {
    pub identity: Keypair,
    pub mode: NodeMode,

    pub swarm: SwarmConfig,
    pub bootstrap: BootstrapConfig,
    pub discovery: DiscoveryConfig,

    pub request_timeout: Duration,
}

impl NetworkConfig {
    #[must_use]
    pub const fn new(
        identity: Keypair,
        mode: NodeMode,
        swarm: SwarmConfig,
        bootstrap: BootstrapConfig,
        discovery: DiscoveryConfig,
        request_timeout: Duration,
    ) -> Self {
        Self {
            identity,
            mode,
            swarm,
            bootstrap,
            discovery,
            request_timeout,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct SwarmConfig {
    pub listen: Vec<Multiaddr>,
}

impl SwarmConfig {
    #[must_use]
    pub const fn new(listen: Vec<Multiaddr>) -> Self {
        Self { listen }
    }

    /// TCP and QUIC on every IPv4 and IPv6 interface at `port`.
    #[must_use]
    pub fn all_interfaces(port: u16) -> Self {
        let hosts = [
            Protocol::Ip4(Ipv4Addr::UNSPECIFIED),
            Protocol::Ip6(Ipv6Addr::UNSPECIFIED),
        ];

        let listen = hosts
            .into_iter()
            .flat_map(|host| {
                let tcp = Multiaddr::empty()
                    .with(host.clone())
                    .with(Protocol::Tcp(port));
                let quic = Multiaddr::empty()
                    .with(host)
                    .with(Protocol::Udp(port))
                    .with(Protocol::QuicV1);

                [tcp, quic]
            })
            .collect();

        Self::new(listen)
    }
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self::all_interfaces(DEFAULT_PORT)
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[non_exhaustive]
pub struct BootstrapConfig {
    #[serde(default)]
    pub nodes: BootstrapNodes,
}

impl BootstrapConfig {
    #[must_use]
    pub const fn new(nodes: BootstrapNodes) -> Self {
        Self { nodes }
    }
}

/// Addresses of well-known peers, each ending in `/p2p/<peer-id>`.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(transparent)]
#[non_exhaustive]
pub struct BootstrapNodes {
    #[serde(deserialize_with = "deserialize_bootstrap")]
    pub list: Vec<Multiaddr>,
}

impl BootstrapNodes {
    #[must_use]
    pub const fn new(list: Vec<Multiaddr>) -> Self {
        Self { list }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
#[non_exhaustive]
pub struct DiscoveryConfig {
    #[serde(default)]
    pub mdns: bool,
}

impl DiscoveryConfig {
    #[must_use]
    pub const fn new(mdns: bool) -> Self {
        Self { mdns }
    }
}

fn deserialize_bootstrap<'de, D>(deserializer: D) -> Result<Vec<Multiaddr>, D::Error>
where
    D: Deserializer<'de>,
{
    struct BootstrapVisitor;

    impl<'de> Visitor<'de> for BootstrapVisitor {
        type Value = Vec<Multiaddr>;

        fn expecting(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
            formatter.write_str("a list of multiaddresses")
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            let mut addrs = Vec::new();

            while let Some(addr) = seq.next_element::<Multiaddr>()? {
                let Some(Protocol::P2p(_)) = addr.iter().last() else {
                    return Err(SerdeError::custom(format!(
                        "bootstrap address `{addr}` is missing a peer ID"
                    )));
                };

                addrs.push(addr);
            }

            Ok(addrs)
        }
    }

    deserializer.deserialize_seq(BootstrapVisitor)
}
