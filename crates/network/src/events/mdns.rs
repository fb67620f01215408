use libp2p::mdns;
use libp2p::swarm::dial_opts::{DialOpts, PeerCondition};
use owo_colors::OwoColorize;
use tracing::debug;

use super::{EventHandler, EventLoop};

impl EventHandler<mdns::Event> for EventLoop {
    async fn handle(&mut self, event: mdns::Event) {
        debug!("{}: {:?}", "mdns".yellow(), event);

        match event {
            mdns::Event::Discovered(peers) => {
                for (peer_id, addr) in peers {
                    debug!(%peer_id, %addr, "Discovered peer on the local network");

                    self.remember_address(peer_id, addr.clone());
                    let _update = self
                        .swarm
                        .behaviour_mut()
                        .kad
                        .add_address(&peer_id, addr.clone());

                    if self.swarm.is_connected(&peer_id) {
                        continue;
                    }

                    let opts = DialOpts::peer_id(peer_id)
                        .addresses(vec![addr])
                        .condition(PeerCondition::DisconnectedAndNotDialing)
                        .build();

                    if let Err(err) = self.swarm.dial(opts) {
                        debug!(%peer_id, %err, "Failed to dial discovered peer");
                    }
                }
            }
            mdns::Event::Expired(peers) => {
                for (peer_id, addr) in peers {
                    debug!(%peer_id, %addr, "Local peer expired");

                    let _removed = self
                        .swarm
                        .behaviour_mut()
                        .kad
                        .remove_address(&peer_id, &addr);
                }
            }
        }
    }
}
