use libp2p::identify::Event;
use owo_colors::OwoColorize;
use tracing::debug;

use super::{EventHandler, EventLoop};
use crate::IPRS_KAD_PROTO_NAME;

impl EventHandler<Event> for EventLoop {
    async fn handle(&mut self, event: Event) {
        debug!("{}: {:?}", "identify".yellow(), event);

        if let Event::Received { peer_id, info, .. } = event {
            let speaks_kad = info.protocols.iter().any(|p| *p == IPRS_KAD_PROTO_NAME);

            for addr in info.listen_addrs {
                self.remember_address(peer_id, addr.clone());

                if speaks_kad {
                    let _update = self.swarm.behaviour_mut().kad.add_address(&peer_id, addr);
                }
            }
        }
    }
}
