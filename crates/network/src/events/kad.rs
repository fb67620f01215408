use eyre::eyre;
use libp2p::kad;
use owo_colors::OwoColorize;
use tracing::debug;

use super::{EventHandler, EventLoop};

impl EventHandler<kad::Event> for EventLoop {
    async fn handle(&mut self, event: kad::Event) {
        debug!("{}: {:?}", "kad".yellow(), event);

        match event {
            kad::Event::RoutingUpdated {
                peer, addresses, ..
            } => {
                for addr in addresses.iter() {
                    self.remember_address(peer, addr.clone());
                }
            }
            kad::Event::OutboundQueryProgressed {
                id,
                result: kad::QueryResult::Bootstrap(result),
                ..
            } => {
                if let Some(sender) = self.pending_bootstrap.remove(&id) {
                    drop(sender.send(result.map(|_| ()).map_err(Into::into)));
                }
            }
            kad::Event::OutboundQueryProgressed {
                id,
                result: kad::QueryResult::StartProviding(result),
                ..
            } => {
                if let Some(sender) = self.pending_start_providing.remove(&id) {
                    drop(sender.send(result.map(|_| ()).map_err(Into::into)));
                }
            }
            kad::Event::OutboundQueryProgressed {
                id,
                result: kad::QueryResult::GetProviders(result),
                step,
                ..
            } => self.on_get_providers(id, result, step.last),
            _ => {}
        }
    }
}

impl EventLoop {
    /// Collects providers until the window is full or the query ends, then
    /// answers the waiting caller and stops the query.
    fn on_get_providers(&mut self, id: kad::QueryId, result: kad::GetProvidersResult, last: bool) {
        let Some(mut pending) = self.pending_get_providers.remove(&id) else {
            return;
        };

        let local_peer_id = *self.swarm.local_peer_id();

        let done = match result {
            Ok(kad::GetProvidersOk::FoundProviders { providers, .. }) => {
                for peer_id in providers {
                    if peer_id != local_peer_id && !pending.found.contains(&peer_id) {
                        pending.found.push(peer_id);
                    }
                }

                last || pending.found.len() >= pending.window
            }
            Ok(kad::GetProvidersOk::FinishedWithNoAdditionalRecord { .. }) => true,
            Err(err) if pending.found.is_empty() => {
                drop(pending.sender.send(Err(eyre!(err))));
                return;
            }
            Err(_) => true,
        };

        if !done && !pending.sender.is_closed() {
            drop(self.pending_get_providers.insert(id, pending));
            return;
        }

        if let Some(mut query) = self.swarm.behaviour_mut().kad.query_mut(&id) {
            query.finish();
        }

        pending.found.truncate(pending.window);

        let candidates = pending
            .found
            .into_iter()
            .map(|peer_id| self.provider_candidate(peer_id))
            .collect();

        drop(pending.sender.send(Ok(candidates)));
    }
}
