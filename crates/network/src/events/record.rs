use eyre::eyre;
use iprs_network_primitives::record_protocol::{RecordRequest, RecordResponse};
use iprs_primitives::Name;
use libp2p::request_response::{Event, Message};
use libp2p::PeerId;
use owo_colors::OwoColorize;
use tracing::{debug, warn};

use super::{EventHandler, EventLoop};

impl EventHandler<Event<RecordRequest, RecordResponse>> for EventLoop {
    async fn handle(&mut self, event: Event<RecordRequest, RecordResponse>) {
        debug!("{}: {:?}", "record".yellow(), event);

        match event {
            Event::Message {
                peer,
                message: Message::Request {
                    request, channel, ..
                },
                ..
            } => {
                let response = self.answer(peer, request);

                if self
                    .swarm
                    .behaviour_mut()
                    .record
                    .send_response(channel, response)
                    .is_err()
                {
                    debug!(%peer, "Requester went away before the response was sent");
                }
            }
            Event::Message {
                message:
                    Message::Response {
                        request_id,
                        response,
                    },
                ..
            } => {
                if let Some(sender) = self.pending_requests.remove(&request_id) {
                    drop(sender.send(Ok(response)));
                }
            }
            Event::OutboundFailure {
                peer,
                request_id,
                error,
                ..
            } => {
                debug!(%peer, %error, "Record request failed");

                if let Some(sender) = self.pending_requests.remove(&request_id) {
                    drop(sender.send(Err(eyre!(error))));
                }
            }
            Event::InboundFailure { peer, error, .. } => {
                debug!(%peer, %error, "Failed to answer record request");
            }
            Event::ResponseSent { .. } => {}
        }
    }
}

impl EventLoop {
    fn answer(&self, from: PeerId, request: RecordRequest) -> RecordResponse {
        match request {
            RecordRequest::Get { name } => {
                let Ok(name) = name.parse::<Name>() else {
                    warn!(%from, %name, "Ignoring get for malformed name");
                    return RecordResponse::NotFound;
                };

                self.peer
                    .get_record(&name)
                    .map_or(RecordResponse::NotFound, |envelope| {
                        RecordResponse::Found { envelope }
                    })
            }
            RecordRequest::Put { name, envelope } => {
                match name.parse::<Name>() {
                    Ok(name) => self.peer.new_record(&name, &envelope, &from),
                    Err(err) => warn!(%from, %name, %err, "Ignoring put for malformed name"),
                }

                RecordResponse::Accepted
            }
        }
    }
}
