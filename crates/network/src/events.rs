use crate::EventLoop;

mod identify;
mod kad;
mod mdns;
mod ping;
mod record;

pub(crate) trait EventHandler<E> {
    async fn handle(&mut self, event: E);
}
