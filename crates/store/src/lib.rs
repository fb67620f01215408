//! In-process holding of naming records and the capability the network layer
//! uses to reach them.

mod peer;
mod record_store;

pub use peer::{NullPeer, Peer};
pub use record_store::{Acceptance, RecordStore};
