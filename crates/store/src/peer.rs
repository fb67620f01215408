use core::fmt::Debug;

use iprs_primitives::Name;
use libp2p_identity::PeerId;

/// What remote peers may ask of this node.
pub trait Peer: Debug + Send + Sync {
    /// Envelope currently held for `name`, if any.
    fn get_record(&self, name: &Name) -> Option<Vec<u8>>;

    /// Offers an envelope pushed by `from`. Rejections are logged and dropped.
    fn new_record(&self, name: &Name, envelope: &[u8], from: &PeerId);
}

/// Serves nothing and accepts nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullPeer;

impl Peer for NullPeer {
    fn get_record(&self, _name: &Name) -> Option<Vec<u8>> {
        None
    }

    fn new_record(&self, _name: &Name, _envelope: &[u8], _from: &PeerId) {}
}
