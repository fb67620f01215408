#[cfg(test)]
#[path = "tests/record_store.rs"]
mod tests;

use core::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use iprs_primitives::{Name, RecordError, VerifiedRecord};
use libp2p_identity::PeerId;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::peer::Peer;

/// Outcome of offering a verified record to the store.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Acceptance {
    Inserted { order: u64 },
    Replaced { previous: u64, order: u64 },
    Duplicate { order: u64 },
    Stale { held: u64, offered: u64 },
}

impl Acceptance {
    #[must_use]
    pub const fn is_stored(&self) -> bool {
        matches!(self, Self::Inserted { .. } | Self::Replaced { .. })
    }
}

#[derive(Debug)]
struct Held {
    envelope: Vec<u8>,
    record: VerifiedRecord,
}

/// At most one verified record per name.
///
/// Every mutation goes through [`RecordStore::offer`], which holds the lock
/// across compare and replace.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: Mutex<HashMap<Name, Held>>,
}

impl RecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Verifies `envelope` against `name` and keeps it if nothing newer is
    /// held. Equal orders are duplicates regardless of content.
    pub fn offer(&self, name: &Name, envelope: &[u8]) -> Result<Acceptance, RecordError> {
        let record = VerifiedRecord::decode_for(name, envelope)?;
        let order = record.order();

        let mut records = self.records.lock();

        let acceptance = match records.entry(name.clone()) {
            Entry::Vacant(entry) => {
                let _entry = entry.insert(Held {
                    envelope: envelope.to_vec(),
                    record,
                });
                Acceptance::Inserted { order }
            }
            Entry::Occupied(mut entry) => {
                let held = entry.get().record.order();

                match order.cmp(&held) {
                    Ordering::Equal => Acceptance::Duplicate { order },
                    Ordering::Less => Acceptance::Stale {
                        held,
                        offered: order,
                    },
                    Ordering::Greater => {
                        let _previous = entry.insert(Held {
                            envelope: envelope.to_vec(),
                            record,
                        });
                        Acceptance::Replaced {
                            previous: held,
                            order,
                        }
                    }
                }
            }
        };

        Ok(acceptance)
    }

    #[must_use]
    pub fn get(&self, name: &Name) -> Option<Vec<u8>> {
        self.records
            .lock()
            .get(name)
            .map(|entry| entry.envelope.clone())
    }

    #[must_use]
    pub fn record(&self, name: &Name) -> Option<VerifiedRecord> {
        self.records
            .lock()
            .get(name)
            .map(|entry| entry.record.clone())
    }

    #[must_use]
    pub fn names(&self) -> Vec<Name> {
        self.records.lock().keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl Peer for RecordStore {
    fn get_record(&self, name: &Name) -> Option<Vec<u8>> {
        self.get(name)
    }

    fn new_record(&self, name: &Name, envelope: &[u8], from: &PeerId) {
        match self.offer(name, envelope) {
            Ok(Acceptance::Inserted { order }) => {
                info!(%name, %from, order, "Stored new record");
            }
            Ok(Acceptance::Replaced { previous, order }) => {
                info!(%name, %from, previous, order, "Replaced record with newer version");
            }
            Ok(Acceptance::Duplicate { order }) => {
                debug!(%name, %from, order, "Ignoring duplicate record");
            }
            Ok(Acceptance::Stale { held, offered }) => {
                debug!(%name, %from, held, offered, "Ignoring stale record");
            }
            Err(err) => {
                warn!(%name, %from, %err, "Rejected pushed record");
            }
        }
    }
}
