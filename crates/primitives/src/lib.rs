//! Core types of the naming layer: record names, object addresses and the
//! signed ordered record envelope.

pub mod multicodec;
pub mod name;
pub mod record;

pub use name::{Name, NameError, ObjectAddress};
pub use record::{Record, RecordError, VerifiedRecord};
