//! Naming behaviours on top of a [`RecordNetwork`]: provider search,
//! advertising, resolving and anti-entropy repair.
//!
//! [`RecordNetwork`]: iprs_network_primitives::client::RecordNetwork

pub mod advertise;
pub mod config;
mod fetch;
pub mod resolve;
pub mod search;
pub mod update;

pub use advertise::{AdvertiseReport, Advertiser};
pub use config::LookupConfig;
pub use fetch::{FetchError, Fetched};
pub use resolve::{resolve, Resolution};
pub use search::{discover_providers, SearchError};
pub use update::{update, Reference, UpdateError, UpdateEvent, UpdateOutcome};
