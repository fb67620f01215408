pub mod client;
pub mod config;
pub mod record_protocol;
