use core::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_INITIAL_WINDOW: usize = 4;
pub const DEFAULT_MAX_WINDOW: usize = 256;
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 8;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Tuning shared by the resolver and the updater.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
#[non_exhaustive]
pub struct LookupConfig {
    /// Providers requested in the first discovery round.
    pub initial_window: usize,
    /// Discovery stops instead of doubling past this.
    pub max_window: usize,
    /// Per-name bound on fetches in flight.
    pub max_concurrent_fetches: usize,
    /// Deadline of a single fetch or push.
    pub request_timeout_ms: u64,
}

impl LookupConfig {
    #[must_use]
    pub const fn new(
        initial_window: usize,
        max_window: usize,
        max_concurrent_fetches: usize,
        request_timeout_ms: u64,
    ) -> Self {
        Self {
            initial_window,
            max_window,
            max_concurrent_fetches,
            request_timeout_ms,
        }
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_INITIAL_WINDOW,
            DEFAULT_MAX_WINDOW,
            DEFAULT_MAX_CONCURRENT_FETCHES,
            DEFAULT_REQUEST_TIMEOUT_MS,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_section_keeps_defaults() {
        let config: LookupConfig = toml::from_str("max_window = 32").unwrap();

        assert_eq!(config.max_window, 32);
        assert_eq!(config.initial_window, DEFAULT_INITIAL_WINDOW);
        assert_eq!(config.max_concurrent_fetches, DEFAULT_MAX_CONCURRENT_FETCHES);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }
}
