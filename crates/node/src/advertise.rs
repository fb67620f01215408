use core::time::Duration;
use std::sync::Arc;

use iprs_network_primitives::client::RecordNetwork;
use iprs_primitives::{Name, ObjectAddress};
use tokio::select;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_ADVERTISE_INTERVAL: Duration = Duration::from_secs(60 * 60);

const MIN_ADVERTISE_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct AdvertiseReport {
    pub announcements: u64,
    pub failures: u64,
}

#[derive(Clone, Copy, Debug)]
enum State {
    Idle,
    Announcing,
}

/// Periodically announces this node as a provider of one name.
#[derive(Debug)]
pub struct Advertiser<N: ?Sized> {
    network: Arc<N>,
    name: Name,
    address: ObjectAddress,
    interval: Duration,
}

impl<N> Advertiser<N>
where
    N: RecordNetwork + ?Sized,
{
    /// Intervals shorter than one second are raised to one second.
    #[must_use]
    pub fn new(network: Arc<N>, name: Name, interval: Duration) -> Self {
        let address = name.object_address();

        Self {
            network,
            name,
            address,
            interval: interval.max(MIN_ADVERTISE_INTERVAL),
        }
    }

    #[must_use]
    pub const fn name(&self) -> &Name {
        &self.name
    }

    /// Announces immediately, then once per interval, until `token` is
    /// cancelled. A failed announcement is retried at the next tick.
    pub async fn run(self, token: CancellationToken) -> AdvertiseReport {
        let mut report = AdvertiseReport::default();
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut state = State::Idle;

        info!(name = %self.name, address = %self.address, interval = ?self.interval, "Advertising record");

        loop {
            state = match state {
                State::Idle => select! {
                    biased;
                    () = token.cancelled() => break,
                    _ = ticker.tick() => State::Announcing,
                },
                State::Announcing => {
                    let result = select! {
                        biased;
                        () = token.cancelled() => break,
                        result = self.network.announce_provider(&self.address) => result,
                    };

                    match result {
                        Ok(()) => {
                            report.announcements += 1;
                            debug!(name = %self.name, "Announced as provider");
                        }
                        Err(err) => {
                            report.failures += 1;
                            warn!(name = %self.name, %err, "Failed to announce as provider");
                        }
                    }

                    State::Idle
                }
            };
        }

        info!(
            name = %self.name,
            announcements = report.announcements,
            failures = report.failures,
            "Stopped advertising"
        );

        report
    }
}
