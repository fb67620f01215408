//! Lookup behaviours against an in-memory overlay.
//!
//! Every simulated provider keeps its own `RecordStore`, so pushes go through
//! the same conflict resolution a real node applies.

use core::future::pending;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use core::time::Duration;
use std::sync::Arc;

use async_trait::async_trait;
use eyre::{bail, eyre, Result as EyreResult};
use futures_util::StreamExt;
use iprs_network_primitives::client::{ProviderCandidate, RecordNetwork};
use iprs_node::{
    discover_providers, resolve, update, AdvertiseReport, Advertiser, FetchError, LookupConfig,
    Reference, Resolution, UpdateError, UpdateEvent, UpdateOutcome,
};
use iprs_primitives::{Name, ObjectAddress, Record, RecordError};
use iprs_store::{Peer, RecordStore};
use libp2p_identity::{Keypair, PeerId};
use parking_lot::Mutex;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

const TARGET: &str = "/ipfs/QmWATWQ7fVPP2EFGu71UkfnqhYXDYH566qy47CnJDgvs8u";

// ============================================================
// Simulated overlay
// ============================================================

#[derive(Debug, Default)]
struct SimProvider {
    store: RecordStore,
    /// Served instead of the stored record when set.
    forged: Option<Vec<u8>>,
    fail_fetch: bool,
    fetch_delay: Duration,
}

impl SimProvider {
    fn holding(name: &Name, envelope: &[u8]) -> Self {
        let provider = Self::default();
        let _acceptance = provider.store.offer(name, envelope).unwrap();
        provider
    }

    fn delayed(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    fn failing(mut self) -> Self {
        self.fail_fetch = true;
        self
    }
}

struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        let _previous = counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let _previous = self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug)]
struct SimNetwork {
    local: PeerId,
    providers: Mutex<Vec<(ObjectAddress, PeerId, Arc<SimProvider>)>>,
    windows: Mutex<Vec<usize>>,
    pushes: Mutex<Vec<(PeerId, Name, Vec<u8>)>>,
    announcements: AtomicUsize,
    announce_failures: AtomicUsize,
    discovery_error: AtomicBool,
    hang_discovery: AtomicBool,
    in_flight: Arc<AtomicUsize>,
}

impl SimNetwork {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            local: PeerId::random(),
            providers: Mutex::default(),
            windows: Mutex::default(),
            pushes: Mutex::default(),
            announcements: AtomicUsize::new(0),
            announce_failures: AtomicUsize::new(0),
            discovery_error: AtomicBool::new(false),
            hang_discovery: AtomicBool::new(false),
            in_flight: Arc::default(),
        })
    }

    fn add_provider(&self, name: &Name, provider: SimProvider) -> (PeerId, Arc<SimProvider>) {
        let peer_id = PeerId::random();
        let provider = Arc::new(provider);

        self.providers
            .lock()
            .push((name.object_address(), peer_id, Arc::clone(&provider)));

        (peer_id, provider)
    }

    fn provider(&self, peer_id: &PeerId) -> Option<Arc<SimProvider>> {
        self.providers
            .lock()
            .iter()
            .find(|(_, id, _)| id == peer_id)
            .map(|(_, _, provider)| Arc::clone(provider))
    }
}

#[async_trait]
impl RecordNetwork for SimNetwork {
    async fn announce_provider(&self, _address: &ObjectAddress) -> EyreResult<()> {
        let forced = self
            .announce_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        if forced {
            bail!("no peers to announce to");
        }

        let _previous = self.announcements.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn find_providers(
        &self,
        address: &ObjectAddress,
        window: usize,
    ) -> EyreResult<Vec<ProviderCandidate>> {
        self.windows.lock().push(window);

        if self.hang_discovery.load(Ordering::SeqCst) {
            pending::<()>().await;
        }

        if self.discovery_error.load(Ordering::SeqCst) {
            bail!("routing table is empty");
        }

        Ok(self
            .providers
            .lock()
            .iter()
            .filter(|(provided, _, _)| provided == address)
            .take(window)
            .map(|(_, peer_id, _)| ProviderCandidate::new(*peer_id, vec![]))
            .collect())
    }

    async fn fetch_record(&self, peer_id: PeerId, name: &Name) -> EyreResult<Vec<u8>> {
        let _guard = InFlight::enter(&self.in_flight);

        let provider = self
            .provider(&peer_id)
            .ok_or_else(|| eyre!("unknown peer {peer_id}"))?;

        sleep(provider.fetch_delay).await;

        if provider.fail_fetch {
            bail!("connection reset by {peer_id}");
        }

        if let Some(forged) = &provider.forged {
            return Ok(forged.clone());
        }

        provider
            .store
            .get(name)
            .ok_or_else(|| eyre!("{peer_id} has no record for {name}"))
    }

    async fn push_record(&self, peer_id: PeerId, name: &Name, envelope: Vec<u8>) -> EyreResult<()> {
        let provider = self
            .provider(&peer_id)
            .ok_or_else(|| eyre!("unknown peer {peer_id}"))?;

        provider.store.new_record(name, &envelope, &self.local);
        self.pushes.lock().push((peer_id, name.clone(), envelope));

        Ok(())
    }
}

struct Publisher {
    keypair: Keypair,
    name: Name,
}

impl Publisher {
    fn new() -> Self {
        let keypair = Keypair::generate_ed25519();
        let name = Name::derive(&keypair.public(), "");

        Self { keypair, name }
    }

    fn sign(&self, order: u64) -> Vec<u8> {
        Record::new(TARGET, order).encode(&self.keypair).unwrap()
    }
}

// ============================================================
// Provider search
// ============================================================

#[tokio::test]
async fn test_search_doubles_window_until_exhausted() {
    let network = SimNetwork::new();
    let publisher = Publisher::new();
    let envelope = publisher.sign(1);

    for _ in 0..20 {
        let _provider = network.add_provider(
            &publisher.name,
            SimProvider::holding(&publisher.name, &envelope),
        );
    }

    let batches: Vec<_> = discover_providers(
        Arc::clone(&network),
        publisher.name.object_address(),
        &LookupConfig::default(),
        CancellationToken::new(),
    )
    .map(Result::unwrap)
    .collect()
    .await;

    assert_eq!(*network.windows.lock(), vec![4, 8, 16, 32]);
    assert_eq!(
        batches.iter().map(Vec::len).collect::<Vec<_>>(),
        vec![4, 4, 8, 4]
    );

    let mut peers: Vec<_> = batches.iter().flatten().map(|c| c.peer_id).collect();
    peers.sort_unstable();
    peers.dedup();
    assert_eq!(peers.len(), 20);
}

#[tokio::test]
async fn test_search_stops_at_max_window() {
    let network = SimNetwork::new();
    let publisher = Publisher::new();
    let envelope = publisher.sign(1);

    for _ in 0..20 {
        let _provider = network.add_provider(
            &publisher.name,
            SimProvider::holding(&publisher.name, &envelope),
        );
    }

    let found: usize = discover_providers(
        Arc::clone(&network),
        publisher.name.object_address(),
        &LookupConfig::new(4, 8, 8, 1_000),
        CancellationToken::new(),
    )
    .map(|batch| batch.unwrap().len())
    .collect::<Vec<_>>()
    .await
    .into_iter()
    .sum();

    assert_eq!(*network.windows.lock(), vec![4, 8]);
    assert_eq!(found, 8);
}

#[tokio::test]
async fn test_search_reports_discovery_error_then_closes() {
    let network = SimNetwork::new();
    network.discovery_error.store(true, Ordering::SeqCst);

    let publisher = Publisher::new();

    let items: Vec<_> = discover_providers(
        Arc::clone(&network),
        publisher.name.object_address(),
        &LookupConfig::default(),
        CancellationToken::new(),
    )
    .collect()
    .await;

    assert_eq!(items.len(), 1);
    assert!(items[0].is_err());
    assert_eq!(*network.windows.lock(), vec![4]);
}

// ============================================================
// Resolver
// ============================================================

#[tokio::test(start_paused = true)]
async fn test_resolve_reports_every_provider_in_discovery_order() {
    let network = SimNetwork::new();
    let publisher = Publisher::new();
    let name = &publisher.name;

    let (first, _) = network.add_provider(
        name,
        SimProvider::holding(name, &publisher.sign(3)).delayed(Duration::from_millis(300)),
    );
    let (second, _) = network.add_provider(
        name,
        SimProvider::holding(name, &publisher.sign(9)).delayed(Duration::from_millis(10)),
    );
    let (third, _) = network.add_provider(
        name,
        SimProvider::holding(name, &publisher.sign(3)).failing(),
    );

    let reports: Vec<_> = resolve(
        Arc::clone(&network),
        name.clone(),
        &LookupConfig::default(),
        CancellationToken::new(),
    )
    .collect()
    .await;

    assert_eq!(reports.len(), 3);

    let Resolution::Found { provider, fetched } = &reports[0] else {
        panic!("expected a record from the first provider, got {:?}", reports[0]);
    };
    assert_eq!(provider.peer_id, first);
    assert_eq!(fetched.record.order(), 3);

    let Resolution::Found { provider, fetched } = &reports[1] else {
        panic!("expected a record from the second provider, got {:?}", reports[1]);
    };
    assert_eq!(provider.peer_id, second);
    assert_eq!(fetched.record.order(), 9);
    assert_eq!(fetched.record.name(), name);

    let Resolution::Failed { provider, error } = &reports[2] else {
        panic!("expected the third provider to fail, got {:?}", reports[2]);
    };
    assert_eq!(provider.peer_id, third);
    assert!(matches!(error, FetchError::Network { .. }));
}

#[tokio::test]
async fn test_resolve_rejects_record_signed_by_another_key() {
    let network = SimNetwork::new();
    let publisher = Publisher::new();
    let impostor = Publisher::new();

    let forged = SimProvider {
        forged: Some(impostor.sign(100)),
        ..SimProvider::default()
    };
    let _provider = network.add_provider(&publisher.name, forged);

    let reports: Vec<_> = resolve(
        Arc::clone(&network),
        publisher.name.clone(),
        &LookupConfig::default(),
        CancellationToken::new(),
    )
    .collect()
    .await;

    assert_eq!(reports.len(), 1);
    assert!(matches!(
        &reports[0],
        Resolution::Failed {
            error: FetchError::Record {
                source: RecordError::Authenticity(_),
                ..
            },
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_resolve_cancellation_drops_inflight_fetches() {
    let network = SimNetwork::new();
    let publisher = Publisher::new();
    let name = &publisher.name;

    for _ in 0..3 {
        let _provider = network.add_provider(
            name,
            SimProvider::holding(name, &publisher.sign(1)).delayed(Duration::from_secs(3600)),
        );
    }

    let token = CancellationToken::new();
    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            token.cancel();
        })
    };

    let started = Instant::now();
    let reports: Vec<_> = resolve(
        Arc::clone(&network),
        name.clone(),
        &LookupConfig::new(4, 256, 8, 7_200_000),
        token,
    )
    .collect()
    .await;

    canceller.await.unwrap();

    assert!(reports.is_empty());
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(network.in_flight.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_resolve_cancellation_during_discovery() {
    let network = SimNetwork::new();
    network.hang_discovery.store(true, Ordering::SeqCst);

    let publisher = Publisher::new();
    let token = CancellationToken::new();

    let lookup = tokio::spawn(
        resolve(
            Arc::clone(&network),
            publisher.name.clone(),
            &LookupConfig::default(),
            token.clone(),
        )
        .collect::<Vec<_>>(),
    );

    sleep(Duration::from_millis(10)).await;
    token.cancel();

    let reports = lookup.await.unwrap();
    assert!(reports.is_empty());
    assert_eq!(*network.windows.lock(), vec![4]);
}

#[tokio::test(start_paused = true)]
async fn test_resolve_times_out_slow_provider() {
    let network = SimNetwork::new();
    let publisher = Publisher::new();
    let name = &publisher.name;

    let _provider = network.add_provider(
        name,
        SimProvider::holding(name, &publisher.sign(1)).delayed(Duration::from_secs(60)),
    );

    let reports: Vec<_> = resolve(
        Arc::clone(&network),
        name.clone(),
        &LookupConfig::new(4, 256, 8, 1_000),
        CancellationToken::new(),
    )
    .collect()
    .await;

    assert!(matches!(
        &reports[..],
        [Resolution::Failed {
            error: FetchError::Timeout { .. },
            ..
        }]
    ));
}

// ============================================================
// Updater
// ============================================================

#[tokio::test]
async fn test_update_pushes_reference_to_stale_provider_once() {
    let network = SimNetwork::new();
    let publisher = Publisher::new();
    let name = &publisher.name;

    let local = publisher.sign(10);
    let (stale, provider) =
        network.add_provider(name, SimProvider::holding(name, &publisher.sign(7)));

    let reference = Arc::new(Reference::from_envelope(local.clone()).unwrap());
    assert_eq!(reference.name(), name);

    let events: Vec<_> = update(
        Arc::clone(&network),
        reference,
        &LookupConfig::default(),
        CancellationToken::new(),
    )
    .collect()
    .await;

    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        UpdateEvent::Checked {
            provider,
            outcome: Ok(UpdateOutcome::Repaired { previous: 7 }),
        } if provider.peer_id == stale
    ));

    let pushes = network.pushes.lock();
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].0, stale);
    assert_eq!(pushes[0].2, local);

    assert_eq!(provider.store.record(name).unwrap().order(), 10);
}

#[tokio::test]
async fn test_update_classifies_each_provider() {
    let network = SimNetwork::new();
    let publisher = Publisher::new();
    let impostor = Publisher::new();
    let name = &publisher.name;

    let (same, _) = network.add_provider(name, SimProvider::holding(name, &publisher.sign(10)));
    let (newer, _) = network.add_provider(name, SimProvider::holding(name, &publisher.sign(12)));
    let (older, _) = network.add_provider(name, SimProvider::holding(name, &publisher.sign(3)));
    let (forged, _) = network.add_provider(
        name,
        SimProvider {
            forged: Some(impostor.sign(1)),
            ..SimProvider::default()
        },
    );
    let (down, _) = network.add_provider(
        name,
        SimProvider::holding(name, &publisher.sign(1)).failing(),
    );

    let reference = Arc::new(Reference::from_envelope(publisher.sign(10)).unwrap());

    let events: Vec<_> = update(
        Arc::clone(&network),
        reference,
        &LookupConfig::default(),
        CancellationToken::new(),
    )
    .collect()
    .await;

    assert_eq!(events.len(), 5);

    let outcome_of = |peer_id: PeerId| {
        events
            .iter()
            .find_map(|event| match event {
                UpdateEvent::Checked { provider, outcome } if provider.peer_id == peer_id => {
                    Some(outcome)
                }
                _ => None,
            })
            .unwrap()
    };

    assert!(matches!(outcome_of(same), Ok(UpdateOutcome::UpToDate)));
    assert!(matches!(
        outcome_of(newer),
        Ok(UpdateOutcome::RemoteNewer { remote: 12 })
    ));
    assert!(matches!(
        outcome_of(older),
        Ok(UpdateOutcome::Repaired { previous: 3 })
    ));
    assert!(matches!(
        outcome_of(forged),
        Err(UpdateError::Fetch(FetchError::Record { .. }))
    ));
    assert!(matches!(
        outcome_of(down),
        Err(UpdateError::Fetch(FetchError::Network { .. }))
    ));

    let pushes = network.pushes.lock();
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].0, older);
}

#[tokio::test]
async fn test_update_reports_search_failure() {
    let network = SimNetwork::new();
    network.discovery_error.store(true, Ordering::SeqCst);

    let publisher = Publisher::new();
    let reference = Arc::new(Reference::from_envelope(publisher.sign(1)).unwrap());

    let events: Vec<_> = update(
        Arc::clone(&network),
        reference,
        &LookupConfig::default(),
        CancellationToken::new(),
    )
    .collect()
    .await;

    assert!(matches!(&events[..], [UpdateEvent::SearchFailed(_)]));
    assert!(network.pushes.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_update_cancellation_aborts_checks() {
    let network = SimNetwork::new();
    let publisher = Publisher::new();
    let name = &publisher.name;

    for _ in 0..4 {
        let _provider = network.add_provider(
            name,
            SimProvider::holding(name, &publisher.sign(1)).delayed(Duration::from_secs(3600)),
        );
    }

    let reference = Arc::new(Reference::from_envelope(publisher.sign(2)).unwrap());
    let token = CancellationToken::new();

    let run = tokio::spawn(
        update(
            Arc::clone(&network),
            reference,
            &LookupConfig::new(4, 256, 2, 7_200_000),
            token.clone(),
        )
        .collect::<Vec<_>>(),
    );

    sleep(Duration::from_millis(50)).await;
    assert_eq!(network.in_flight.load(Ordering::SeqCst), 2);

    token.cancel();
    let events = run.await.unwrap();

    assert!(events.is_empty());
    assert_eq!(network.in_flight.load(Ordering::SeqCst), 0);
    assert!(network.pushes.lock().is_empty());
}

// ============================================================
// Advertiser
// ============================================================

#[tokio::test(start_paused = true)]
async fn test_advertiser_announces_every_interval() {
    let network = SimNetwork::new();
    let publisher = Publisher::new();
    let token = CancellationToken::new();

    let advertiser = Advertiser::new(
        Arc::clone(&network),
        publisher.name.clone(),
        Duration::from_secs(60),
    );
    let run = tokio::spawn(advertiser.run(token.clone()));

    sleep(Duration::from_secs(150)).await;
    token.cancel();

    let report = run.await.unwrap();

    assert_eq!(
        report,
        AdvertiseReport {
            announcements: 3,
            failures: 0
        }
    );
    assert_eq!(network.announcements.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_advertiser_keeps_going_after_failure() {
    let network = SimNetwork::new();
    network.announce_failures.store(1, Ordering::SeqCst);

    let publisher = Publisher::new();
    let token = CancellationToken::new();

    let run = tokio::spawn(
        Advertiser::new(
            Arc::clone(&network),
            publisher.name.clone(),
            Duration::from_secs(60),
        )
        .run(token.clone()),
    );

    sleep(Duration::from_secs(90)).await;
    token.cancel();

    let report = run.await.unwrap();

    assert_eq!(report.failures, 1);
    assert_eq!(report.announcements, 1);
}

#[tokio::test(start_paused = true)]
async fn test_advertiser_stops_mid_sleep() {
    let network = SimNetwork::new();
    let publisher = Publisher::new();
    let token = CancellationToken::new();

    let run = tokio::spawn(
        Advertiser::new(
            Arc::clone(&network),
            publisher.name.clone(),
            Duration::from_secs(3600),
        )
        .run(token.clone()),
    );

    sleep(Duration::from_secs(1)).await;

    let started = Instant::now();
    token.cancel();
    let report = run.await.unwrap();

    assert_eq!(report.announcements, 1);
    assert!(started.elapsed() < Duration::from_secs(1));
}
