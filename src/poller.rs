use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::api::SparkClient;
use crate::detector;
use crate::error::CycleError;
use crate::notify::Dispatcher;
use crate::reporter;
use crate::store::SnapshotStore;
use crate::types::{CycleReport, EventRecord, PollStatus};

/// Orchestrates one fetch → detect → dispatch → store-update pass per tick.
///
/// The snapshot store lives behind an async mutex acquired with `try_lock`,
/// so the interval timer and the manual HTTP trigger can never run a cycle
/// concurrently; the losing caller gets `CycleError::InFlight` and the store
/// is never raced.
pub struct Poller {
    client: SparkClient,
    dispatcher: Dispatcher,
    store: Mutex<SnapshotStore>,
    interval: Duration,
    enabled: bool,
    stats: PollStats,
}

#[derive(Default)]
struct PollStats {
    cycles_completed: AtomicU64,
    events_dispatched: AtomicU64,
    tracked_listings: AtomicUsize,
    last_poll: std::sync::Mutex<Option<DateTime<Utc>>>,
}

impl Poller {
    pub fn new(
        client: SparkClient,
        dispatcher: Dispatcher,
        store: SnapshotStore,
        interval: Duration,
        enabled: bool,
    ) -> Self {
        Self {
            client,
            dispatcher,
            store: Mutex::new(store),
            interval,
            enabled,
            stats: PollStats::default(),
        }
    }

    /// Run one poll cycle, unless one is already in flight.
    ///
    /// On fetch failure the store is untouched and the next tick is the
    /// retry. Notification failures are recorded in the report but never
    /// abort the cycle or block the store update.
    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        let mut store = self.store.try_lock().map_err(|_| CycleError::InFlight)?;

        let listings = self.client.fetch_active_listings().await?;
        info!("Fetched {} listings", listings.len());

        let mut new_listings = 0;
        let mut events_dispatched = 0;
        let mut notify_failures = 0;

        for raw in &listings {
            let current = raw.snapshot();
            let events = detector::detect(store.get(&current.listing_id), &current);

            if store.get(&current.listing_id).is_none() {
                new_listings += 1;
            }

            if !events.is_empty() {
                let details = raw.details();
                for event in events {
                    info!("[{}] {}", current.listing_id, event.kind());
                    let deliveries = self
                        .dispatcher
                        .dispatch(&current.listing_id, &event, &details)
                        .await;
                    notify_failures += deliveries.iter().filter(|d| !d.ok).count();
                    events_dispatched += 1;
                    reporter::report_event(&EventRecord {
                        timestamp: Utc::now().to_rfc3339(),
                        listing_id: current.listing_id.clone(),
                        event,
                        deliveries,
                    });
                }
            }

            // Each listing's write is independent and idempotent, so a
            // shutdown mid-cycle loses at most the not-yet-visited tail.
            store.put(current);
        }

        if let Err(e) = store.persist_cursor() {
            warn!("Failed to persist cursor: {e:#}");
        }

        let report = CycleReport {
            timestamp: Utc::now().to_rfc3339(),
            listings_fetched: listings.len(),
            new_listings,
            events_dispatched,
            notify_failures,
        };

        self.stats.cycles_completed.fetch_add(1, Ordering::Relaxed);
        self.stats
            .events_dispatched
            .fetch_add(events_dispatched as u64, Ordering::Relaxed);
        self.stats
            .tracked_listings
            .store(store.len(), Ordering::Relaxed);
        if let Ok(mut last_poll) = self.stats.last_poll.lock() {
            *last_poll = Some(Utc::now());
        }

        reporter::report_cycle(&report);
        Ok(report)
    }

    /// Snapshot of the polling state for the status endpoint.
    pub fn status(&self) -> PollStatus {
        PollStatus {
            polling_enabled: self.enabled,
            poll_interval_secs: self.interval.as_secs(),
            tracked_listings: self.stats.tracked_listings.load(Ordering::Relaxed),
            last_poll: self
                .stats
                .last_poll
                .lock()
                .map(|guard| *guard)
                .unwrap_or(None),
            cycles_completed: self.stats.cycles_completed.load(Ordering::Relaxed),
            events_dispatched: self.stats.events_dispatched.load(Ordering::Relaxed),
        }
    }

    /// Drive the poll loop until ctrl-c.
    ///
    /// The first cycle runs immediately: with a durable cursor present this
    /// is the rehydration pass that rebuilds the baseline before any diffing;
    /// without one it is simply the initial baseline. A cycle in flight when
    /// ctrl-c arrives finishes before this returns — the signal is only
    /// observed between cycles.
    pub async fn run(&self) {
        {
            let store = self.store.lock().await;
            if store.has_persisted_cursor() {
                info!(
                    "Durable cursor found (last modification {:?}); rehydrating baseline",
                    store.cursor()
                );
            }
        }

        self.tick().await;
        if !self.enabled {
            info!("Interval polling disabled; manual trigger only. Press Ctrl+C to stop.");
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {e}");
            }
            info!("Shutdown signal received");
            return;
        }

        info!(
            "Entering polling loop (interval: {}s). Press Ctrl+C to stop.",
            self.interval.as_secs()
        );
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {
                    self.tick().await;
                }
            }
        }
    }

    /// One scheduled tick: run a cycle and log the outcome. Errors never
    /// escape — the next tick is the retry.
    async fn tick(&self) {
        match self.run_cycle().await {
            Ok(report) => {
                info!(
                    "Cycle complete: {} listings, {} new, {} events, {} delivery failures",
                    report.listings_fetched,
                    report.new_listings,
                    report.events_dispatched,
                    report.notify_failures
                );
            }
            Err(CycleError::InFlight) => {
                warn!("Skipping tick: previous cycle still in flight");
            }
            Err(CycleError::Fetch(e)) => {
                warn!("Poll cycle failed, store untouched: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NotificationsConfig, SlackConfig};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn listing_json(id: &str, status: &str, price: i64) -> serde_json::Value {
        json!({
            "Id": id,
            "StandardFields": {
                "ListingId": format!("MLS-{id}"),
                "StandardStatus": status,
                "ListPrice": price,
                "ModificationTimestamp": "2025-03-14T09:26:53Z",
                "UnparsedFirstLineAddress": "611 8th St S",
                "City": "Fargo",
                "StateOrProvince": "ND",
                "PostalCode": "58103",
                "ListAgentName": "Joe Agent"
            }
        })
    }

    fn envelope(results: Vec<serde_json::Value>) -> serde_json::Value {
        json!({ "D": { "Success": true, "Results": results } })
    }

    fn poller_for(spark_uri: &str, slack_uri: &str) -> Poller {
        let client = SparkClient::new(spark_uri, "test-token", 100).unwrap();
        let dispatcher = Dispatcher::from_config(&NotificationsConfig {
            slack: Some(SlackConfig {
                webhook_url: format!("{slack_uri}/webhook"),
            }),
            twilio: None,
        })
        .unwrap();
        Poller::new(
            client,
            dispatcher,
            SnapshotStore::new(),
            Duration::from_secs(120),
            true,
        )
    }

    #[tokio::test]
    async fn baseline_then_change_notifies_once() {
        let server = MockServer::start().await;

        // First poll: baseline at $500k. Second poll: price drop.
        Mock::given(method("GET"))
            .and(path("/listings"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(envelope(vec![listing_json("L1", "Active", 500_000)])),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/listings"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(envelope(vec![listing_json("L1", "Active", 475_000)])),
            )
            .mount(&server)
            .await;
        // Exactly one webhook delivery across both cycles.
        Mock::given(method("POST"))
            .and(path("/webhook"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let poller = poller_for(&server.uri(), &server.uri());

        let first = poller.run_cycle().await.unwrap();
        assert_eq!(first.listings_fetched, 1);
        assert_eq!(first.new_listings, 1);
        assert_eq!(first.events_dispatched, 0);

        let second = poller.run_cycle().await.unwrap();
        assert_eq!(second.new_listings, 0);
        assert_eq!(second.events_dispatched, 1);
        assert_eq!(second.notify_failures, 0);

        let status = poller.status();
        assert_eq!(status.tracked_listings, 1);
        assert_eq!(status.cycles_completed, 2);
        assert_eq!(status.events_dispatched, 1);
        assert!(status.last_poll.is_some());
    }

    #[tokio::test]
    async fn fetch_failure_leaves_store_untouched() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/listings"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(envelope(vec![listing_json("L1", "Active", 500_000)])),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/listings"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/listings"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(envelope(vec![listing_json("L1", "Pending", 500_000)])),
            )
            .mount(&server)
            .await;
        // Only the third cycle's status change should notify.
        Mock::given(method("POST"))
            .and(path("/webhook"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let poller = poller_for(&server.uri(), &server.uri());

        poller.run_cycle().await.unwrap();
        let before = poller.status();

        let err = poller.run_cycle().await.unwrap_err();
        assert!(matches!(err, CycleError::Fetch(_)));
        let after = poller.status();
        assert_eq!(after.tracked_listings, before.tracked_listings);
        assert_eq!(after.cycles_completed, before.cycles_completed);

        // The baseline survived the failed cycle: the status flip is
        // detected against the $500k Active snapshot, exactly once.
        let third = poller.run_cycle().await.unwrap();
        assert_eq!(third.events_dispatched, 1);
    }

    #[tokio::test]
    async fn concurrent_cycle_is_rejected() {
        let server = MockServer::start().await;
        let poller = poller_for(&server.uri(), &server.uri());

        let _guard = poller.store.try_lock().unwrap();
        let err = poller.run_cycle().await.unwrap_err();
        assert!(matches!(err, CycleError::InFlight));
    }

    #[tokio::test]
    async fn notify_failure_does_not_block_store_update() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/listings"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(envelope(vec![listing_json("L1", "Active", 500_000)])),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/listings"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(envelope(vec![listing_json("L1", "Active", 475_000)])),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/webhook"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let poller = poller_for(&server.uri(), &server.uri());
        poller.run_cycle().await.unwrap();

        let second = poller.run_cycle().await.unwrap();
        assert_eq!(second.events_dispatched, 1);
        assert_eq!(second.notify_failures, 1);

        // The snapshot was still updated: a third identical fetch detects
        // nothing, so the failed delivery is not re-fired.
        let third = poller.run_cycle().await.unwrap();
        assert_eq!(third.events_dispatched, 0);
    }
}
