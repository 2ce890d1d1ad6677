//! Connection lifecycle coordination
//!
//! `PairingCoordinator` composes the nearby tracker, subscription manager,
//! availability engine, and request ledger behind one object with
//! constructor-injected collaborators and an explicit `shutdown`. It owns
//! the background refresh loop and translates host lifecycle events
//! (connect, reconnect, login, logout, disconnect, zone change, resume)
//! into resets and rebuilds of the underlying state.
//!
//! Every lifecycle entry point swallows failures internally: transient
//! transport trouble degrades the engine to poll-only mode, it never
//! crashes or blocks the host.

use crate::availability::{AvailabilityEngine, FilterSnapshot};
use crate::config::EngineConfig;
use crate::error::PairingResult;
use crate::nearby::NearbyTracker;
use crate::requests::RequestLedger;
use crate::subscription::SubscriptionManager;
use murmur_core::{
    AvailabilityUpdate, EventSink, Ident, Location, NoteStore, PairRequest, PairRoster,
    PairingServer, ProximityOracle, RequestId, ResumeRequest, RulesProvider,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Host-provided collaborator bundle.
///
/// Everything the engine touches outside its own state comes in through
/// this struct at construction; there are no ambient singletons.
#[derive(Clone)]
pub struct Collaborators {
    /// Local observation of the game world.
    pub oracle: Arc<dyn ProximityOracle>,
    /// Pairing server transport.
    pub server: Arc<dyn PairingServer>,
    /// Already-paired identities to exclude from this ephemeral path.
    pub roster: Arc<dyn PairRoster>,
    /// User configuration.
    pub rules: Arc<dyn RulesProvider>,
    /// Per-identity note storage.
    pub notes: Arc<dyn NoteStore>,
    /// Destination for domain events.
    pub sink: Arc<dyn EventSink>,
}

/// Pairing availability and request coordinator.
pub struct PairingCoordinator {
    config: EngineConfig,
    oracle: Arc<dyn ProximityOracle>,
    server: Arc<dyn PairingServer>,
    roster: Arc<dyn PairRoster>,
    rules: Arc<dyn RulesProvider>,
    nearby: NearbyTracker,
    subscription: SubscriptionManager,
    availability: AvailabilityEngine,
    ledger: RequestLedger,
    /// Last advertising flag sent to the server, for change suppression.
    advertising: Mutex<Option<bool>>,
    cancel: CancellationToken,
    poll_loop: Mutex<Option<JoinHandle<()>>>,
}

impl PairingCoordinator {
    /// Create the coordinator.
    ///
    /// The background refresh loop is not running yet; call
    /// [`start`](Self::start) from within a Tokio runtime once the host is
    /// ready to receive events.
    pub fn new(collaborators: Collaborators, config: EngineConfig) -> Arc<Self> {
        let Collaborators {
            oracle,
            server,
            roster,
            rules,
            notes,
            sink,
        } = collaborators;

        let cancel = CancellationToken::new();

        Arc::new(Self {
            nearby: NearbyTracker::new(config.poll_interval),
            subscription: SubscriptionManager::new(Arc::clone(&server), &config, cancel.clone()),
            availability: AvailabilityEngine::new(
                Arc::clone(&oracle),
                Arc::clone(&roster),
                Arc::clone(&rules),
                Arc::clone(&sink),
                config.filter_rebuild_debounce,
            ),
            ledger: RequestLedger::new(
                Arc::clone(&server),
                Arc::clone(&oracle),
                Arc::clone(&rules),
                notes,
                sink,
            ),
            config,
            oracle,
            server,
            roster,
            rules,
            advertising: Mutex::new(None),
            cancel,
            poll_loop: Mutex::new(None),
        })
    }

    /// Start the background refresh loop. Ticks every poll interval until
    /// [`shutdown`](Self::shutdown); starting twice is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut slot = self.poll_loop.lock();
        if slot.is_some() {
            return;
        }
        *slot = Some(tokio::spawn(Self::run_poll_loop(Arc::clone(self))));
    }

    /// Background loop: tick a nearby refresh every poll interval until
    /// shutdown. A failed tick never kills the loop.
    async fn run_poll_loop(coordinator: Arc<Self>) {
        let mut interval = tokio::time::interval(coordinator.config.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = coordinator.cancel.cancelled() => {
                    tracing::debug!("nearby availability loop shutting down");
                    break;
                }
                _ = interval.tick() => {
                    coordinator.refresh_nearby(false).await;
                }
            }
        }
    }

    // =========================================================================
    // Lifecycle entry points
    // =========================================================================

    /// Connection established: reset subscription state, reconcile the
    /// advertising opt-in with the server, then refresh with retries until
    /// the push channel comes up (or settle for poll-only mode).
    pub async fn on_connected(&self) {
        self.subscription.mark_disconnected();
        self.nearby.reset_check();

        self.refresh_opt_in_from_server().await;
        self.sync_advertising(true).await;
        self.refresh_with_retries().await;
    }

    /// Connection re-established after a drop; same recovery as a fresh
    /// connect.
    pub async fn on_reconnected(&self) {
        self.on_connected().await;
    }

    /// Player logged in: the previous subscription location is meaningless
    /// and any pending requests belong to the previous character.
    pub async fn on_logged_in(&self) {
        self.subscription.forget_location();
        self.ledger.clear();
        self.refresh_with_retries().await;
    }

    /// Player logged out: tear down the subscription (best-effort) and
    /// drop all ephemeral state.
    pub async fn on_logged_out(&self) {
        self.subscription.stop().await;
        self.nearby.clear();
        self.ledger.clear();
        self.availability.clear();
    }

    /// Connection dropped: mark the subscription inactive and push the
    /// whole available set as unavailable so consumers see no one available
    /// immediately, without waiting for the next poll.
    pub fn on_disconnected(&self) {
        self.subscription.mark_disconnected();

        let unavailable: HashSet<Ident> = self.availability.available_idents().into_iter().collect();
        if !unavailable.is_empty() {
            self.availability
                .apply_delta(HashSet::new(), unavailable, true);
        }
    }

    /// Zone changed: the subscription location is stale, force a refresh
    /// that resubscribes as a new location.
    pub async fn on_zone_changed(&self) {
        self.subscription.forget_location();
        self.refresh_nearby(true).await;
    }

    /// Forced full resync after the host reports it can resume a previous
    /// session: rebuild the nearby snapshot from scratch, resolve the
    /// location (falling back to the hint values when live lookup reads
    /// zero), and force a full-snapshot subscription plus pending-request
    /// re-evaluation.
    pub async fn resume_from_suspend(&self, resume: ResumeRequest) {
        tracing::info!(
            resume_token = %resume.resume_token,
            nearby_hint = resume.nearby_hint_count,
            "resuming pairing availability subscription"
        );

        let Some(_permit) = self.nearby.acquire().await else {
            return;
        };

        if !self.rules.rules().pairing_enabled {
            return;
        }
        if !self.server.is_connected() {
            self.subscription.mark_disconnected();
            return;
        }

        let local = self.oracle.local_ident().await;
        self.availability.set_local_ident(local.clone());

        let nearby_set = self.observe_nearby(local.as_ref()).await;
        self.nearby.commit(nearby_set.clone());

        let mut location = Location::new(resume.world_id, resume.territory_id);
        if let Some(live) = self.oracle.location().await {
            location = live;
            if location.server_id == 0 {
                location.server_id = resume.world_id;
            }
            if location.territory_id == 0 {
                location.territory_id = resume.territory_id;
            }
        }

        self.nearby.mark_checked();

        self.subscription
            .update(location, &nearby_set, &nearby_set, &HashSet::new(), true, true)
            .await;

        self.ledger.evaluate_pending(&nearby_set).await;
    }

    /// Stop the background loop and tear down the subscription. Idempotent.
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let handle = self.poll_loop.lock().take();
        if let Some(handle) = handle {
            let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;
        }

        self.subscription.stop().await;
    }

    // =========================================================================
    // Configuration hooks
    // =========================================================================

    /// The host saved configuration: rebuild the filtered view and push the
    /// advertising flag if it changed.
    pub async fn rules_changed(&self) {
        self.availability.rebuild_filters();
        self.sync_advertising(false).await;
    }

    /// Push the advertising opt-in to the server when it differs from the
    /// last value sent (or unconditionally when forced).
    pub async fn sync_advertising(&self, force: bool) {
        let advertise = self.rules.rules().pairing_enabled;

        {
            let mut last_sent = self.advertising.lock();
            if !force && *last_sent == Some(advertise) {
                return;
            }
            *last_sent = Some(advertise);
        }

        if let Err(err) = self.server.set_opt_in(advertise).await {
            tracing::warn!(%err, "failed to send pairing availability update");
        }
    }

    /// Pull the server-side opt-in and reconcile local configuration with
    /// it; disabling clears availability immediately.
    async fn refresh_opt_in_from_server(&self) {
        if !self.server.is_connected() {
            return;
        }

        match self.server.get_opt_in().await {
            Ok(opt_in) => {
                if self.rules.rules().pairing_enabled == opt_in {
                    return;
                }
                self.rules.set_pairing_enabled(opt_in);
                if !opt_in {
                    self.availability.clear();
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to query pairing opt-in status");
            }
        }
    }

    // =========================================================================
    // Caller-facing operations
    // =========================================================================

    /// Send a pairing request to `target`. Ignored with a debug log while
    /// pairing is disabled.
    pub async fn send_request(&self, target: Ident) -> PairingResult<()> {
        if !self.rules.rules().pairing_enabled {
            tracing::debug!("pair request send ignored: pairing disabled");
            return Ok(());
        }

        self.server.send_request(target).await?;
        Ok(())
    }

    /// Deliver a decision on a pending request.
    pub async fn respond(&self, request_id: RequestId, accepted: bool, reason: Option<String>) {
        self.ledger.respond(request_id, accepted, reason).await;
    }

    /// Handle an inbound pairing request pushed by the server.
    pub async fn receive_request(&self, dto: PairRequest) {
        self.ledger.receive(dto).await;
    }

    /// Handle a server availability push for the current location.
    pub async fn handle_availability_push(
        &self,
        available: Vec<AvailabilityUpdate>,
        authoritative_scope: Option<&[Ident]>,
    ) {
        let nearby = self.nearby.snapshot();
        self.availability
            .update_availability(available, authoritative_scope, &nearby, true)
            .await;
    }

    // =========================================================================
    // Read accessors
    // =========================================================================

    /// Identities currently believed to be open to pairing.
    pub fn available_idents(&self) -> Vec<Ident> {
        self.availability.available_idents()
    }

    /// Accepted/filtered partition of the available set.
    pub fn filter_snapshot(&self) -> FilterSnapshot {
        self.availability.filter_snapshot()
    }

    /// Currently pending pairing requests.
    pub fn pending_requests(&self) -> Vec<PairRequest> {
        self.ledger.pending_requests()
    }

    /// Whether the availability subscription is active with a working push
    /// channel.
    pub fn is_channel_active(&self) -> bool {
        self.subscription.is_channel_active()
    }

    // =========================================================================
    // Nearby refresh
    // =========================================================================

    /// Refresh nearby availability.
    ///
    /// Non-forced calls are rate-limited to the poll interval and skip when
    /// a pass is already running; forced calls always wait for the gate and
    /// execute. Within a pass, proximity loss is applied before any server
    /// round-trip for newly-available identities.
    pub async fn refresh_nearby(&self, force: bool) {
        if !force && !self.nearby.is_due() {
            return;
        }

        let permit = if force {
            self.nearby.acquire().await
        } else {
            self.nearby.try_acquire()
        };
        let Some(_permit) = permit else {
            return;
        };

        if !self.rules.rules().pairing_enabled {
            self.availability.clear();
            self.nearby.mark_checked();
            return;
        }

        if !self.server.is_connected() {
            self.subscription.set_push_unavailable();
            // Retry on the next tick instead of waiting out the window.
            self.nearby.reset_check();
            return;
        }

        self.nearby.mark_checked();

        let nearby_set = self.refresh_pass(force).await;
        self.ledger.evaluate_pending(&nearby_set).await;
    }

    /// One refresh pass body; returns the freshly-observed nearby set.
    async fn refresh_pass(&self, force: bool) -> HashSet<Ident> {
        let local = self.oracle.local_ident().await;
        self.availability.set_local_ident(local.clone());

        let nearby_set = self.observe_nearby(local.as_ref()).await;
        let location = self.oracle.location().await;

        let delta = self.nearby.compute_delta(&nearby_set, force);

        // Proximity loss is authoritative for unavailability; apply it
        // before anything that touches the network.
        if !delta.left.is_empty() {
            self.availability
                .apply_delta(HashSet::new(), delta.left.clone(), true);
        }

        self.nearby.commit(nearby_set.clone());

        if nearby_set.is_empty() {
            self.availability.clear();
        }

        if let Some(location) = location {
            self.subscription
                .update(location, &nearby_set, &delta.entered, &delta.left, force, false)
                .await;
        }

        // Quiet pass on a healthy push channel: nothing to poll.
        if delta.entered.is_empty()
            && delta.left.is_empty()
            && !force
            && self.subscription.push_available()
        {
            return nearby_set;
        }

        let should_poll = force || !self.subscription.push_available();
        if should_poll && !nearby_set.is_empty() {
            let targets: Vec<Ident> = nearby_set.iter().cloned().collect();
            if let Err(err) = self.server.query_availability(targets).await {
                tracing::trace!(%err, "failed to query nearby pairing availability");
            }
        }

        nearby_set
    }

    /// Observe the nearby set: bounded oracle enumeration minus self and
    /// direct pairs.
    async fn observe_nearby(&self, local: Option<&Ident>) -> HashSet<Ident> {
        let mut nearby_set: HashSet<Ident> = self
            .oracle
            .nearby_idents(self.config.max_nearby_snapshot)
            .await
            .into_iter()
            .filter(|ident| !ident.is_blank())
            .collect();

        if let Some(local) = local {
            nearby_set.remove(local);
        }

        for paired in self.roster.direct_pair_idents().await {
            nearby_set.remove(&paired);
        }

        nearby_set
    }

    /// Forced refresh attempts at one-second intervals until the push
    /// channel comes up or attempts run out. A degraded poll-only outcome
    /// is acceptable, not fatal.
    async fn refresh_with_retries(&self) {
        for _ in 0..self.config.reconnect_refresh_attempts {
            if self.cancel.is_cancelled() {
                break;
            }

            self.refresh_nearby(true).await;

            if self.subscription.push_available() {
                break;
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.reconnect_refresh_delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_testkit::{
        MemoryNotes, MockOracle, MockRoster, MockServer, RecordingSink, StaticRules,
    };

    struct Fixture {
        oracle: Arc<MockOracle>,
        server: Arc<MockServer>,
        roster: Arc<MockRoster>,
        rules: Arc<StaticRules>,
        sink: Arc<RecordingSink>,
        coordinator: Arc<PairingCoordinator>,
    }

    fn fixture() -> Fixture {
        let oracle = Arc::new(MockOracle::new());
        let server = Arc::new(MockServer::new());
        let roster = Arc::new(MockRoster::new());
        let rules = Arc::new(StaticRules::enabled());
        let notes = Arc::new(MemoryNotes::new());
        let sink = Arc::new(RecordingSink::new());

        let coordinator = PairingCoordinator::new(
            Collaborators {
                oracle: Arc::clone(&oracle) as Arc<dyn ProximityOracle>,
                server: Arc::clone(&server) as Arc<dyn PairingServer>,
                roster: Arc::clone(&roster) as Arc<dyn PairRoster>,
                rules: Arc::clone(&rules) as Arc<dyn RulesProvider>,
                notes: notes as Arc<dyn NoteStore>,
                sink: Arc::clone(&sink) as Arc<dyn EventSink>,
            },
            EngineConfig {
                filter_rebuild_debounce: Duration::from_millis(10),
                ..EngineConfig::default()
            },
        );

        Fixture {
            oracle,
            server,
            roster,
            rules,
            sink,
            coordinator,
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_advertising_suppresses_duplicates() {
        let fx = fixture();

        fx.coordinator.sync_advertising(false).await;
        fx.coordinator.sync_advertising(false).await;
        assert_eq!(fx.server.opt_in_updates(), vec![true]);

        fx.coordinator.sync_advertising(true).await;
        assert_eq!(fx.server.opt_in_updates(), vec![true, true]);

        fx.rules.update(|rules| rules.pairing_enabled = false);
        fx.coordinator.sync_advertising(false).await;
        assert_eq!(fx.server.opt_in_updates(), vec![true, true, false]);

        fx.coordinator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_opt_out_disables_and_clears() {
        let fx = fixture();
        fx.oracle.set_local("me");
        fx.oracle.set_nearby(vec![Ident::new("a")]);
        fx.oracle.set_location(Some(Location::new(40, 129)));

        fx.coordinator
            .handle_availability_push(
                vec![AvailabilityUpdate {
                    ident: Ident::new("a"),
                }],
                None,
            )
            .await;
        settle().await;
        assert!(!fx.coordinator.available_idents().is_empty());

        fx.server.set_server_opt_in(false);
        fx.coordinator.on_connected().await;
        settle().await;

        assert!(!fx.rules.rules().pairing_enabled);
        assert!(fx.coordinator.available_idents().is_empty());

        fx.coordinator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_pushes_everyone_unavailable() {
        let fx = fixture();

        fx.coordinator
            .handle_availability_push(
                vec![
                    AvailabilityUpdate {
                        ident: Ident::new("a"),
                    },
                    AvailabilityUpdate {
                        ident: Ident::new("b"),
                    },
                ],
                None,
            )
            .await;
        settle().await;
        assert_eq!(fx.coordinator.available_idents().len(), 2);
        fx.sink.clear();

        fx.coordinator.on_disconnected();
        settle().await;

        assert!(fx.coordinator.available_idents().is_empty());
        assert!(fx.sink.availability_changed_count() >= 1);
        assert!(!fx.coordinator.is_channel_active());

        fx.coordinator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_request_ignored_while_disabled() {
        let fx = fixture();
        fx.rules.update(|rules| rules.pairing_enabled = false);

        fx.coordinator
            .send_request(Ident::new("target"))
            .await
            .unwrap();
        assert!(fx.server.sent_requests().is_empty());

        fx.rules.update(|rules| rules.pairing_enabled = true);
        fx.coordinator
            .send_request(Ident::new("target"))
            .await
            .unwrap();
        assert_eq!(fx.server.sent_requests(), vec![Ident::new("target")]);

        fx.coordinator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_refresh_subscribes_and_polls() {
        let fx = fixture();
        fx.oracle.set_local("me");
        fx.oracle
            .set_nearby(vec![Ident::new("me"), Ident::new("a"), Ident::new("b")]);
        fx.oracle.set_location(Some(Location::new(40, 129)));
        fx.roster.add_pair("b");

        fx.coordinator.refresh_nearby(true).await;

        // Self and the direct pair are excluded everywhere.
        let sent = fx.server.subscriptions();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].nearby, vec![Ident::new("a")]);
        assert_eq!(sent[0].added, vec![Ident::new("a")]);

        // Forced refresh polls availability for the whole nearby set.
        let queries = fx.server.queries();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0], vec![Ident::new("a")]);

        assert!(fx.coordinator.is_channel_active());

        fx.coordinator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiet_pass_on_push_channel_skips_poll() {
        let fx = fixture();
        fx.oracle.set_local("me");
        fx.oracle.set_nearby(vec![Ident::new("a")]);
        fx.oracle.set_location(Some(Location::new(40, 129)));

        fx.coordinator.refresh_nearby(true).await;
        assert_eq!(fx.server.queries().len(), 1);

        // Next non-forced pass: no deltas, push healthy — no new poll.
        tokio::time::advance(Duration::from_secs(6)).await;
        fx.coordinator.refresh_nearby(false).await;
        assert_eq!(fx.server.queries().len(), 1);

        fx.coordinator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_proximity_loss_is_applied_before_subscription() {
        let fx = fixture();
        fx.oracle.set_local("me");
        fx.oracle.set_nearby(vec![Ident::new("a"), Ident::new("b")]);
        fx.oracle.set_location(Some(Location::new(40, 129)));

        fx.coordinator.refresh_nearby(true).await;
        fx.coordinator
            .handle_availability_push(
                vec![
                    AvailabilityUpdate {
                        ident: Ident::new("a"),
                    },
                    AvailabilityUpdate {
                        ident: Ident::new("b"),
                    },
                ],
                None,
            )
            .await;
        settle().await;
        assert_eq!(fx.coordinator.available_idents().len(), 2);

        // "b" walks away.
        fx.oracle.set_nearby(vec![Ident::new("a")]);
        tokio::time::advance(Duration::from_secs(6)).await;
        fx.coordinator.refresh_nearby(false).await;
        settle().await;

        assert_eq!(fx.coordinator.available_idents(), vec![Ident::new("a")]);
        let last = fx.server.subscriptions().last().unwrap().clone();
        assert_eq!(last.removed, vec![Ident::new("b")]);

        fx.coordinator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_zone_change_forces_full_resubscribe() {
        let fx = fixture();
        fx.oracle.set_local("me");
        fx.oracle.set_nearby(vec![Ident::new("a")]);
        fx.oracle.set_location(Some(Location::new(40, 129)));

        fx.coordinator.refresh_nearby(true).await;
        assert_eq!(fx.server.subscriptions().len(), 1);

        // Same location id, but the location memory was dropped: the next
        // update is treated as a new subscription with a full snapshot.
        fx.coordinator.on_zone_changed().await;

        let sent = fx.server.subscriptions();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].nearby, vec![Ident::new("a")]);

        fx.coordinator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_retries_until_push_comes_up() {
        let fx = fixture();
        fx.oracle.set_local("me");
        fx.oracle.set_nearby(vec![Ident::new("a")]);
        fx.oracle.set_location(Some(Location::new(40, 129)));
        fx.server.set_push_available(false);

        let task = {
            let coordinator = Arc::clone(&fx.coordinator);
            tokio::spawn(async move { coordinator.on_connected().await })
        };

        // Push channel recovers while retries are running.
        tokio::time::sleep(Duration::from_millis(2500)).await;
        fx.server.set_push_available(true);
        task.await.unwrap();

        assert!(fx.coordinator.is_channel_active());
        // At least one retry happened before success.
        assert!(fx.server.subscriptions().len() >= 2);

        fx.coordinator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_forced_refreshes_are_serialized() {
        let fx = fixture();
        fx.oracle.set_local("me");
        fx.oracle.set_nearby(vec![Ident::new("a")]);
        fx.oracle.set_location(Some(Location::new(40, 129)));
        fx.oracle.set_nearby_delay(Duration::from_millis(20));

        let first = {
            let coordinator = Arc::clone(&fx.coordinator);
            tokio::spawn(async move { coordinator.refresh_nearby(true).await })
        };
        let second = {
            let coordinator = Arc::clone(&fx.coordinator);
            tokio::spawn(async move { coordinator.refresh_nearby(true).await })
        };

        first.await.unwrap();
        second.await.unwrap();

        // Both executed (two subscription updates), but never overlapped.
        assert_eq!(fx.oracle.max_concurrent_lookups(), 1);
        assert_eq!(fx.oracle.nearby_call_count(), 2);

        fx.coordinator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_rules_change_rebuilds_filtered_view() {
        let fx = fixture();
        fx.oracle.set_profile(
            "lowbie",
            murmur_core::ResolvedProfile {
                resolved: true,
                display_name: None,
                level: Some(10),
                home_region: Some(1),
                appearance: None,
            },
        );

        fx.coordinator
            .handle_availability_push(
                vec![AvailabilityUpdate {
                    ident: Ident::new("lowbie"),
                }],
                None,
            )
            .await;
        settle().await;
        assert_eq!(fx.coordinator.filter_snapshot().accepted.len(), 1);

        fx.rules.update(|rules| rules.minimum_level = 50);
        fx.coordinator.rules_changed().await;
        settle().await;

        let snapshot = fx.coordinator.filter_snapshot();
        assert!(snapshot.accepted.is_empty());
        assert_eq!(snapshot.filtered_count, 1);

        fx.coordinator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_drops_all_state() {
        let fx = fixture();
        fx.oracle.set_local("me");
        fx.oracle.set_nearby(vec![Ident::new("a")]);
        fx.oracle.set_location(Some(Location::new(40, 129)));

        fx.coordinator.refresh_nearby(true).await;
        fx.coordinator
            .handle_availability_push(
                vec![AvailabilityUpdate {
                    ident: Ident::new("a"),
                }],
                None,
            )
            .await;
        settle().await;
        assert!(!fx.coordinator.available_idents().is_empty());

        fx.coordinator.on_logged_out().await;
        settle().await;

        assert!(fx.coordinator.available_idents().is_empty());
        assert!(!fx.coordinator.is_channel_active());
        assert_eq!(fx.server.unsubscribe_count(), 1);

        fx.coordinator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_rebuilds_with_hint_location_fallback() {
        let fx = fixture();
        fx.oracle.set_local("me");
        fx.oracle.set_nearby(vec![Ident::new("a")]);
        // Live lookup reads a zeroed server id; hints must fill it in.
        fx.oracle.set_location(Some(Location::new(0, 129)));

        fx.coordinator
            .resume_from_suspend(ResumeRequest {
                resume_token: "token-1".to_string(),
                world_id: 40,
                territory_id: 999,
                nearby_hint_count: 1,
            })
            .await;

        let sent = fx.server.subscriptions();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].server_id, 40);
        assert_eq!(sent[0].territory_id, 129);
        assert_eq!(sent[0].nearby, vec![Ident::new("a")]);
        assert_eq!(sent[0].added, vec![Ident::new("a")]);

        fx.coordinator.shutdown().await;
    }
}
