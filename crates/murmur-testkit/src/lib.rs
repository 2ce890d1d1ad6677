//! Murmur-Testkit: In-Memory Mock Collaborators
//!
//! Hand-rolled mock implementations of the `murmur-core` collaborator
//! traits, used by the engine's unit and integration tests. Every mock is
//! cheap, deterministic, and inspectable after the fact.

#![deny(missing_docs)]
#![forbid(unsafe_code)]

use async_trait::async_trait;
use murmur_core::{
    AccountRef, AvailabilitySubscription, EventSink, Ident, Location, NoteStore, PairRoster,
    PairingEvent, PairingRules, PairingServer, ProximityOracle, RequestDecision, ResolvedProfile,
    RulesProvider, TransportError,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Configurable proximity oracle.
///
/// Tracks how many `nearby_idents` calls are in flight at once so tests can
/// assert mutual-exclusion guarantees.
#[derive(Default)]
pub struct MockOracle {
    local: Mutex<Option<Ident>>,
    nearby: Mutex<Vec<Ident>>,
    location: Mutex<Option<Location>>,
    profiles: Mutex<HashMap<Ident, ResolvedProfile>>,
    friends: Mutex<Vec<Ident>>,
    styled: Mutex<HashMap<Ident, String>>,
    region_names: Mutex<HashMap<u16, String>>,
    nearby_delay: Mutex<Option<Duration>>,
    active_lookups: AtomicUsize,
    max_active_lookups: AtomicUsize,
    nearby_calls: AtomicUsize,
}

impl MockOracle {
    /// Create an oracle with nothing resolvable.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the local player's ident.
    pub fn set_local(&self, ident: impl Into<Ident>) {
        *self.local.lock() = Some(ident.into());
    }

    /// Replace the nearby set.
    pub fn set_nearby(&self, idents: Vec<Ident>) {
        *self.nearby.lock() = idents;
    }

    /// Set the current location.
    pub fn set_location(&self, location: Option<Location>) {
        *self.location.lock() = location;
    }

    /// Register a resolvable profile for an ident.
    pub fn set_profile(&self, ident: impl Into<Ident>, profile: ResolvedProfile) {
        self.profiles.lock().insert(ident.into(), profile);
    }

    /// Mark an ident as a friend.
    pub fn add_friend(&self, ident: impl Into<Ident>) {
        self.friends.lock().push(ident.into());
    }

    /// Register an appearance container for an ident.
    pub fn set_styled_appearance(&self, ident: impl Into<Ident>, blob: String) {
        self.styled.lock().insert(ident.into(), blob);
    }

    /// Register a region display name.
    pub fn set_region_name(&self, region_id: u16, name: impl Into<String>) {
        self.region_names.lock().insert(region_id, name.into());
    }

    /// Make every nearby lookup take `delay`, widening race windows.
    pub fn set_nearby_delay(&self, delay: Duration) {
        *self.nearby_delay.lock() = Some(delay);
    }

    /// Highest number of nearby lookups ever in flight simultaneously.
    pub fn max_concurrent_lookups(&self) -> usize {
        self.max_active_lookups.load(Ordering::SeqCst)
    }

    /// Total number of nearby lookups performed.
    pub fn nearby_call_count(&self) -> usize {
        self.nearby_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProximityOracle for MockOracle {
    async fn local_ident(&self) -> Option<Ident> {
        self.local.lock().clone()
    }

    async fn nearby_idents(&self, max: usize) -> Vec<Ident> {
        self.nearby_calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active_lookups.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_lookups.fetch_max(active, Ordering::SeqCst);

        let delay = *self.nearby_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let result: Vec<Ident> = self.nearby.lock().iter().take(max).cloned().collect();
        self.active_lookups.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn location(&self) -> Option<Location> {
        *self.location.lock()
    }

    async fn resolve_profile(&self, ident: &Ident) -> ResolvedProfile {
        self.profiles
            .lock()
            .get(ident)
            .cloned()
            .unwrap_or_else(ResolvedProfile::unresolved)
    }

    async fn is_friend(&self, ident: &Ident) -> bool {
        self.friends.lock().contains(ident)
    }

    async fn styled_appearance(&self, ident: &Ident) -> Option<String> {
        self.styled.lock().get(ident).cloned()
    }

    fn region_name(&self, region_id: u16) -> Option<String> {
        self.region_names.lock().get(&region_id).cloned()
    }
}

/// Recording pairing-server mock.
///
/// Records every call for later inspection and lets tests script the
/// connection flag and subscribe outcome.
pub struct MockServer {
    connected: AtomicBool,
    push_available: AtomicBool,
    subscribe_fails: AtomicBool,
    opt_in: AtomicBool,
    subscriptions: Mutex<Vec<AvailabilitySubscription>>,
    unsubscribes: AtomicUsize,
    queries: Mutex<Vec<Vec<Ident>>>,
    sent_requests: Mutex<Vec<Ident>>,
    decisions: Mutex<Vec<RequestDecision>>,
    opt_in_updates: Mutex<Vec<bool>>,
}

impl Default for MockServer {
    fn default() -> Self {
        Self {
            connected: AtomicBool::new(true),
            push_available: AtomicBool::new(true),
            subscribe_fails: AtomicBool::new(false),
            opt_in: AtomicBool::new(true),
            subscriptions: Mutex::new(Vec::new()),
            unsubscribes: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
            sent_requests: Mutex::new(Vec::new()),
            decisions: Mutex::new(Vec::new()),
            opt_in_updates: Mutex::new(Vec::new()),
        }
    }
}

impl MockServer {
    /// Create a connected server whose push channel works.
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the connection flag.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Script whether subscribe reports the push channel as available.
    pub fn set_push_available(&self, available: bool) {
        self.push_available.store(available, Ordering::SeqCst);
    }

    /// Script subscribe to fail with a transport error.
    pub fn set_subscribe_fails(&self, fails: bool) {
        self.subscribe_fails.store(fails, Ordering::SeqCst);
    }

    /// Script the server-side opt-in flag.
    pub fn set_server_opt_in(&self, opt_in: bool) {
        self.opt_in.store(opt_in, Ordering::SeqCst);
    }

    /// All subscription payloads received, in order.
    pub fn subscriptions(&self) -> Vec<AvailabilitySubscription> {
        self.subscriptions.lock().clone()
    }

    /// Number of unsubscribe calls received.
    pub fn unsubscribe_count(&self) -> usize {
        self.unsubscribes.load(Ordering::SeqCst)
    }

    /// All availability queries received, in order.
    pub fn queries(&self) -> Vec<Vec<Ident>> {
        self.queries.lock().clone()
    }

    /// All outbound pairing requests, in order.
    pub fn sent_requests(&self) -> Vec<Ident> {
        self.sent_requests.lock().clone()
    }

    /// All request decisions received, in order.
    pub fn decisions(&self) -> Vec<RequestDecision> {
        self.decisions.lock().clone()
    }

    /// All opt-in updates received, in order.
    pub fn opt_in_updates(&self) -> Vec<bool> {
        self.opt_in_updates.lock().clone()
    }
}

#[async_trait]
impl PairingServer for MockServer {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn set_opt_in(&self, advertise: bool) -> Result<(), TransportError> {
        self.opt_in_updates.lock().push(advertise);
        Ok(())
    }

    async fn get_opt_in(&self) -> Result<bool, TransportError> {
        Ok(self.opt_in.load(Ordering::SeqCst))
    }

    async fn query_availability(&self, idents: Vec<Ident>) -> Result<(), TransportError> {
        self.queries.lock().push(idents);
        Ok(())
    }

    async fn subscribe(
        &self,
        subscription: AvailabilitySubscription,
    ) -> Result<bool, TransportError> {
        if self.subscribe_fails.load(Ordering::SeqCst) {
            return Err(TransportError::CallFailed("scripted failure".into()));
        }
        self.subscriptions.lock().push(subscription);
        Ok(self.push_available.load(Ordering::SeqCst))
    }

    async fn unsubscribe(&self) -> Result<(), TransportError> {
        self.unsubscribes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send_request(&self, target: Ident) -> Result<(), TransportError> {
        self.sent_requests.lock().push(target);
        Ok(())
    }

    async fn respond(&self, decision: RequestDecision) -> Result<(), TransportError> {
        self.decisions.lock().push(decision);
        Ok(())
    }
}

/// Mutable in-memory pair roster.
#[derive(Default)]
pub struct MockRoster {
    pairs: Mutex<Vec<Ident>>,
}

impl MockRoster {
    /// Create an empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a direct pair.
    pub fn add_pair(&self, ident: impl Into<Ident>) {
        self.pairs.lock().push(ident.into());
    }
}

#[async_trait]
impl PairRoster for MockRoster {
    async fn direct_pair_idents(&self) -> Vec<Ident> {
        self.pairs.lock().clone()
    }
}

/// Mutable in-memory rules provider.
#[derive(Default)]
pub struct StaticRules {
    rules: Mutex<PairingRules>,
}

impl StaticRules {
    /// Start with pairing enabled and no filters.
    pub fn enabled() -> Self {
        let provider = Self::default();
        provider.update(|rules| rules.pairing_enabled = true);
        provider
    }

    /// Mutate the rules in place.
    pub fn update(&self, f: impl FnOnce(&mut PairingRules)) {
        f(&mut self.rules.lock());
    }
}

impl RulesProvider for StaticRules {
    fn rules(&self) -> PairingRules {
        self.rules.lock().clone()
    }

    fn set_pairing_enabled(&self, enabled: bool) {
        self.rules.lock().pairing_enabled = enabled;
    }
}

/// In-memory note store.
#[derive(Default)]
pub struct MemoryNotes {
    notes: Mutex<HashMap<AccountRef, String>>,
    names: Mutex<HashMap<AccountRef, String>>,
}

impl MemoryNotes {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last recorded display name for an account.
    pub fn display_name_for(&self, account: &AccountRef) -> Option<String> {
        self.names.lock().get(account).cloned()
    }
}

impl NoteStore for MemoryNotes {
    fn note_for(&self, account: &AccountRef) -> Option<String> {
        self.notes.lock().get(account).cloned()
    }

    fn set_note(&self, account: &AccountRef, note: &str) {
        self.notes.lock().insert(account.clone(), note.to_string());
    }

    fn set_display_name(&self, account: &AccountRef, name: &str) {
        self.names.lock().insert(account.clone(), name.to_string());
    }
}

/// Event sink that records everything it receives.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<PairingEvent>>,
}

impl RecordingSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All events received so far.
    pub fn events(&self) -> Vec<PairingEvent> {
        self.events.lock().clone()
    }

    /// Number of `AvailabilityChanged` events received.
    pub fn availability_changed_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| matches!(event, PairingEvent::AvailabilityChanged))
            .count()
    }

    /// Number of `PendingListChanged` events received.
    pub fn pending_changed_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| matches!(event, PairingEvent::PendingListChanged))
            .count()
    }

    /// Drop all recorded events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: PairingEvent) {
        self.events.lock().push(event);
    }
}
