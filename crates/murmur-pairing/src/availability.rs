//! Available-identity set and its filtered view
//!
//! Owns the canonical set of identities currently believed to be open to
//! pairing, mutated only through delta application, plus a derived
//! accepted/filtered partition computed by evaluating the auto-reject rules
//! against each identity.
//!
//! The partition is a read-mostly cache rebuilt wholesale on every
//! availability change and every configuration save. Rebuilds run on a
//! background task with latest-wins cancellation so a configuration save
//! arriving mid-rebuild always ends up reflected; the write path never
//! waits on a rebuild.

use crate::filter::{self, Verdict};
use murmur_core::{
    AvailabilityUpdate, EventSink, Ident, PairRoster, PairingEvent, ProximityOracle, RulesProvider,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Published accepted/filtered partition of the available set.
#[derive(Debug, Clone, Default)]
pub struct FilterSnapshot {
    /// Identities that pass every configured auto-reject rule.
    pub accepted: Vec<Ident>,
    /// Number of identities hidden by the rules.
    pub filtered_count: usize,
}

#[derive(Debug, Default)]
struct FilterState {
    accepted: HashSet<Ident>,
    filtered: HashSet<Ident>,
}

/// Owns the available set and its filtered view.
pub struct AvailabilityEngine {
    oracle: Arc<dyn ProximityOracle>,
    roster: Arc<dyn PairRoster>,
    rules: Arc<dyn RulesProvider>,
    sink: Arc<dyn EventSink>,
    local_ident: Mutex<Option<Ident>>,
    available: Mutex<HashSet<Ident>>,
    filter: Arc<Mutex<FilterState>>,
    rebuild_token: Mutex<CancellationToken>,
    rebuild_debounce: Duration,
}

impl AvailabilityEngine {
    /// Create an engine with an empty available set.
    pub fn new(
        oracle: Arc<dyn ProximityOracle>,
        roster: Arc<dyn PairRoster>,
        rules: Arc<dyn RulesProvider>,
        sink: Arc<dyn EventSink>,
        rebuild_debounce: Duration,
    ) -> Self {
        Self {
            oracle,
            roster,
            rules,
            sink,
            local_ident: Mutex::new(None),
            available: Mutex::new(HashSet::new()),
            filter: Arc::new(Mutex::new(FilterState::default())),
            rebuild_token: Mutex::new(CancellationToken::new()),
            rebuild_debounce,
        }
    }

    /// Record the local player's ident so it can be stripped from every
    /// delta.
    pub fn set_local_ident(&self, ident: Option<Ident>) {
        *self.local_ident.lock() = ident;
    }

    /// Copy of the current available set.
    pub fn available_idents(&self) -> Vec<Ident> {
        self.available.lock().iter().cloned().collect()
    }

    /// Whether any identity is currently available.
    pub fn is_empty(&self) -> bool {
        self.available.lock().is_empty()
    }

    /// Current accepted/filtered partition.
    pub fn filter_snapshot(&self) -> FilterSnapshot {
        let state = self.filter.lock();
        FilterSnapshot {
            accepted: state.accepted.iter().cloned().collect(),
            filtered_count: state.filtered.len(),
        }
    }

    /// Apply an availability delta: removals first, then additions.
    ///
    /// When pairing is globally disabled this clears everything instead.
    /// The local ident is stripped from both input sets. If nothing
    /// actually changed, no rebuild is scheduled and no event is published.
    pub fn apply_delta(
        &self,
        additions: HashSet<Ident>,
        removals: HashSet<Ident>,
        publish_immediately: bool,
    ) {
        if !self.rules.rules().pairing_enabled {
            self.clear();
            return;
        }

        let local = self.local_ident.lock().clone();
        let keep = |ident: &Ident| !ident.is_blank() && Some(ident) != local.as_ref();

        let changed = {
            let mut available = self.available.lock();
            let mut changed = false;
            for ident in removals.iter().filter(|ident| keep(*ident)) {
                changed |= available.remove(ident);
            }
            for ident in additions.into_iter().filter(|ident| keep(ident)) {
                changed |= available.insert(ident);
            }
            changed
        };

        if !changed {
            return;
        }

        self.rebuild_filters();

        if publish_immediately {
            self.sink.publish(PairingEvent::AvailabilityChanged);
        }
    }

    /// Reconcile a server-reported availability list against local
    /// constraints.
    ///
    /// Self and already-directly-paired identities are dropped, and the
    /// result is intersected with the current nearby snapshot: local
    /// proximity is the ground truth, so identities the server believes
    /// available but that are not nearby cannot remain available. When the
    /// server supplies an `authoritative_scope` ("these are all the idents
    /// that matter right now"), anything in scope but absent from the
    /// incoming list becomes unavailable.
    pub async fn update_availability(
        &self,
        available: Vec<AvailabilityUpdate>,
        authoritative_scope: Option<&[Ident]>,
        nearby: &HashSet<Ident>,
        publish_immediately: bool,
    ) {
        let mut incoming: HashSet<Ident> = available
            .into_iter()
            .map(|update| update.ident)
            .filter(|ident| !ident.is_blank())
            .collect();

        if let Some(local) = self.local_ident.lock().clone() {
            incoming.remove(&local);
        }

        for paired in self.roster.direct_pair_idents().await {
            incoming.remove(&paired);
        }

        if !nearby.is_empty() {
            incoming.retain(|ident| nearby.contains(ident));
        }

        let unavailable: HashSet<Ident> = match authoritative_scope {
            Some(scope) => scope
                .iter()
                .filter(|ident| !incoming.contains(*ident))
                .cloned()
                .collect(),
            None => HashSet::new(),
        };

        self.apply_delta(incoming, unavailable, publish_immediately);
    }

    /// Rebuild the accepted/filtered partition on a background task.
    ///
    /// Cancels any in-flight rebuild first; the previous rebuild observes
    /// its cancellation before publishing, so the latest rebuild always
    /// wins. Evaluation runs with deferral disabled: an identity whose
    /// attributes cannot be read counts as filtered rather than pending.
    pub fn rebuild_filters(&self) {
        let snapshot: Vec<Ident> = self.available.lock().iter().cloned().collect();

        let token = {
            let mut current = self.rebuild_token.lock();
            current.cancel();
            *current = CancellationToken::new();
            current.clone()
        };

        let oracle = Arc::clone(&self.oracle);
        let rules_provider = Arc::clone(&self.rules);
        let sink = Arc::clone(&self.sink);
        let filter_state = Arc::clone(&self.filter);
        let debounce = self.rebuild_debounce;

        tokio::spawn(async move {
            if !debounce.is_zero() {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(debounce) => {}
                }
            }

            let rules = rules_provider.rules();
            let mut accepted = HashSet::new();
            let mut filtered = HashSet::new();

            for ident in snapshot {
                if token.is_cancelled() {
                    return;
                }

                match filter::evaluate(oracle.as_ref(), &rules, &ident, false).await {
                    Verdict::Reject { .. } => filtered.insert(ident),
                    Verdict::Accept | Verdict::Defer => accepted.insert(ident),
                };
            }

            {
                let mut state = filter_state.lock();
                if token.is_cancelled() {
                    return;
                }
                state.accepted = accepted;
                state.filtered = filtered;
            }

            sink.publish(PairingEvent::AvailabilityChanged);
        });
    }

    /// Empty the available set and the filter partition, then notify.
    ///
    /// No-op (and no event) when nothing was available. The two structures
    /// are cleared under separate critical sections; the in-flight rebuild,
    /// if any, is cancelled so it cannot repopulate the partition from a
    /// stale snapshot.
    pub fn clear(&self) {
        {
            let mut available = self.available.lock();
            if available.is_empty() {
                return;
            }
            available.clear();
        }

        self.rebuild_token.lock().cancel();

        {
            let mut state = self.filter.lock();
            state.accepted.clear();
            state.filtered.clear();
        }

        self.sink.publish(PairingEvent::AvailabilityChanged);
    }
}
