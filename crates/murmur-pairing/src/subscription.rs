//! Availability subscription management
//!
//! Keeps the server-side availability subscription current for the local
//! player's location, or degrades to poll-only mode when the push channel
//! is unavailable. Subscription churn under concurrent triggers (zone
//! change and periodic tick firing together) is prevented by the same
//! try-acquire / block-acquire semaphore duality the nearby tracker uses.

use crate::config::EngineConfig;
use murmur_core::{AvailabilitySubscription, Ident, Location, PairingServer};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Current subscription state, readable as one consistent snapshot.
#[derive(Debug, Clone, Copy, Default)]
struct SubscriptionState {
    active: bool,
    push_available: bool,
    last_location: Option<Location>,
}

/// Maintains the availability push subscription.
pub struct SubscriptionManager {
    server: Arc<dyn PairingServer>,
    update_gate: Semaphore,
    state: Mutex<SubscriptionState>,
    payload_cap: usize,
    wait_attempts: u32,
    wait_delay: Duration,
    cancel: CancellationToken,
}

impl SubscriptionManager {
    /// Create a manager with no active subscription.
    pub fn new(
        server: Arc<dyn PairingServer>,
        config: &EngineConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            server,
            update_gate: Semaphore::new(1),
            state: Mutex::new(SubscriptionState::default()),
            payload_cap: config.subscription_payload_cap,
            wait_attempts: config.connection_wait_attempts,
            wait_delay: config.connection_wait_delay,
            cancel,
        }
    }

    /// Whether the push channel reported itself available on the last
    /// update.
    pub fn push_available(&self) -> bool {
        self.state.lock().push_available
    }

    /// Whether an availability subscription is active with a working push
    /// channel.
    pub fn is_channel_active(&self) -> bool {
        let state = self.state.lock();
        state.active && state.push_available
    }

    /// Mark the push channel unavailable (connection observed down during a
    /// refresh pass).
    pub fn set_push_unavailable(&self) {
        self.state.lock().push_available = false;
    }

    /// Mark the whole subscription torn down without contacting the server
    /// (connection already gone).
    pub fn mark_disconnected(&self) {
        let mut state = self.state.lock();
        state.active = false;
        state.push_available = false;
        state.last_location = None;
    }

    /// Forget the subscribed location so the next update resubscribes with
    /// a full snapshot (zone change, login).
    pub fn forget_location(&self) {
        self.state.lock().last_location = None;
    }

    /// Create or update the subscription for `location`.
    ///
    /// A changed location (either field) forces a full-snapshot resubscribe;
    /// otherwise only the entered/left deltas are sent. Returns whether the
    /// push channel is available afterwards.
    ///
    /// Non-forced callers skip when another update is in flight or when the
    /// connection is down; forced callers block on the gate and wait a
    /// bounded time for the connection.
    pub async fn update(
        &self,
        location: Location,
        nearby: &HashSet<Ident>,
        entered: &HashSet<Ident>,
        left: &HashSet<Ident>,
        force: bool,
        force_full_snapshot: bool,
    ) -> bool {
        let requires_new_subscription = self.state.lock().last_location != Some(location);

        let _permit = if force {
            match self.update_gate.acquire().await {
                Ok(permit) => permit,
                Err(_) => return self.push_available(),
            }
        } else {
            match self.update_gate.try_acquire() {
                Ok(permit) => permit,
                Err(_) => return self.push_available(),
            }
        };

        if !self.server.is_connected() && (!force || !self.wait_for_connection().await) {
            let mut state = self.state.lock();
            state.push_available = false;
            state.active = false;
            return false;
        }

        let send_full_snapshot = force_full_snapshot || requires_new_subscription;
        let mut nearby_payload: Vec<Ident> = if send_full_snapshot {
            sorted(nearby)
        } else {
            Vec::new()
        };
        let mut added_payload: Vec<Ident> = if send_full_snapshot {
            sorted(nearby)
        } else {
            sorted(entered)
        };
        let removed_payload = sorted(left);

        if send_full_snapshot && nearby_payload.len() > self.payload_cap {
            tracing::warn!(
                count = nearby_payload.len(),
                cap = self.payload_cap,
                "nearby ident snapshot exceeds server cap; trimming"
            );
            nearby_payload.truncate(self.payload_cap);
            added_payload.truncate(self.payload_cap);
        }

        let subscription = AvailabilitySubscription {
            server_id: location.server_id,
            territory_id: location.territory_id,
            nearby: nearby_payload,
            added: added_payload,
            removed: removed_payload,
        };

        match self.server.subscribe(subscription).await {
            Ok(push_available) => {
                let mut state = self.state.lock();
                state.push_available = push_available;
                state.active = push_available;
                state.last_location = Some(location);
                push_available
            }
            Err(err) => {
                tracing::trace!(%err, "failed to update availability subscription");
                self.state.lock().push_available = false;
                false
            }
        }
    }

    /// Unsubscribe from the server (best-effort) and reset all state.
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock();
            if !state.active {
                state.push_available = false;
                state.last_location = None;
                return;
            }
        }

        let _permit = match self.update_gate.acquire().await {
            Ok(permit) => permit,
            Err(_) => return,
        };

        if self.server.is_connected() {
            if let Err(err) = self.server.unsubscribe().await {
                tracing::trace!(%err, "failed to unsubscribe from availability push channel");
            }
        }

        self.mark_disconnected();
    }

    /// Wait a bounded time for the connection to come up during a forced
    /// update. Honors engine shutdown at every delay.
    async fn wait_for_connection(&self) -> bool {
        for _ in 0..self.wait_attempts {
            if self.cancel.is_cancelled() {
                break;
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.wait_delay) => {}
            }

            if self.server.is_connected() {
                return true;
            }
        }

        self.server.is_connected()
    }
}

fn sorted(idents: &HashSet<Ident>) -> Vec<Ident> {
    let mut ordered: Vec<Ident> = idents.iter().cloned().collect();
    ordered.sort_unstable();
    ordered
}
