//! Nearby set tracking
//!
//! Owns the previous proximity snapshot and the exclusivity gate for refresh
//! passes. The tracker itself is pure bookkeeping: the coordinator drives
//! the oracle and applies the computed deltas.
//!
//! Two callers contend for a refresh: the periodic background tick
//! (opportunistic — skips when a pass is already running) and lifecycle
//! events (forced — block until they hold the gate). The same semaphore
//! serves both through its try-acquire / acquire duality.

use murmur_core::Ident;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::time::Instant;

/// Entered/left deltas computed against the previous snapshot.
#[derive(Debug, Clone, Default)]
pub struct NearbyDelta {
    /// Identities present now but not in the previous snapshot. A forced
    /// refresh treats the whole nearby set as newly entered.
    pub entered: HashSet<Ident>,
    /// Identities in the previous snapshot that are no longer nearby.
    /// Proximity loss is authoritative: these become unavailable before any
    /// server round-trip.
    pub left: HashSet<Ident>,
}

/// Tracks the nearby identity snapshot and gates refresh passes.
pub struct NearbyTracker {
    refresh_gate: Semaphore,
    last_check: Mutex<Option<Instant>>,
    snapshot: Mutex<HashSet<Ident>>,
    poll_interval: Duration,
}

impl NearbyTracker {
    /// Create a tracker with an empty snapshot.
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            refresh_gate: Semaphore::new(1),
            last_check: Mutex::new(None),
            snapshot: Mutex::new(HashSet::new()),
            poll_interval,
        }
    }

    /// Block until this caller holds the refresh gate.
    ///
    /// Returns `None` only if the gate has been closed, which this engine
    /// never does.
    pub async fn acquire(&self) -> Option<SemaphorePermit<'_>> {
        self.refresh_gate.acquire().await.ok()
    }

    /// Try to take the refresh gate without waiting. `None` means a pass is
    /// already running and this opportunistic caller should skip.
    pub fn try_acquire(&self) -> Option<SemaphorePermit<'_>> {
        self.refresh_gate.try_acquire().ok()
    }

    /// Whether enough time has passed since the last completed check for an
    /// opportunistic refresh to run.
    pub fn is_due(&self) -> bool {
        match *self.last_check.lock() {
            None => true,
            Some(last) => Instant::now().duration_since(last) >= self.poll_interval,
        }
    }

    /// Record that a check ran now.
    pub fn mark_checked(&self) {
        *self.last_check.lock() = Some(Instant::now());
    }

    /// Forget the last check time so the next opportunistic tick runs
    /// immediately (used while disconnected and after reconnect).
    pub fn reset_check(&self) {
        *self.last_check.lock() = None;
    }

    /// Copy of the current snapshot.
    pub fn snapshot(&self) -> HashSet<Ident> {
        self.snapshot.lock().clone()
    }

    /// Drop the snapshot entirely (logout).
    pub fn clear(&self) {
        self.snapshot.lock().clear();
    }

    /// Compute entered/left deltas of `nearby` against the current snapshot.
    ///
    /// A forced refresh reports the entire nearby set as entered, since
    /// force means "treat everything as new".
    pub fn compute_delta(&self, nearby: &HashSet<Ident>, force: bool) -> NearbyDelta {
        let previous = self.snapshot.lock();

        let entered = if force {
            nearby.clone()
        } else {
            nearby.difference(&previous).cloned().collect()
        };
        let left = previous.difference(nearby).cloned().collect();

        NearbyDelta { entered, left }
    }

    /// Replace the snapshot with the freshly-observed nearby set.
    pub fn commit(&self, nearby: HashSet<Ident>) {
        *self.snapshot.lock() = nearby;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idents(tokens: &[&str]) -> HashSet<Ident> {
        tokens.iter().map(|token| Ident::new(*token)).collect()
    }

    #[test]
    fn test_delta_against_previous_snapshot() {
        let tracker = NearbyTracker::new(Duration::from_secs(5));
        tracker.commit(idents(&["a", "b", "c"]));

        let delta = tracker.compute_delta(&idents(&["b", "c", "d"]), false);
        assert_eq!(delta.entered, idents(&["d"]));
        assert_eq!(delta.left, idents(&["a"]));
    }

    #[test]
    fn test_forced_delta_treats_everything_as_entered() {
        let tracker = NearbyTracker::new(Duration::from_secs(5));
        tracker.commit(idents(&["a", "b"]));

        let delta = tracker.compute_delta(&idents(&["b", "c"]), true);
        assert_eq!(delta.entered, idents(&["b", "c"]));
        assert_eq!(delta.left, idents(&["a"]));
    }

    #[test]
    fn test_try_acquire_skips_while_held() {
        let tracker = NearbyTracker::new(Duration::from_secs(5));

        let held = tracker.try_acquire();
        assert!(held.is_some());
        assert!(tracker.try_acquire().is_none());

        drop(held);
        assert!(tracker.try_acquire().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_window() {
        let tracker = NearbyTracker::new(Duration::from_secs(5));
        assert!(tracker.is_due());

        tracker.mark_checked();
        assert!(!tracker.is_due());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(tracker.is_due());

        tracker.mark_checked();
        tracker.reset_check();
        assert!(tracker.is_due());
    }

    #[tokio::test]
    async fn test_forced_acquire_waits_for_release() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let tracker = Arc::new(NearbyTracker::new(Duration::from_secs(5)));
        let running = Arc::new(AtomicUsize::new(0));
        let max_running = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..2 {
            let tracker = Arc::clone(&tracker);
            let running = Arc::clone(&running);
            let max_running = Arc::clone(&max_running);
            handles.push(tokio::spawn(async move {
                let _permit = tracker.acquire().await.unwrap();
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                max_running.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_running.load(Ordering::SeqCst), 1);
    }
}
