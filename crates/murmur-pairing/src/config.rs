//! Engine timing and sizing configuration

use std::time::Duration;

/// Default interval between background nearby refreshes; also the fallback
/// polling frequency when the push channel is unavailable.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default cap on the nearby snapshot size.
pub const DEFAULT_MAX_NEARBY_SNAPSHOT: usize = 1024;

/// Server-imposed cap on subscription payload lists. Exceeding payloads are
/// trimmed locally with a warning rather than rejected by the server.
pub const SUBSCRIPTION_PAYLOAD_CAP: usize = 256;

/// Default debounce applied before a filter rebuild starts evaluating, so a
/// burst of configuration saves collapses into one rebuild.
pub const DEFAULT_FILTER_REBUILD_DEBOUNCE: Duration = Duration::from_millis(150);

/// Timing and sizing knobs for the pairing engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Interval between background nearby refreshes.
    pub poll_interval: Duration,
    /// Maximum number of identities kept in the nearby snapshot.
    pub max_nearby_snapshot: usize,
    /// Maximum entries per subscription payload list.
    pub subscription_payload_cap: usize,
    /// Attempts to wait for the connection during a forced subscription
    /// update.
    pub connection_wait_attempts: u32,
    /// Delay between connection-wait attempts.
    pub connection_wait_delay: Duration,
    /// Forced refresh attempts after connect/reconnect before settling for
    /// poll-only mode.
    pub reconnect_refresh_attempts: u32,
    /// Delay between post-reconnect refresh attempts.
    pub reconnect_refresh_delay: Duration,
    /// Debounce before a filter rebuild starts evaluating.
    pub filter_rebuild_debounce: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_nearby_snapshot: DEFAULT_MAX_NEARBY_SNAPSHOT,
            subscription_payload_cap: SUBSCRIPTION_PAYLOAD_CAP,
            connection_wait_attempts: 10,
            connection_wait_delay: Duration::from_millis(200),
            reconnect_refresh_attempts: 5,
            reconnect_refresh_delay: Duration::from_secs(1),
            filter_rebuild_debounce: DEFAULT_FILTER_REBUILD_DEBOUNCE,
        }
    }
}
