//! User-configured pairing rules
//!
//! Read-only from the engine's perspective; the configuration store owns the
//! values and the host notifies the engine after saves.

use crate::profile::AppearanceKey;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Snapshot of the pairing configuration at one point in time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PairingRules {
    /// Global feature switch. When off, the engine clears all availability
    /// state and stops advertising.
    pub pairing_enabled: bool,
    /// Only accept pairing requests from friends.
    pub friends_only: bool,
    /// Minimum requester level; 0 disables the check.
    pub minimum_level: u8,
    /// Home regions whose requests are auto-rejected.
    pub rejected_regions: HashSet<u16>,
    /// Appearance combinations whose requests are auto-rejected.
    pub rejected_appearances: HashSet<AppearanceKey>,
}

impl PairingRules {
    /// Whether any auto-reject filter is configured at all. With no filters
    /// the evaluation short-circuits to accept without resolving anything.
    pub fn has_filters(&self) -> bool {
        self.friends_only
            || self.minimum_level > 0
            || !self.rejected_regions.is_empty()
            || !self.rejected_appearances.is_empty()
    }

    /// Whether appearance-combination filters are configured.
    pub fn has_appearance_filters(&self) -> bool {
        !self.rejected_appearances.is_empty()
    }
}
