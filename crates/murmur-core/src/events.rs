//! Domain events published by the pairing engine
//!
//! The engine never renders anything itself. Instead it publishes discrete
//! events to a host-provided sink; the presentation layer decides how (and
//! whether) to surface each one. Publication must never block the engine.

use crate::dto::PairRequest;

/// A discrete event the presentation layer may render.
#[derive(Debug, Clone)]
pub enum PairingEvent {
    /// The available-identity set or its filtered view changed.
    AvailabilityChanged,
    /// The pending-request list changed (entry added or removed).
    PendingListChanged,
    /// A pairing request was received and stored as pending.
    RequestReceived(PairRequest),
    /// Suggested toast/chat line for a newly received request.
    RequestNotice {
        /// Best currently-resolvable display name of the requester.
        display_name: String,
    },
    /// A pending request was auto-rejected after the requester came into
    /// range and was found to match the configured filters.
    RequestAutoRejected {
        /// Best currently-resolvable display name of the requester.
        display_name: String,
    },
}
