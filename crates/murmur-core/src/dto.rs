//! Wire-adjacent DTO shapes exchanged with the pairing server
//!
//! The bit-level layout of these payloads is owned by the transport; this
//! module only fixes the shapes the engine produces and consumes.

use crate::identifiers::{AccountRef, Ident, RequestId};
use serde::{Deserialize, Serialize};

/// Inbound pairing request from a remote player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairRequest {
    /// Unique id of this request; at most one pending entry exists per id.
    pub request_id: RequestId,
    /// Permanent account reference of the requester (may be blank).
    pub requester: AccountRef,
    /// Presence token of the requester (may be blank).
    pub requester_ident: Ident,
    /// Server-side receipt timestamp, milliseconds since epoch.
    pub requested_at_ms: u64,
}

impl PairRequest {
    /// A request is malformed when both the presence token and the account
    /// reference are blank: there is no way to ever attribute it.
    pub fn is_malformed(&self) -> bool {
        self.requester_ident.is_blank() && self.requester.is_blank()
    }
}

/// One entry of a server availability push or poll response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityUpdate {
    /// Identity the server reports as open to pairing.
    pub ident: Ident,
}

/// Availability subscription payload.
///
/// `nearby` is the full snapshot (sent only on a new-location subscribe),
/// `added`/`removed` are incremental deltas. The server caps each list at
/// 256 entries; the engine trims before sending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilitySubscription {
    /// Server scope of the subscription.
    pub server_id: u16,
    /// Territory scope of the subscription.
    pub territory_id: u16,
    /// Full nearby snapshot; empty for delta-only updates.
    pub nearby: Vec<Ident>,
    /// Identities that entered proximity since the last update.
    pub added: Vec<Ident>,
    /// Identities that left proximity since the last update.
    pub removed: Vec<Ident>,
}

/// Decision on a pending pairing request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestDecision {
    /// Request being decided.
    pub request_id: RequestId,
    /// Whether the request was accepted.
    pub accepted: bool,
    /// Human-readable reason delivered to the requester on rejection.
    /// `None` rejects silently.
    pub reason: Option<String>,
}

/// Host-supplied resume hint after the process reports it can restore a
/// previous session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeRequest {
    /// Opaque token naming the session being resumed.
    pub resume_token: String,
    /// Server id to fall back to when live location lookup returns zero.
    pub world_id: u16,
    /// Territory id to fall back to when live location lookup returns zero.
    pub territory_id: u16,
    /// Advisory count of nearby identities at suspend time.
    pub nearby_hint_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_requires_both_blank() {
        let mut dto = PairRequest {
            request_id: RequestId::new(),
            requester: AccountRef::new(""),
            requester_ident: Ident::new(""),
            requested_at_ms: 0,
        };
        assert!(dto.is_malformed());

        dto.requester_ident = Ident::new("abc123");
        assert!(!dto.is_malformed());

        dto.requester_ident = Ident::new("");
        dto.requester = AccountRef::new("UID-1");
        assert!(!dto.is_malformed());
    }
}
