//! Collaborator contracts implemented by the host
//!
//! The engine is parameterized by these traits; implementations live with
//! the host application (game bindings, network stack, configuration
//! storage). Everything here is best-effort: oracle misses are expected
//! answers, and transport failures are recoverable conditions the engine
//! logs and retries on its next natural cycle.

use crate::dto::{AvailabilitySubscription, RequestDecision};
use crate::events::PairingEvent;
use crate::identifiers::{AccountRef, Ident, Location};
use crate::profile::ResolvedProfile;
use crate::rules::PairingRules;
use async_trait::async_trait;

/// Transport-level failure of a pairing server call.
///
/// Always recoverable from the engine's perspective: callers log it and the
/// next poll/subscription cycle retries naturally.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection to the pairing server is down.
    #[error("not connected to pairing server")]
    NotConnected,
    /// The call reached the server but failed.
    #[error("pairing server call failed: {0}")]
    CallFailed(String),
}

/// Answers "who and what is locally observable right now".
///
/// All methods are best-effort; "not currently resolvable" is a valid,
/// expected answer, not an error.
#[async_trait]
pub trait ProximityOracle: Send + Sync {
    /// Presence token of the local player, when known.
    async fn local_ident(&self) -> Option<Ident>;

    /// Presence tokens of nearby actors, at most `max` entries.
    async fn nearby_idents(&self, max: usize) -> Vec<Ident>;

    /// Current subscription scope, when known.
    async fn location(&self) -> Option<Location>;

    /// Resolve locally-observable attributes for one identity.
    async fn resolve_profile(&self, ident: &Ident) -> ResolvedProfile;

    /// Whether the identity is on the local friend list.
    async fn is_friend(&self, ident: &Ident) -> bool;

    /// Base64 appearance container from the companion customization
    /// integration; fallback source when the direct read is unavailable.
    async fn styled_appearance(&self, ident: &Ident) -> Option<String>;

    /// Human-readable name of a home region, for reject reasons.
    fn region_name(&self, region_id: u16) -> Option<String>;
}

/// Asynchronous pairing server API.
///
/// Every call may fail with a [`TransportError`], which the engine treats as
/// recoverable-and-logged.
#[async_trait]
pub trait PairingServer: Send + Sync {
    /// Whether the connection is currently up.
    fn is_connected(&self) -> bool;

    /// Publish the local advertising opt-in flag.
    async fn set_opt_in(&self, advertise: bool) -> Result<(), TransportError>;

    /// Fetch the server-side advertising opt-in flag.
    async fn get_opt_in(&self) -> Result<bool, TransportError>;

    /// Ask the server which of `idents` are open to pairing. Results arrive
    /// later through the availability push path.
    async fn query_availability(&self, idents: Vec<Ident>) -> Result<(), TransportError>;

    /// Create or update the availability subscription. Returns whether the
    /// push channel is available.
    async fn subscribe(&self, subscription: AvailabilitySubscription)
        -> Result<bool, TransportError>;

    /// Tear down the availability subscription.
    async fn unsubscribe(&self) -> Result<(), TransportError>;

    /// Send a pairing request to `target`.
    async fn send_request(&self, target: Ident) -> Result<(), TransportError>;

    /// Deliver a decision on a pending request.
    async fn respond(&self, decision: RequestDecision) -> Result<(), TransportError>;
}

/// Identities the local player is already directly paired with.
///
/// Direct pairs are excluded from the nearby and availability sets; the
/// normal friend-sync path tracks them, not this ephemeral one.
#[async_trait]
pub trait PairRoster: Send + Sync {
    /// Presence tokens of all current direct pairs.
    async fn direct_pair_idents(&self) -> Vec<Ident>;
}

/// Read access to the user's pairing configuration.
///
/// Change notification is explicit: the host calls the coordinator's
/// `rules_changed` entry point after saving.
pub trait RulesProvider: Send + Sync {
    /// Current configuration snapshot.
    fn rules(&self) -> PairingRules;

    /// Write back the global switch when the server-side opt-in disagrees
    /// with local configuration.
    fn set_pairing_enabled(&self, enabled: bool);
}

/// Per-identity note storage keyed by stable account reference.
pub trait NoteStore: Send + Sync {
    /// User-set note for an account, if any.
    fn note_for(&self, account: &AccountRef) -> Option<String>;

    /// Set the note for an account. Callers enforce first-writer-wins.
    fn set_note(&self, account: &AccountRef, note: &str);

    /// Record the last-seen display name for an account. Always refreshed.
    fn set_display_name(&self, account: &AccountRef, name: &str);
}

/// Receives engine events for presentation.
///
/// Implementations must not block; the engine publishes from hot paths.
pub trait EventSink: Send + Sync {
    /// Publish one event.
    fn publish(&self, event: PairingEvent);
}
