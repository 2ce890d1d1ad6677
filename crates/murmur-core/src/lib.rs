//! Murmur-Core: Foundation Types for Nearby-Pairing Coordination
//!
//! This crate provides the identifier types, wire-adjacent DTO shapes, and
//! collaborator contracts shared by the Murmur pairing engine and its hosts.
//!
//! # Architecture Overview
//!
//! Murmur separates the coordination engine (`murmur-pairing`) from the
//! host-provided collaborators it depends on. This crate owns the seam:
//!
//! - **Identifiers**: opaque presence tokens, account references, request
//!   ids, and subscription locations
//! - **DTOs**: the shapes exchanged with the pairing server
//! - **Effects**: async traits the host implements (proximity oracle,
//!   pairing server transport, pair roster, configuration, note store)
//! - **Events**: the discrete domain events the engine publishes to the
//!   presentation layer
//!
//! Nothing in this crate performs I/O; implementations live with the host.

#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub mod dto;
pub mod effects;
pub mod events;
pub mod identifiers;
pub mod profile;
pub mod rules;

pub use dto::{
    AvailabilitySubscription, AvailabilityUpdate, PairRequest, RequestDecision, ResumeRequest,
};
pub use effects::{
    EventSink, NoteStore, PairRoster, PairingServer, ProximityOracle, RulesProvider,
    TransportError,
};
pub use events::PairingEvent;
pub use identifiers::{AccountRef, Ident, Location, RequestId};
pub use profile::{Appearance, AppearanceKey, ResolvedProfile};
pub use rules::PairingRules;
