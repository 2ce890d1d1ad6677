//! Murmur-Pairing: Nearby-Pairing Availability & Request Coordination
//!
//! A client-side presence/availability synchronization engine for
//! nearby-pairing between players of an online game. The engine tracks
//! which remote identities are nearby, keeps a server-side availability
//! subscription current for the local location (falling back to periodic
//! polling when the push channel is unavailable), maintains the
//! authoritative available-identity set with a rule-filtered view, and
//! holds custody of inbound pairing requests until a decision is made.
//!
//! # Architecture Overview
//!
//! Components compose leaves-first:
//!
//! - [`nearby::NearbyTracker`] — proximity snapshot, entered/left deltas,
//!   and the refresh exclusivity gate
//! - [`subscription::SubscriptionManager`] — push subscription lifecycle
//!   with poll-fallback degradation
//! - [`availability::AvailabilityEngine`] — the available set and its
//!   auto-reject-filtered partition
//! - [`requests::RequestLedger`] — pending request custody and deferred
//!   auto-reject evaluation
//! - [`coordinator::PairingCoordinator`] — lifecycle coordination and the
//!   background refresh loop, composing all of the above
//!
//! The host supplies every external capability (proximity oracle, server
//! transport, configuration, note storage, event sink) through the
//! [`coordinator::Collaborators`] bundle at construction; there are no
//! ambient singletons and `shutdown` cancels all background work.
//!
//! # Usage
//!
//! ```rust,no_run
//! use murmur_pairing::{Collaborators, EngineConfig, PairingCoordinator};
//!
//! # fn collaborators() -> Collaborators { unimplemented!() }
//! # async fn demo() {
//! let coordinator = PairingCoordinator::new(collaborators(), EngineConfig::default());
//! coordinator.start();
//!
//! // Host lifecycle events drive the engine:
//! coordinator.on_connected().await;
//! // ... later ...
//! coordinator.shutdown().await;
//! # }
//! ```

#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub mod appearance;
pub mod availability;
pub mod config;
pub mod coordinator;
pub mod error;
mod filter;
pub mod nearby;
pub mod requests;
pub mod subscription;

pub use availability::{AvailabilityEngine, FilterSnapshot};
pub use config::EngineConfig;
pub use coordinator::{Collaborators, PairingCoordinator};
pub use error::{PairingError, PairingResult};
pub use nearby::{NearbyDelta, NearbyTracker};
pub use requests::RequestLedger;
pub use subscription::SubscriptionManager;
