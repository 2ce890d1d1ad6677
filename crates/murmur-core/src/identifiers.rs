//! Core identifier types used across the Murmur engine
//!
//! This module provides the identifier types that name remote actors and
//! subscription scopes. Presence identifiers are deliberately opaque: they
//! are derived externally (e.g. a salted hash of character name and home
//! server) and never reveal a permanent account id.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque per-session presence token identifying a remote actor.
///
/// Equality is ordinal (byte-exact). An `Ident` is stable for as long as the
/// remote actor keeps the same name and home server, but carries no account
/// information.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ident(String);

impl Ident {
    /// Create an ident from its externally-derived token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Get the token string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the token is empty or whitespace-only.
    ///
    /// Blank idents appear in malformed server payloads and are dropped at
    /// every ingestion point.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Ident {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

impl From<String> for Ident {
    fn from(token: String) -> Self {
        Self(token)
    }
}

/// Opaque permanent account reference.
///
/// Used only where a durable key is required (the per-identity note store,
/// request attribution). May be empty when the server elides it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountRef(String);

impl AccountRef {
    /// Create an account reference.
    pub fn new(uid: impl Into<String>) -> Self {
        Self(uid.into())
    }

    /// Get the reference string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the reference is empty or whitespace-only.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for AccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountRef {
    fn from(uid: &str) -> Self {
        Self::new(uid)
    }
}

/// Unique identifier of a pairing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

impl RequestId {
    /// Create a new random request id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from a UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID.
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request-{}", self.0)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Availability subscription scope: the (server, territory) pair the local
/// player currently occupies.
///
/// A change in either field invalidates the current push subscription and
/// forces a full-snapshot resubscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    /// Game server the local player is on.
    pub server_id: u16,
    /// Territory/zone within that server.
    pub territory_id: u16,
}

impl Location {
    /// Create a location.
    pub fn new(server_id: u16, territory_id: u16) -> Self {
        Self {
            server_id,
            territory_id,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.server_id, self.territory_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ident_blankness() {
        assert!(Ident::new("").is_blank());
        assert!(Ident::new("   ").is_blank());
        assert!(!Ident::new("a1b2").is_blank());
    }

    #[test]
    fn test_ident_ordinal_equality() {
        assert_eq!(Ident::new("abc"), Ident::new("abc"));
        assert_ne!(Ident::new("abc"), Ident::new("ABC"));
    }

    #[test]
    fn test_ident_serde_transparent() {
        let ident = Ident::new("deadbeef");
        let json = serde_json::to_string(&ident).unwrap();
        assert_eq!(json, "\"deadbeef\"");
        let back: Ident = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ident);
    }

    #[test]
    fn test_location_equality_is_per_field() {
        let a = Location::new(40, 129);
        assert_eq!(a, Location::new(40, 129));
        assert_ne!(a, Location::new(41, 129));
        assert_ne!(a, Location::new(40, 130));
    }
}
