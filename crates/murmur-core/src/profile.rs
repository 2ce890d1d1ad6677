//! Locally-resolved attributes of a remote actor
//!
//! The proximity oracle answers attribute queries on a best-effort basis:
//! a remote actor that is out of render range simply resolves to nothing.
//! "Not currently resolvable" is an expected answer, never an error.

use serde::{Deserialize, Serialize};

/// Appearance attributes of a remote actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appearance {
    /// Race index.
    pub race: u8,
    /// Clan index within the race.
    pub clan: u8,
    /// Gender index.
    pub gender: u8,
}

impl Appearance {
    /// The blacklist key for this appearance.
    pub fn key(&self) -> AppearanceKey {
        AppearanceKey {
            race: self.race,
            clan: self.clan,
            gender: self.gender,
        }
    }
}

/// A (race, clan, gender) tuple used by the auto-reject combination filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppearanceKey {
    /// Race index.
    pub race: u8,
    /// Clan index within the race.
    pub clan: u8,
    /// Gender index.
    pub gender: u8,
}

/// Best-effort attribute resolution for one identity.
#[derive(Debug, Clone, Default)]
pub struct ResolvedProfile {
    /// Whether the identity is currently resolvable at all (in range, with
    /// backing character data). When `false` every other field is unset.
    pub resolved: bool,
    /// Display name, when known.
    pub display_name: Option<String>,
    /// Combat level; `None` when not yet readable.
    pub level: Option<u8>,
    /// Home-region id; `None` when not yet readable.
    pub home_region: Option<u16>,
    /// Appearance attributes, when directly readable.
    pub appearance: Option<Appearance>,
}

impl ResolvedProfile {
    /// An unresolvable profile.
    pub fn unresolved() -> Self {
        Self::default()
    }
}
