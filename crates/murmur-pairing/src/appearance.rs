//! Appearance container decoding
//!
//! The companion customization integration hands us appearance state as a
//! base64 container: a version byte (or other prefix bytes), then a gzip
//! stream wrapping a JSON document whose `Customize` object carries the
//! `Gender`/`Race`/`Clan` fields. Each field may be a bare number, a numeric
//! string, or nested under a `{"Value": …}` wrapper depending on the
//! integration's version.
//!
//! Every failure path here is a `None` with a trace log, never an error;
//! an undecodable container is an expected condition.

use flate2::read::GzDecoder;
use murmur_core::Appearance;
use std::io::Read;

/// Appearance fields recovered from a container.
///
/// Fields decode independently; a partially-readable container is still a
/// successful decode, it just cannot produce a full [`Appearance`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodedCustomize {
    /// Race index, when present.
    pub race: Option<u8>,
    /// Clan index, when present.
    pub clan: Option<u8>,
    /// Gender index, when present.
    pub gender: Option<u8>,
}

impl DecodedCustomize {
    /// The full appearance tuple, when all three fields decoded.
    pub fn appearance(&self) -> Option<Appearance> {
        match (self.race, self.clan, self.gender) {
            (Some(race), Some(clan), Some(gender)) => Some(Appearance { race, clan, gender }),
            _ => None,
        }
    }
}

/// Decode a base64 appearance container.
///
/// Returns `None` when the payload is not base64, carries no gzip stream,
/// or decompresses to something unparseable.
pub fn decode_container(blob: &str) -> Option<DecodedCustomize> {
    use base64::prelude::{Engine as _, BASE64_STANDARD};

    let raw = match BASE64_STANDARD.decode(blob.trim()) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::trace!(%err, "appearance container is not valid base64");
            return None;
        }
    };

    // The container prefixes the gzip stream with a version byte. Strip
    // everything before the gzip header (0x1F 0x8B) before decompressing.
    let start = raw.iter().position(|byte| *byte == 0x1F)?;
    if raw.get(start + 1) != Some(&0x8B) {
        tracing::trace!("no gzip header found in appearance container");
        return None;
    }

    let mut json = String::new();
    let mut decoder = GzDecoder::new(&raw[start..]);
    if let Err(err) = decoder.read_to_string(&mut json) {
        tracing::trace!(%err, "failed to decompress appearance container");
        return None;
    }

    parse_customize(&json)
}

/// Pull the customize fields out of the decoded JSON document.
fn parse_customize(json: &str) -> Option<DecodedCustomize> {
    let document: serde_json::Value = match serde_json::from_str(json) {
        Ok(document) => document,
        Err(err) => {
            tracing::trace!(%err, "appearance container JSON did not parse");
            return None;
        }
    };

    let root = document.as_object()?;
    let customize = root.get("Customize")?.as_object()?;

    Some(DecodedCustomize {
        race: byte_field(customize, "Race"),
        clan: byte_field(customize, "Clan"),
        gender: byte_field(customize, "Gender"),
    })
}

fn byte_field(parent: &serde_json::Map<String, serde_json::Value>, name: &str) -> Option<u8> {
    extract_byte(parent.get(name)?)
}

/// A field value may be nested under a `Value` wrapper, a bare number, or a
/// numeric string.
fn extract_byte(value: &serde_json::Value) -> Option<u8> {
    if let Some(wrapper) = value.as_object() {
        if let Some(inner) = wrapper.get("Value") {
            return extract_byte(inner);
        }
        return None;
    }
    if let Some(number) = value.as_u64() {
        return u8::try_from(number).ok();
    }
    if let Some(text) = value.as_str() {
        return text.parse().ok();
    }
    None
}
