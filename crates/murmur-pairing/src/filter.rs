//! Auto-reject rule evaluation
//!
//! One evaluation routine shared by the pending-request ledger (deciding
//! inbound requests) and the availability engine (partitioning the available
//! set into its filtered view). Rules evaluate in a fixed order with
//! first-match-wins short-circuiting.
//!
//! Attributes are read lazily and never forced: when a configured rule needs
//! an attribute the requester cannot currently provide (out of render range,
//! data not yet loaded), the verdict depends on the caller's policy —
//! request handling defers the decision, filter partitioning rejects as
//! unavailable.

use crate::appearance::{self, DecodedCustomize};
use murmur_core::{Ident, PairingRules, ProximityOracle, ResolvedProfile};

/// Outcome of one auto-reject evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The identity passes every configured rule.
    Accept,
    /// A configured rule needs an attribute that is not currently
    /// resolvable; the decision should be retried when the identity becomes
    /// observable. Only produced when the caller allows deferral.
    Defer,
    /// A rule matched; the identity is rejected.
    Reject {
        /// Human-readable explanation, suitable for sending to the
        /// requester.
        reason: String,
    },
}

impl Verdict {
    fn unavailable(defer: bool, reason: &str) -> Self {
        if defer {
            Verdict::Defer
        } else {
            Verdict::Reject {
                reason: reason.to_string(),
            }
        }
    }
}

/// Evaluate the configured auto-reject rules against one identity.
///
/// `defer_if_unresolved` selects the policy for attributes that cannot be
/// read right now: `true` yields [`Verdict::Defer`], `false` converts each
/// such case into a rejection naming the missing attribute.
pub async fn evaluate(
    oracle: &dyn ProximityOracle,
    rules: &PairingRules,
    ident: &Ident,
    defer_if_unresolved: bool,
) -> Verdict {
    if !rules.pairing_enabled {
        return Verdict::Accept;
    }
    if !rules.has_filters() {
        return Verdict::Accept;
    }

    let profile = oracle.resolve_profile(ident).await;
    if !profile.resolved {
        return Verdict::unavailable(
            defer_if_unresolved,
            "Auto rejected: requester unavailable for filtering",
        );
    }

    if rules.friends_only && !oracle.is_friend(ident).await {
        return Verdict::Reject {
            reason: "Auto rejected: This user is only accepting pair requests from friends."
                .to_string(),
        };
    }

    if rules.minimum_level > 0 {
        match profile.level {
            None | Some(0) => {
                return Verdict::unavailable(
                    defer_if_unresolved,
                    "Auto rejected: requester level unavailable",
                );
            }
            Some(level) if level < rules.minimum_level => {
                return Verdict::Reject {
                    reason: format!(
                        "Auto rejected: This user isn't interested in pairing with users below level {}.",
                        rules.minimum_level
                    ),
                };
            }
            Some(_) => {}
        }
    }

    if !rules.rejected_regions.is_empty() {
        match profile.home_region {
            None | Some(0) => {
                return Verdict::unavailable(
                    defer_if_unresolved,
                    "Auto rejected: requester home region unavailable",
                );
            }
            Some(region) if rules.rejected_regions.contains(&region) => {
                let region_name = oracle
                    .region_name(region)
                    .unwrap_or_else(|| region.to_string());
                return Verdict::Reject {
                    reason: format!(
                        "Auto rejected: This user isn't interested in pairing with users from {region_name}."
                    ),
                };
            }
            Some(_) => {}
        }
    }

    if rules.has_appearance_filters() {
        match resolve_appearance(oracle, ident, &profile).await {
            None => {
                return Verdict::unavailable(
                    defer_if_unresolved,
                    "Auto rejected: appearance unavailable",
                );
            }
            Some(customize) => {
                if let Some(full) = customize.appearance() {
                    if rules.rejected_appearances.contains(&full.key()) {
                        return Verdict::Reject {
                            reason: "Auto rejected: This user isn't interested in your appearance combination."
                                .to_string(),
                        };
                    }
                }
                // A container that decoded but lacks one of the three
                // fields cannot match any combination; treat as acceptable
                // rather than rejecting as unavailable.
            }
        }
    }

    Verdict::Accept
}

/// Two-tier appearance resolution: direct character data first, then the
/// companion integration's base64 container.
async fn resolve_appearance(
    oracle: &dyn ProximityOracle,
    ident: &Ident,
    profile: &ResolvedProfile,
) -> Option<DecodedCustomize> {
    if let Some(direct) = profile.appearance {
        return Some(DecodedCustomize {
            race: Some(direct.race),
            clan: Some(direct.clan),
            gender: Some(direct.gender),
        });
    }

    let blob = oracle.styled_appearance(ident).await?;
    if blob.is_empty() {
        return None;
    }
    Some(appearance::decode_container(&blob).unwrap_or_default())
}
