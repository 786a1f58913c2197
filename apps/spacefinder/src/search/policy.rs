//! Proximity policies — how one candidate is tested against one opponent.
//!
//! Two vocabularies are live behind an A/B switch and are deliberately not
//! equivalent:
//! - `LegacyPolicy`: passes if the candidate clears the opponent in *either*
//!   direction. No overlap detection, no bypass selector.
//! - `CurrentPolicy`: classifies the opponent as above or below, fails overlaps
//!   outright, and only applies the margin for that direction. A candidate
//!   matching the rule's bypass selector skips the "opponent below" check.
//!
//! Containment (same element, ancestor, descendant) is handled by the evaluator
//! before either policy runs.

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::search::rules::{Candidate, Opponent, OpponentRule};

/// Outcome of testing one (candidate, opponent) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Proximity {
    Clear,
    TooClose { required: f64, actual: f64 },
    /// Opponent straddles the candidate; `overlap` is the shared vertical extent.
    Overlap { overlap: f64 },
}

/// Pluggable proximity test. Carried by the `Spacefinder` as `Arc<dyn ProximityPolicy>`.
pub trait ProximityPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `bypassed` is true when the candidate matches the rule's bypass selector.
    fn test(
        &self,
        rule: &OpponentRule,
        candidate: &Candidate,
        opponent: &Opponent,
        bypassed: bool,
    ) -> Proximity;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    Legacy,
    #[default]
    Current,
}

impl PolicyKind {
    pub fn build(self) -> Arc<dyn ProximityPolicy> {
        match self {
            PolicyKind::Legacy => Arc::new(LegacyPolicy),
            PolicyKind::Current => Arc::new(CurrentPolicy),
        }
    }
}

impl FromStr for PolicyKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" => Ok(PolicyKind::Legacy),
            "current" => Ok(PolicyKind::Current),
            other => anyhow::bail!("unknown proximity policy '{other}' (expected 'legacy' or 'current')"),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Legacy (OR-based)
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyPolicy;

impl ProximityPolicy for LegacyPolicy {
    fn name(&self) -> &'static str {
        "legacy"
    }

    fn test(
        &self,
        rule: &OpponentRule,
        candidate: &Candidate,
        opponent: &Opponent,
        _bypassed: bool,
    ) -> Proximity {
        let gap_after_opponent = candidate.top - opponent.bottom;
        let gap_before_opponent = opponent.top - candidate.top;

        if gap_after_opponent >= rule.margin_below || gap_before_opponent >= rule.margin_above {
            return Proximity::Clear;
        }

        if candidate.top < opponent.top {
            Proximity::TooClose {
                required: rule.margin_above,
                actual: gap_before_opponent,
            }
        } else {
            Proximity::TooClose {
                required: rule.margin_below,
                actual: gap_after_opponent,
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Current (AND-based, overlap- and bypass-aware)
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentPolicy;

impl ProximityPolicy for CurrentPolicy {
    fn name(&self) -> &'static str {
        "current"
    }

    fn test(
        &self,
        rule: &OpponentRule,
        candidate: &Candidate,
        opponent: &Opponent,
        bypassed: bool,
    ) -> Proximity {
        let is_below = opponent.bottom > candidate.bottom && opponent.top >= candidate.top;
        let is_above = opponent.top < candidate.top && opponent.bottom <= candidate.bottom;

        if !is_below && !is_above {
            let overlap = candidate.bottom.min(opponent.bottom) - candidate.top.max(opponent.top);
            return Proximity::Overlap {
                overlap: overlap.max(0.0),
            };
        }

        let clears_above = !is_below || bypassed || clears(opponent.top - candidate.top, rule.margin_above);
        let clears_below = !is_above || clears(candidate.top - opponent.bottom, rule.margin_below);

        match (clears_above, clears_below) {
            (true, true) => Proximity::Clear,
            (false, _) => Proximity::TooClose {
                required: rule.margin_above,
                actual: opponent.top - candidate.top,
            },
            (_, false) => Proximity::TooClose {
                required: rule.margin_below,
                actual: candidate.top - opponent.bottom,
            },
        }
    }
}

/// A zero margin is "no constraint", not "must touch".
fn clears(actual: f64, margin: f64) -> bool {
    margin <= 0.0 || actual >= margin
}
