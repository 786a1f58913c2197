//! Constraint Evaluator — narrows a snapshot's candidates through fixed stages.
//!
//! # Stages (in order)
//! 1. `absoluteMinDistanceFromTop`: page-absolute top.
//! 2. `aboveAndBelow`: distance from the container's top and bottom edges.
//! 3. `contentMeta`: clearance below the byline/meta block.
//! 4. one stage per opponent selector: proximity via the configured policy.
//! 5. `custom`: caller filter, folded with the last accepted candidate.
//!
//! Each stage only removes candidates. Every removal is written to the
//! `ExclusionLedger` with the margin that was required and the one measured.
//! Nothing here fails or touches the document.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::dom::ElementId;
use crate::search::measure::Snapshot;
use crate::search::policy::{Proximity, ProximityPolicy};
use crate::search::rules::{Candidate, CandidateFilter, RuleSet};

pub mod stage {
    pub const ABSOLUTE_MIN_DISTANCE_FROM_TOP: &str = "absoluteMinDistanceFromTop";
    pub const ABOVE_AND_BELOW: &str = "aboveAndBelow";
    pub const CONTENT_META: &str = "contentMeta";
    pub const CUSTOM: &str = "custom";
}

// ────────────────────────────────────────────────────────────────────────────
// Ledger types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ExclusionKind {
    TooClose,
    Overlap,
    Filtered,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExclusionReason {
    pub kind: ExclusionKind,
    pub required_margin: f64,
    pub actual_margin: f64,
    /// Offending element: the opponent, the meta block, or the previous winner.
    pub opponent: Option<ElementId>,
}

impl ExclusionReason {
    fn too_close(required_margin: f64, actual_margin: f64, opponent: Option<ElementId>) -> Self {
        Self {
            kind: ExclusionKind::TooClose,
            required_margin,
            actual_margin,
            opponent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exclusion {
    pub candidate: Candidate,
    pub reasons: Vec<ExclusionReason>,
}

/// Stage name → candidates removed at that stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExclusionLedger {
    stages: BTreeMap<String, Vec<Exclusion>>,
}

impl ExclusionLedger {
    pub fn get(&self, stage: &str) -> &[Exclusion] {
        self.stages.get(stage).map_or(&[], Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Exclusion])> {
        self.stages.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn total(&self) -> usize {
        self.stages.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    fn record(&mut self, stage: &str, exclusion: Exclusion) {
        self.stages.entry(stage.to_string()).or_default().push(exclusion);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub accepted: Vec<Candidate>,
    pub ledger: ExclusionLedger,
}

// ────────────────────────────────────────────────────────────────────────────
// Pipeline
// ────────────────────────────────────────────────────────────────────────────

pub fn evaluate(snapshot: &Snapshot, rules: &RuleSet, policy: &dyn ProximityPolicy) -> Evaluation {
    let mut ledger = ExclusionLedger::default();
    let mut survivors = snapshot.candidates.clone();

    if let Some(absolute_min) = rules.absolute_min_distance_from_top {
        survivors = partition(survivors, &mut ledger, stage::ABSOLUTE_MIN_DISTANCE_FROM_TOP, |c| {
            let page_top = snapshot.container_top + c.top;
            (page_top < absolute_min).then(|| vec![ExclusionReason::too_close(absolute_min, page_top, None)])
        });
    }

    survivors = partition(survivors, &mut ledger, stage::ABOVE_AND_BELOW, |c| {
        edge_reasons(c, rules, snapshot.container_height)
    });

    if let Some(meta) = snapshot.content_meta.as_ref().filter(|_| rules.clear_content_meta > 0.0) {
        survivors = partition(survivors, &mut ledger, stage::CONTENT_META, |c| {
            let clearance = c.top - meta.bottom;
            (clearance <= rules.clear_content_meta).then(|| {
                vec![ExclusionReason::too_close(
                    rules.clear_content_meta,
                    clearance,
                    Some(meta.element),
                )]
            })
        });
    }

    for (selector, rule) in &rules.opponent_selector_rules {
        let opponents = snapshot.opponents_for(selector);
        survivors = partition(survivors, &mut ledger, selector, |c| {
            let bypassed = snapshot.is_bypassed(selector, c.element);
            let reasons: Vec<ExclusionReason> = opponents
                .iter()
                .filter(|o| !c.is_related_to(o))
                .filter_map(|o| match policy.test(rule, c, o, bypassed) {
                    Proximity::Clear => None,
                    Proximity::TooClose { required, actual } => {
                        Some(ExclusionReason::too_close(required, actual, Some(o.element)))
                    }
                    Proximity::Overlap { overlap } => Some(ExclusionReason {
                        kind: ExclusionKind::Overlap,
                        required_margin: rule.margin_above.max(rule.margin_below),
                        actual_margin: -overlap,
                        opponent: Some(o.element),
                    }),
                })
                .collect();
            (!reasons.is_empty()).then_some(reasons)
        });
    }

    if let Some(filter) = &rules.filter {
        survivors = apply_filter(survivors, filter, &mut ledger);
    }

    Evaluation {
        accepted: survivors,
        ledger,
    }
}

/// Keeps candidates for which `reject` returns `None`; records the rest under `stage`.
fn partition<F>(
    candidates: Vec<Candidate>,
    ledger: &mut ExclusionLedger,
    stage: &str,
    mut reject: F,
) -> Vec<Candidate>
where
    F: FnMut(&Candidate) -> Option<Vec<ExclusionReason>>,
{
    let mut kept = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match reject(&candidate) {
            None => kept.push(candidate),
            Some(reasons) => ledger.record(stage, Exclusion { candidate, reasons }),
        }
    }
    kept
}

fn edge_reasons(candidate: &Candidate, rules: &RuleSet, container_height: f64) -> Option<Vec<ExclusionReason>> {
    let mut reasons = Vec::new();
    if candidate.top < rules.min_distance_from_top {
        reasons.push(ExclusionReason::too_close(
            rules.min_distance_from_top,
            candidate.top,
            None,
        ));
    }
    let distance_to_bottom = container_height - candidate.top;
    if distance_to_bottom < rules.min_distance_from_bottom {
        reasons.push(ExclusionReason::too_close(
            rules.min_distance_from_bottom,
            distance_to_bottom,
            None,
        ));
    }
    (!reasons.is_empty()).then_some(reasons)
}

/// Left fold carrying the last accepted candidate.
fn apply_filter(
    candidates: Vec<Candidate>,
    filter: &CandidateFilter,
    ledger: &mut ExclusionLedger,
) -> Vec<Candidate> {
    let (accepted, _) = candidates.into_iter().fold(
        (Vec::new(), None::<Candidate>),
        |(mut accepted, last), candidate| {
            if filter.accepts(&candidate, last.as_ref()) {
                accepted.push(candidate.clone());
                (accepted, Some(candidate))
            } else {
                let reason = ExclusionReason {
                    kind: ExclusionKind::Filtered,
                    required_margin: 0.0,
                    actual_margin: last.as_ref().map_or(0.0, |l| candidate.top - l.top),
                    opponent: last.as_ref().map(|l| l.element),
                };
                ledger.record(
                    stage::CUSTOM,
                    Exclusion {
                        candidate,
                        reasons: vec![reason],
                    },
                );
                (accepted, last)
            }
        },
    );
    accepted
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
