//! Rule sets — the request describing one placement search.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dom::{Document, ElementId, SelectorList};
use crate::errors::SpacefinderError;

/// Cache key used for searches that run against the whole document.
pub const DOCUMENT_KEY: &str = "document";

/// Byline/meta block that `clear_content_meta` keeps candidates away from.
pub const CONTENT_META_SELECTOR: &str = ".js-content-meta";

// ────────────────────────────────────────────────────────────────────────────
// Measured elements
// ────────────────────────────────────────────────────────────────────────────

/// An element with geometry frozen at snapshot time.
///
/// `top`/`bottom` are relative to the container top. `lineage` is the inclusive
/// ancestor chain, kept so containment can be checked without the document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub element: ElementId,
    pub top: f64,
    pub bottom: f64,
    #[serde(skip)]
    pub lineage: Vec<ElementId>,
}

/// Opponents share the candidate geometry shape.
pub type Opponent = Candidate;

impl Candidate {
    pub fn new(element: ElementId, top: f64, bottom: f64) -> Self {
        Self {
            element,
            top,
            bottom,
            lineage: vec![element],
        }
    }

    pub fn with_lineage(mut self, lineage: Vec<ElementId>) -> Self {
        self.lineage = lineage;
        self
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    /// Same element, or one structurally contains the other.
    pub fn is_related_to(&self, other: &Candidate) -> bool {
        self.lineage.contains(&other.element) || other.lineage.contains(&self.element)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Rule set
// ────────────────────────────────────────────────────────────────────────────

/// Margins an opponent imposes on candidates.
///
/// `margin_above` applies when the opponent sits below the candidate (space the
/// candidate needs above the opponent); `margin_below` applies when the opponent
/// sits above it. 0 means no constraint in that direction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpponentRule {
    #[serde(default, alias = "marginTop", alias = "minBelowSlot")]
    pub margin_above: f64,
    #[serde(default, alias = "marginBottom", alias = "minAboveSlot")]
    pub margin_below: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bypass_selector: Option<String>,
}

impl OpponentRule {
    pub fn new(margin_above: f64, margin_below: f64) -> Self {
        Self {
            margin_above,
            margin_below,
            bypass_selector: None,
        }
    }

    pub fn with_bypass(mut self, selector: &str) -> Self {
        self.bypass_selector = Some(selector.to_string());
        self
    }
}

pub type FilterFn = Arc<dyn Fn(&Candidate, Option<&Candidate>) -> bool + Send + Sync>;

/// Stateful predicate run over surviving candidates in order, with the last
/// accepted candidate threaded through.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CandidateFilter {
    /// Keeps candidates at least `min_gap` px (top to top) from the previous winner.
    MinGapFromPrevious {
        #[serde(rename = "minGap")]
        min_gap: f64,
    },
    #[serde(skip)]
    Custom(FilterFn),
}

impl CandidateFilter {
    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&Candidate, Option<&Candidate>) -> bool + Send + Sync + 'static,
    {
        CandidateFilter::Custom(Arc::new(predicate))
    }

    pub fn accepts(&self, candidate: &Candidate, last_accepted: Option<&Candidate>) -> bool {
        match self {
            CandidateFilter::MinGapFromPrevious { min_gap } => last_accepted
                .map_or(true, |last| (candidate.top - last.top).abs() >= *min_gap),
            CandidateFilter::Custom(predicate) => predicate(candidate, last_accepted),
        }
    }
}

impl fmt::Debug for CandidateFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateFilter::MinGapFromPrevious { min_gap } => f
                .debug_struct("MinGapFromPrevious")
                .field("min_gap", min_gap)
                .finish(),
            CandidateFilter::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// One placement search request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSet {
    /// Subtree to search; `None` searches the whole document.
    #[serde(default, alias = "bodySelector")]
    pub container_selector: Option<String>,
    /// Elements an ad may be inserted immediately before.
    #[serde(alias = "slotSelector")]
    pub candidate_selector: String,
    #[serde(default, alias = "minAbove")]
    pub min_distance_from_top: f64,
    #[serde(default, alias = "minBelow")]
    pub min_distance_from_bottom: f64,
    /// Minimum distance from the page top, independent of the container.
    #[serde(default, alias = "absoluteMinAbove")]
    pub absolute_min_distance_from_top: Option<f64>,
    /// Required clearance below the content meta block; 0 disables.
    #[serde(default)]
    pub clear_content_meta: f64,
    #[serde(default, alias = "selectors")]
    pub opponent_selector_rules: BTreeMap<String, OpponentRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<CandidateFilter>,
    /// First candidate to consider (inclusive).
    #[serde(default)]
    pub start_at: Option<String>,
    /// Candidate at which to stop (exclusive).
    #[serde(default)]
    pub stop_at: Option<String>,
    #[serde(default, alias = "fromBottom")]
    pub reverse_order: bool,
}

impl RuleSet {
    pub fn new(candidate_selector: &str) -> Self {
        Self {
            candidate_selector: candidate_selector.to_string(),
            ..Self::default()
        }
    }

    pub fn within(mut self, container_selector: &str) -> Self {
        self.container_selector = Some(container_selector.to_string());
        self
    }

    pub fn with_opponent(mut self, selector: &str, rule: OpponentRule) -> Self {
        self.opponent_selector_rules.insert(selector.to_string(), rule);
        self
    }

    pub fn with_filter(mut self, filter: CandidateFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Memoization key for per-container state.
    pub fn container_key(&self) -> &str {
        self.container_selector.as_deref().unwrap_or(DOCUMENT_KEY)
    }

    /// Parses every selector up front so a malformed rule set fails before any
    /// layout work happens.
    pub fn compile(&self) -> Result<CompiledRules, SpacefinderError> {
        let opponents = self
            .opponent_selector_rules
            .iter()
            .map(|(key, rule)| {
                Ok(CompiledOpponent {
                    key: key.clone(),
                    selector: SelectorList::parse(key)?,
                    bypass: rule
                        .bypass_selector
                        .as_deref()
                        .map(SelectorList::parse)
                        .transpose()?,
                })
            })
            .collect::<Result<Vec<_>, SpacefinderError>>()?;

        Ok(CompiledRules {
            container: self
                .container_selector
                .as_deref()
                .map(SelectorList::parse)
                .transpose()?,
            candidate: SelectorList::parse(&self.candidate_selector)?,
            content_meta: if self.clear_content_meta > 0.0 {
                Some(SelectorList::parse(CONTENT_META_SELECTOR)?)
            } else {
                None
            },
            opponents,
            start_at: self.start_at.as_deref().map(SelectorList::parse).transpose()?,
            stop_at: self.stop_at.as_deref().map(SelectorList::parse).transpose()?,
            reverse_order: self.reverse_order,
        })
    }
}

/// Per-request knobs that are not part of the placement rules themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindOptions {
    #[serde(default)]
    pub wait_for_images: bool,
    #[serde(default)]
    pub wait_for_interactives: bool,
    /// Label for timing events and the debug visualizer.
    #[serde(default)]
    pub pass: Option<String>,
}

impl FindOptions {
    pub fn pass_label(&self) -> &str {
        self.pass.as_deref().unwrap_or("default")
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Compiled form
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CompiledOpponent {
    /// Selector string as written in the rule set; ledger and snapshot key.
    pub key: String,
    pub selector: SelectorList,
    pub bypass: Option<SelectorList>,
}

/// A rule set with all selectors parsed.
#[derive(Debug, Clone)]
pub struct CompiledRules {
    pub container: Option<SelectorList>,
    pub candidate: SelectorList,
    pub content_meta: Option<SelectorList>,
    pub opponents: Vec<CompiledOpponent>,
    pub start_at: Option<SelectorList>,
    pub stop_at: Option<SelectorList>,
    pub reverse_order: bool,
}

impl CompiledRules {
    /// `Ok(None)` means the whole document.
    pub fn resolve_container(&self, doc: &Document) -> Result<Option<ElementId>, SpacefinderError> {
        match &self.container {
            None => Ok(None),
            Some(selector) => doc
                .query_selector(doc.root(), selector)
                .map(Some)
                .ok_or_else(|| SpacefinderError::ContainerNotFound(selector.as_str().to_string())),
        }
    }

    /// Candidate elements in search order, trimmed to `start_at..stop_at`.
    pub fn query_candidates(&self, doc: &Document, container: Option<ElementId>) -> Vec<ElementId> {
        let scope = container.unwrap_or_else(|| doc.root());
        let mut candidates = doc.query_selector_all(scope, &self.candidate);
        if self.reverse_order {
            candidates.reverse();
        }

        if let Some(selector) = &self.start_at {
            let anchor = doc.query_selector(doc.root(), selector);
            candidates = candidates
                .into_iter()
                .skip_while(|&c| Some(c) != anchor)
                .collect();
        }
        if let Some(selector) = &self.stop_at {
            let anchor = doc.query_selector(doc.root(), selector);
            candidates = candidates
                .into_iter()
                .take_while(|&c| Some(c) != anchor)
                .collect();
        }
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::ElementNode;

    fn doc() -> Document {
        Document::new(
            ElementNode::new("body").child(
                ElementNode::new("div").class("article-body").children(
                    (0..5).map(|i| ElementNode::new("p").id(&format!("p{i}")).at(i as f64 * 100.0, 100.0)),
                ),
            ),
        )
    }

    fn ids(doc: &Document, elements: &[ElementId]) -> Vec<String> {
        elements
            .iter()
            .filter_map(|&e| doc.get(e).and_then(|el| el.id.clone()))
            .collect()
    }

    #[test]
    fn test_rule_set_deserializes_current_vocabulary() {
        let rules: RuleSet = serde_json::from_str(
            r#"{
                "containerSelector": ".article-body",
                "candidateSelector": " > p",
                "minDistanceFromTop": 300,
                "minDistanceFromBottom": 300,
                "clearContentMeta": 50,
                "opponentSelectorRules": {
                    " > h2": { "marginTop": 5, "marginBottom": 190 },
                    " > .ad-slot": { "marginAbove": 500, "marginBelow": 500, "bypassSelector": ".sticky" }
                },
                "filter": { "kind": "minGapFromPrevious", "minGap": 600 },
                "reverseOrder": true
            }"#,
        )
        .expect("rule set parses");

        assert_eq!(rules.container_key(), ".article-body");
        assert_eq!(rules.min_distance_from_top, 300.0);
        assert_eq!(rules.opponent_selector_rules.len(), 2);
        assert_eq!(
            rules.opponent_selector_rules[" > .ad-slot"].bypass_selector.as_deref(),
            Some(".sticky")
        );
        assert!(matches!(
            rules.filter,
            Some(CandidateFilter::MinGapFromPrevious { min_gap }) if min_gap == 600.0
        ));
        assert!(rules.reverse_order);
    }

    #[test]
    fn test_rule_set_accepts_legacy_vocabulary() {
        let rules: RuleSet = serde_json::from_str(
            r#"{
                "bodySelector": ".article-body",
                "slotSelector": " > p",
                "minAbove": 200,
                "minBelow": 250,
                "selectors": { " > h2": { "minAboveSlot": 190, "minBelowSlot": 5 } },
                "fromBottom": true
            }"#,
        )
        .expect("legacy rule set parses");

        assert_eq!(rules.candidate_selector, " > p");
        assert_eq!(rules.min_distance_from_bottom, 250.0);
        assert_eq!(rules.opponent_selector_rules[" > h2"], OpponentRule::new(5.0, 190.0));
        assert!(rules.reverse_order);
    }

    #[test]
    fn test_compile_rejects_malformed_selectors() {
        let rules = RuleSet::new(" > p").with_opponent("h2 >", OpponentRule::default());
        assert!(matches!(
            rules.compile(),
            Err(SpacefinderError::InvalidSelector { .. })
        ));
    }

    #[test]
    fn test_content_meta_selector_only_when_clearance_set() {
        let mut rules = RuleSet::new("p");
        assert!(rules.compile().expect("compiles").content_meta.is_none());
        rules.clear_content_meta = 50.0;
        assert!(rules.compile().expect("compiles").content_meta.is_some());
    }

    #[test]
    fn test_query_candidates_order_and_range() {
        let doc = doc();
        let mut rules = RuleSet::new(" > p").within(".article-body");
        let compiled = rules.compile().expect("compiles");
        let container = compiled.resolve_container(&doc).expect("container exists");
        assert_eq!(
            ids(&doc, &compiled.query_candidates(&doc, container)),
            vec!["p0", "p1", "p2", "p3", "p4"]
        );

        rules.start_at = Some("#p1".to_string());
        rules.stop_at = Some("#p4".to_string());
        let compiled = rules.compile().expect("compiles");
        assert_eq!(
            ids(&doc, &compiled.query_candidates(&doc, container)),
            vec!["p1", "p2", "p3"]
        );

        rules.reverse_order = true;
        rules.start_at = Some("#p3".to_string());
        rules.stop_at = Some("#p0".to_string());
        let compiled = rules.compile().expect("compiles");
        assert_eq!(
            ids(&doc, &compiled.query_candidates(&doc, container)),
            vec!["p3", "p2", "p1"]
        );
    }

    #[test]
    fn test_missing_start_anchor_drops_everything() {
        let doc = doc();
        let mut rules = RuleSet::new("p");
        rules.start_at = Some("#nope".to_string());
        let compiled = rules.compile().expect("compiles");
        assert!(compiled.query_candidates(&doc, None).is_empty());
    }

    #[test]
    fn test_missing_container_is_an_error() {
        let doc = doc();
        let compiled = RuleSet::new("p").within(".missing").compile().expect("compiles");
        assert!(matches!(
            compiled.resolve_container(&doc),
            Err(SpacefinderError::ContainerNotFound(_))
        ));
    }

    #[test]
    fn test_min_gap_filter() {
        let filter = CandidateFilter::MinGapFromPrevious { min_gap: 600.0 };
        let first = Candidate::new(ElementId(1), 100.0, 200.0);
        let near = Candidate::new(ElementId(2), 500.0, 600.0);
        let far = Candidate::new(ElementId(3), 700.0, 800.0);
        assert!(filter.accepts(&first, None));
        assert!(!filter.accepts(&near, Some(&first)));
        assert!(filter.accepts(&far, Some(&first)));
    }

    #[test]
    fn test_related_candidates() {
        let parent = Candidate::new(ElementId(1), 0.0, 500.0).with_lineage(vec![ElementId(1), ElementId(0)]);
        let child = Candidate::new(ElementId(2), 10.0, 50.0)
            .with_lineage(vec![ElementId(2), ElementId(1), ElementId(0)]);
        let stranger = Candidate::new(ElementId(3), 10.0, 50.0).with_lineage(vec![ElementId(3), ElementId(0)]);
        assert!(child.is_related_to(&parent));
        assert!(parent.is_related_to(&child));
        assert!(child.is_related_to(&child));
        assert!(!child.is_related_to(&stranger));
    }
}
