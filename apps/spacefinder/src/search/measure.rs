//! Geometry Snapshot — one batched layout read per search.
//!
//! Candidates, opponents and the content meta block are all measured inside a
//! single `Page::measure` call so no writer can reflow the page halfway through.

use std::collections::{BTreeMap, HashSet};

use crate::dom::{Document, ElementId, Page};
use crate::search::rules::{Candidate, CompiledRules, Opponent};

/// Immutable measurements for one placement search.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Page-absolute top of the container (0 for the whole document).
    pub container_top: f64,
    pub container_height: f64,
    pub candidates: Vec<Candidate>,
    pub content_meta: Option<Opponent>,
    /// Keyed by the opponent selector as written in the rule set.
    pub opponents: BTreeMap<String, Vec<Opponent>>,
    /// Candidates matching each opponent rule's bypass selector.
    pub bypassed: BTreeMap<String, HashSet<ElementId>>,
}

impl Snapshot {
    pub fn opponents_for(&self, selector: &str) -> &[Opponent] {
        self.opponents.get(selector).map_or(&[], Vec::as_slice)
    }

    pub fn is_bypassed(&self, selector: &str, candidate: ElementId) -> bool {
        self.bypassed
            .get(selector)
            .is_some_and(|set| set.contains(&candidate))
    }
}

/// Takes the snapshot through the layout scheduler.
pub async fn measure(
    page: &Page,
    rules: &CompiledRules,
    container: Option<ElementId>,
    candidates: &[ElementId],
) -> Snapshot {
    page.measure(|doc| take_snapshot(doc, rules, container, candidates))
        .await
}

/// Synchronous body of `measure`. Elements that vanished from the document are skipped.
pub fn take_snapshot(
    doc: &Document,
    rules: &CompiledRules,
    container: Option<ElementId>,
    candidates: &[ElementId],
) -> Snapshot {
    let (container_top, container_height) = match container.and_then(|c| doc.bounding_client_rect(c)) {
        Some(rect) => (rect.top + doc.scroll_y(), rect.height),
        None => (0.0, doc.document_height()),
    };
    let scope = container.unwrap_or_else(|| doc.root());
    let position = |id: ElementId| position_of(doc, id, container_top);

    let candidates: Vec<Candidate> = candidates.iter().filter_map(|&id| position(id)).collect();

    let content_meta = rules
        .content_meta
        .as_ref()
        .and_then(|selector| doc.query_selector(doc.root(), selector))
        .and_then(position);

    let mut opponents = BTreeMap::new();
    let mut bypassed = BTreeMap::new();
    for opponent in &rules.opponents {
        let measured = doc
            .query_selector_all(scope, &opponent.selector)
            .into_iter()
            .filter_map(position)
            .collect();
        opponents.insert(opponent.key.clone(), measured);

        if let Some(bypass) = &opponent.bypass {
            let matching = candidates
                .iter()
                .map(|c| c.element)
                .filter(|&id| bypass.matches(doc, id, scope))
                .collect();
            bypassed.insert(opponent.key.clone(), matching);
        }
    }

    Snapshot {
        container_top,
        container_height,
        candidates,
        content_meta,
        opponents,
        bypassed,
    }
}

fn position_of(doc: &Document, id: ElementId, container_top: f64) -> Option<Candidate> {
    let rect = doc.bounding_client_rect(id)?;
    let top = rect.top + doc.scroll_y() - container_top;
    Some(Candidate {
        element: id,
        top,
        bottom: top + rect.height,
        lineage: doc.lineage(id),
    })
}
