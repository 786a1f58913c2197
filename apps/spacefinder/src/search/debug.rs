//! Debug visualizer seam.
//!
//! The search hands its ledger to a `DebugVisualizer` when debugging is on and
//! at least one candidate was accepted. The shipped implementation writes the
//! ledger to the tracing stream; anything that draws overlays plugs in here.

use tracing::debug;

use crate::search::evaluate::ExclusionLedger;
use crate::search::rules::{Candidate, RuleSet};

/// Query-string flag that turns the visualizer on for a page view.
pub const DEBUG_QUERY_FLAG: &str = "sfdebug";

pub trait DebugVisualizer: Send + Sync {
    fn init(&self, ledger: &ExclusionLedger, accepted: &[Candidate], rules: &RuleSet, pass: &str);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingVisualizer;

impl DebugVisualizer for TracingVisualizer {
    fn init(&self, ledger: &ExclusionLedger, accepted: &[Candidate], rules: &RuleSet, pass: &str) {
        debug!(
            pass,
            candidates = %rules.candidate_selector,
            accepted = accepted.len(),
            excluded = ledger.total(),
            "spacefinder ledger"
        );
        for (stage, exclusions) in ledger.iter() {
            for exclusion in exclusions {
                for reason in &exclusion.reasons {
                    debug!(
                        pass,
                        stage,
                        candidate = %exclusion.candidate.element,
                        kind = ?reason.kind,
                        required = reason.required_margin,
                        actual = reason.actual_margin,
                        opponent = ?reason.opponent,
                        "excluded"
                    );
                }
            }
        }
        for winner in accepted {
            debug!(pass, candidate = %winner.element, top = winner.top, "accepted");
        }
    }
}

/// True when the page URL's query string carries the debug flag.
pub fn debug_flag_in_url(url: &str) -> bool {
    let Some((_, query)) = url.split_once('?') else {
        return false;
    };
    let query = query.split('#').next().unwrap_or_default();
    query
        .split('&')
        .filter_map(|pair| pair.split('=').next())
        .any(|name| name == DEBUG_QUERY_FLAG)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_flag_detection() {
        assert!(debug_flag_in_url("https://example.com/article?sfdebug"));
        assert!(debug_flag_in_url("https://example.com/article?a=1&sfdebug=2#top"));
        assert!(!debug_flag_in_url("https://example.com/article"));
        assert!(!debug_flag_in_url("https://example.com/article?nosfdebug=1"));
        assert!(!debug_flag_in_url("https://example.com/article#sfdebug"));
    }

    #[test]
    fn test_tracing_visualizer_accepts_empty_ledger() {
        let ledger = ExclusionLedger::default();
        TracingVisualizer.init(&ledger, &[], &RuleSet::new("p"), "inline1");
        assert!(ledger.is_empty());
    }
}
