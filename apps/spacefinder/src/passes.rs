//! Placement passes — named, breakpoint-aware rule sets loaded from JSON.
//!
//! A pass picks the rule variant for the current breakpoint, runs it through
//! the space filler, and inserts slots before the winners.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::breakpoint::Breakpoint;
use crate::search::{FindOptions, RuleSet};

pub const DEFAULT_SLOT_HEIGHT: f64 = 250.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleVariant {
    #[serde(default = "default_breakpoint")]
    pub min_breakpoint: Breakpoint,
    pub rules: RuleSet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassDefinition {
    pub name: String,
    /// Ordered narrowest first; the last one that applies wins.
    pub variants: Vec<RuleVariant>,
    #[serde(default)]
    pub options: FindOptions,
    pub slot_prefix: String,
    #[serde(default)]
    pub slot_classes: Vec<String>,
    #[serde(default = "default_slot_height")]
    pub slot_height: f64,
    #[serde(default)]
    pub max_slots: Option<usize>,
}

fn default_breakpoint() -> Breakpoint {
    Breakpoint::Mobile
}

fn default_slot_height() -> f64 {
    DEFAULT_SLOT_HEIGHT
}

impl PassDefinition {
    /// `None` when no variant applies at this breakpoint.
    pub fn rules_for(&self, breakpoint: Breakpoint) -> Option<&RuleSet> {
        self.variants
            .iter()
            .rev()
            .find(|v| v.min_breakpoint <= breakpoint)
            .map(|v| &v.rules)
    }

    /// Options with the pass name filled in as the instrumentation label.
    pub fn find_options(&self) -> FindOptions {
        let mut options = self.options.clone();
        options.pass.get_or_insert_with(|| self.name.clone());
        options
    }
}

pub fn load_passes(path: &Path) -> Result<Vec<PassDefinition>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read pass definitions {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse pass definitions {}", path.display()))
}

// ────────────────────────────────────────────────────────────────────────────
// Run output
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassReport {
    pub pass: String,
    /// False when skipped, when nothing fit, or when the fill failed.
    pub filled: bool,
    pub skipped: bool,
    pub slots: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub generated_at: DateTime<Utc>,
    pub url: String,
    pub breakpoint: Breakpoint,
    pub policy: String,
    pub passes: Vec<PassReport>,
    pub document_height: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use crate::search::CandidateFilter;

    const FIXTURE: &str = include_str!("../fixtures/passes.json");

    fn passes() -> Vec<PassDefinition> {
        serde_json::from_str(FIXTURE).expect("fixture parses")
    }

    #[test]
    fn test_fixture_parses_with_defaults() {
        let passes = passes();
        assert_eq!(passes.len(), 3);

        let inline = &passes[0];
        assert_eq!(inline.max_slots, Some(3));
        assert_eq!(inline.slot_height, DEFAULT_SLOT_HEIGHT);
        assert!(inline.options.wait_for_images);

        let merchandising = &passes[1];
        assert_eq!(merchandising.slot_height, 300.0);
        assert_eq!(merchandising.variants[0].min_breakpoint, Breakpoint::Mobile);
        assert!(merchandising.variants[0].rules.reverse_order);
        assert!(!merchandising.options.wait_for_images);
    }

    #[test]
    fn test_rules_for_picks_widest_applicable_variant() {
        let passes = passes();
        let inline = &passes[0];

        let mobile = inline.rules_for(Breakpoint::Phablet).expect("mobile variant");
        assert_eq!(mobile.min_distance_from_top, 200.0);
        assert!(matches!(
            mobile.filter,
            Some(CandidateFilter::MinGapFromPrevious { min_gap }) if min_gap == 700.0
        ));

        let desktop = inline.rules_for(Breakpoint::Wide).expect("desktop variant");
        assert_eq!(desktop.absolute_min_distance_from_top, Some(1000.0));
        assert_eq!(desktop.opponent_selector_rules.len(), 4);

        assert!(passes[2].rules_for(Breakpoint::Desktop).is_none());
        assert!(passes[2].rules_for(Breakpoint::Wide).is_some());
    }

    #[test]
    fn test_find_options_carry_pass_name() {
        let passes = passes();
        assert_eq!(passes[1].find_options().pass.as_deref(), Some("merchandising"));

        let mut named = passes[1].clone();
        named.options.pass = Some("custom-label".to_string());
        assert_eq!(named.find_options().pass_label(), "custom-label");
    }

    #[test]
    fn test_load_passes_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(FIXTURE.as_bytes()).expect("write fixture");
        let loaded = load_passes(file.path()).expect("loads");
        assert_eq!(loaded.len(), 3);

        let missing = load_passes(Path::new("/nonexistent/passes.json"));
        assert!(missing.is_err());
    }
}
