//! Placement search engine.
//!
//! `Spacefinder::find_space` takes a `RuleSet` and returns the elements an ad
//! slot may be inserted before. See each submodule for its stage.

pub mod debug;
pub mod evaluate;
pub mod finder;
pub mod measure;
pub mod policy;
pub mod ready;
pub mod rules;

pub use debug::{DebugVisualizer, TracingVisualizer};
pub use evaluate::{evaluate, Evaluation, ExclusionLedger};
pub use finder::Spacefinder;
pub use policy::{CurrentPolicy, LegacyPolicy, PolicyKind, ProximityPolicy};
pub use rules::{Candidate, CandidateFilter, FindOptions, OpponentRule, RuleSet};
