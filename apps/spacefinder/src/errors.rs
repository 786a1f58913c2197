use thiserror::Error;

use crate::search::rules::RuleSet;

/// Crate-level error type.
///
/// `NoSpaceAvailable` is an expected outcome of a search, not a bug. Every other
/// variant is an unexpected failure that the space filler reports and swallows.
#[derive(Debug, Error)]
pub enum SpacefinderError {
    #[error("No space found for candidates matching '{}'", rules.candidate_selector)]
    NoSpaceAvailable { rules: Box<RuleSet> },

    #[error("Invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    #[error("DOM error: {0}")]
    Dom(String),

    #[error("Writer failed: {0}")]
    Writer(anyhow::Error),

    #[error("Placement task failed: {0}")]
    TaskFailed(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl SpacefinderError {
    /// True for the "search found nothing" outcome.
    pub fn is_no_space(&self) -> bool {
        matches!(self, SpacefinderError::NoSpaceAvailable { .. })
    }
}
