//! Placement Search — the `find_space` entry point.
//!
//! # Pipeline
//! 1. Compile the rule set (selector errors surface here, before any layout work).
//! 2. Resolve the container through the layout scheduler.
//! 3. Wait on the readiness gate (bounded; never fails).
//! 4. Query candidates in search order, trimmed to `start_at..stop_at`.
//! 5. Take one geometry snapshot.
//! 6. Evaluate with the configured proximity policy.
//!
//! The search only reads the document. Placing anything is the writer's job.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::debug;

use crate::config::SpacefinderConfig;
use crate::dom::{ElementId, Page};
use crate::errors::SpacefinderError;
use crate::search::debug::{debug_flag_in_url, DebugVisualizer};
use crate::search::evaluate::evaluate;
use crate::search::measure::measure;
use crate::search::policy::ProximityPolicy;
use crate::search::ready::ReadinessGate;
use crate::search::rules::{FindOptions, RuleSet};

pub struct Spacefinder {
    page: Arc<Page>,
    policy: Arc<dyn ProximityPolicy>,
    readiness: ReadinessGate,
    visualizer: Option<Arc<dyn DebugVisualizer>>,
    debug: bool,
}

impl Spacefinder {
    pub fn new(page: Arc<Page>, config: &SpacefinderConfig) -> Self {
        Self {
            readiness: ReadinessGate::new(Arc::clone(&page), config.ready_timeout),
            page,
            policy: config.policy.build(),
            visualizer: None,
            debug: config.debug,
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn ProximityPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_visualizer(mut self, visualizer: Arc<dyn DebugVisualizer>) -> Self {
        self.visualizer = Some(visualizer);
        self
    }

    pub fn page(&self) -> &Arc<Page> {
        &self.page
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Forgets per-page-view state. Call after `Page::navigate`.
    pub async fn reset(&self) {
        self.readiness.reset().await;
    }

    /// Returns the elements an ad may be inserted before, in search order.
    ///
    /// An empty result is `SpacefinderError::NoSpaceAvailable`, never `Ok(vec![])`.
    pub async fn find_space(
        &self,
        rules: &RuleSet,
        options: &FindOptions,
    ) -> Result<Vec<ElementId>, SpacefinderError> {
        let pass = options.pass_label();
        let started = Instant::now();
        debug!(pass, candidates = %rules.candidate_selector, "spacefinder start");

        let compiled = rules.compile()?;
        let (container, debug_in_url) = self
            .page
            .measure(|doc| {
                compiled
                    .resolve_container(doc)
                    .map(|container| (container, debug_flag_in_url(doc.url())))
            })
            .await?;

        self.readiness
            .ready(rules.container_key(), container, options)
            .await;

        let candidates = self
            .page
            .measure(|doc| compiled.query_candidates(doc, container))
            .await;
        let snapshot = measure(&self.page, &compiled, container, &candidates).await;
        let evaluation = evaluate(&snapshot, rules, self.policy.as_ref());

        debug!(
            pass,
            policy = self.policy.name(),
            candidates = snapshot.candidates.len(),
            accepted = evaluation.accepted.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "spacefinder end"
        );

        if evaluation.accepted.is_empty() {
            return Err(SpacefinderError::NoSpaceAvailable {
                rules: Box::new(rules.clone()),
            });
        }

        if self.debug || debug_in_url {
            if let Some(visualizer) = &self.visualizer {
                visualizer.init(&evaluation.ledger, &evaluation.accepted, rules, pass);
            }
        }

        Ok(evaluation.accepted.into_iter().map(|c| c.element).collect())
    }
}
