//! Space Filler — serialized write queue in front of `find_space`.
//!
//! # Architecture
//! - `fill_space` pushes a `QueueEntry` onto an unbounded mpsc channel and
//!   returns a future resolving to the entry's outcome via a oneshot reply.
//! - One worker task drains the channel. Each entry's search and write run to
//!   completion before the next entry's search starts, so a search always sees
//!   the layout left by every earlier writer.
//! - Each entry runs in its own spawned task; a panicking writer becomes a
//!   reported failure instead of taking the worker down.
//!
//! # Outcomes
//! - winners written → `true`
//! - `NoSpaceAvailable` → `false`, info log only
//! - anything else → reported to the `ErrorReporter`, `false`

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::dom::ElementId;
use crate::errors::SpacefinderError;
use crate::search::{FindOptions, RuleSet, Spacefinder};

/// Tag attached to every report raised by the queue.
pub const REPORT_TAG: &str = "commercial";

// ────────────────────────────────────────────────────────────────────────────
// Collaborator traits
// ────────────────────────────────────────────────────────────────────────────

/// Inserts content before the winning elements.
#[async_trait]
pub trait SpaceWriter: Send + Sync {
    async fn write(&self, winners: Vec<ElementId>) -> anyhow::Result<()>;
}

/// Adapts an async closure into a `SpaceWriter`.
pub struct FnWriter<F>(pub F);

#[async_trait]
impl<F, Fut> SpaceWriter for FnWriter<F>
where
    F: Fn(Vec<ElementId>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn write(&self, winners: Vec<ElementId>) -> anyhow::Result<()> {
        (self.0)(winners).await
    }
}

#[derive(Debug, Clone)]
pub struct ReportContext {
    pub entry_id: Uuid,
    pub pass: Option<String>,
    pub candidate_selector: String,
}

/// Receives unexpected failures. Never sees `NoSpaceAvailable`.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, error: &SpacefinderError, tag: &str, context: &ReportContext);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, error: &SpacefinderError, tag: &str, context: &ReportContext) {
        error!(
            tag,
            entry = %context.entry_id,
            pass = context.pass.as_deref().unwrap_or("default"),
            candidates = %context.candidate_selector,
            "space fill failed: {error}"
        );
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Queue
// ────────────────────────────────────────────────────────────────────────────

struct QueueEntry {
    id: Uuid,
    rules: RuleSet,
    writer: Box<dyn SpaceWriter>,
    options: FindOptions,
    reply: oneshot::Sender<bool>,
}

/// Handle to the write queue. Clones share the same queue.
#[derive(Clone)]
pub struct SpaceFiller {
    tx: mpsc::UnboundedSender<QueueEntry>,
}

impl SpaceFiller {
    /// Spawns the queue worker. Must be called inside a tokio runtime.
    pub fn new(finder: Arc<Spacefinder>, reporter: Arc<dyn ErrorReporter>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_queue(rx, finder, reporter));
        Self { tx }
    }

    /// Queues a search-and-write. The entry is enqueued immediately; the
    /// returned future only reports its outcome and never fails.
    pub fn fill_space<W>(
        &self,
        rules: RuleSet,
        writer: W,
        options: FindOptions,
    ) -> impl Future<Output = bool> + Send + 'static
    where
        W: SpaceWriter + 'static,
    {
        let (reply, outcome) = oneshot::channel();
        let entry = QueueEntry {
            id: Uuid::new_v4(),
            rules,
            writer: Box::new(writer),
            options,
            reply,
        };
        let queued = match self.tx.send(entry) {
            Ok(()) => true,
            Err(_) => {
                warn!("space filler queue is closed; dropping entry");
                false
            }
        };

        async move { queued && outcome.await.unwrap_or(false) }
    }
}

async fn run_queue(
    mut rx: mpsc::UnboundedReceiver<QueueEntry>,
    finder: Arc<Spacefinder>,
    reporter: Arc<dyn ErrorReporter>,
) {
    while let Some(entry) = rx.recv().await {
        let QueueEntry {
            id,
            rules,
            writer,
            options,
            reply,
        } = entry;
        let context = ReportContext {
            entry_id: id,
            pass: options.pass.clone(),
            candidate_selector: rules.candidate_selector.clone(),
        };

        let task = tokio::spawn(search_and_write(Arc::clone(&finder), rules, writer, options));
        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(join_error) => Err(SpacefinderError::TaskFailed(join_error.to_string())),
        };

        let filled = match outcome {
            Ok(()) => true,
            Err(err) if err.is_no_space() => {
                info!(entry = %id, pass = context.pass.as_deref().unwrap_or("default"), "{err}");
                false
            }
            Err(err) => {
                reporter.report(&err, REPORT_TAG, &context);
                false
            }
        };
        // caller may have dropped the future; the entry still ran
        let _ = reply.send(filled);
    }
}

async fn search_and_write(
    finder: Arc<Spacefinder>,
    rules: RuleSet,
    writer: Box<dyn SpaceWriter>,
    options: FindOptions,
) -> Result<(), SpacefinderError> {
    let winners = finder.find_space(&rules, &options).await?;
    writer.write(winners).await.map_err(SpacefinderError::Writer)
}
