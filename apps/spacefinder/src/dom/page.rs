//! Layout scheduler — batches reads and writes against the live document.
//!
//! # Scheduling
//! - `measure` and `mutate` each defer to the next scheduler turn before touching
//!   the document, so reads queued in the same turn see one consistent layout.
//! - Every `mutate` bumps a revision counter; readiness waiters subscribe to it
//!   instead of polling.

use tokio::sync::{watch, RwLock};

use crate::dom::document::Document;

pub struct Page {
    document: RwLock<Document>,
    revision: watch::Sender<u64>,
}

impl Page {
    pub fn new(document: Document) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            document: RwLock::new(document),
            revision,
        }
    }

    /// Runs `read` against the document in the next read batch.
    pub async fn measure<T, F>(&self, read: F) -> T
    where
        F: FnOnce(&Document) -> T,
    {
        tokio::task::yield_now().await;
        let document = self.document.read().await;
        read(&document)
    }

    /// Runs `write` against the document in the next write batch and notifies subscribers.
    pub async fn mutate<T, F>(&self, write: F) -> T
    where
        F: FnOnce(&mut Document) -> T,
    {
        tokio::task::yield_now().await;
        let out = {
            let mut document = self.document.write().await;
            write(&mut document)
        };
        self.revision.send_modify(|rev| *rev += 1);
        out
    }

    /// Replaces the whole document (a new page view).
    pub async fn navigate(&self, document: Document) {
        *self.document.write().await = document;
        self.revision.send_modify(|rev| *rev += 1);
    }

    /// Receiver that wakes on every subsequent mutation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }
}
