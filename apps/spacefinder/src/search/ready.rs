//! Readiness Gate — lets late-loading content settle before geometry is read.
//!
//! # Behaviour
//! - Image waiter: resolves once every eager, not-yet-complete `<img>` in the
//!   container has completed.
//! - Interactive waiter: resolves once every `.element-interactive` embed in the
//!   container has an `<iframe>` child that reports loaded.
//! - Both waiters are spawned once per container key and cached for the page
//!   view; later searches on the same container share them. `reset` (or
//!   dropping the gate) aborts them.
//! - The pair is raced against a fixed timeout. A timeout is logged and the
//!   search goes ahead with whatever layout exists. Nothing here fails.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::dom::{Document, ElementId, Loading, Page};
use crate::search::rules::FindOptions;

pub const LOADING_TIMEOUT: Duration = Duration::from_millis(5000);

const INTERACTIVE_CLASS: &str = "element-interactive";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resource {
    Images,
    Interactives,
}

impl Resource {
    fn label(self) -> &'static str {
        match self {
            Resource::Images => "images",
            Resource::Interactives => "interactives",
        }
    }

    /// Elements in scope still waiting to load.
    fn pending(self, doc: &Document, scope: ElementId) -> Vec<ElementId> {
        doc.descendants(scope)
            .into_iter()
            .filter(|&id| match self {
                Resource::Images => doc
                    .get(id)
                    .is_some_and(|el| el.tag == "img" && el.loading != Loading::Lazy && !el.complete),
                Resource::Interactives => {
                    doc.get(id).is_some_and(|el| el.has_class(INTERACTIVE_CLASS))
                        && !self.is_settled(doc, id)
                }
            })
            .collect()
    }

    fn is_settled(self, doc: &Document, id: ElementId) -> bool {
        match self {
            Resource::Images => doc.get(id).map_or(true, |el| el.complete),
            // a removed embed no longer blocks anything
            Resource::Interactives => doc.get(id).is_none() || doc
                .children(id)
                .iter()
                .filter_map(|&child| doc.get(child))
                .any(|child| child.tag == "iframe" && child.complete),
        }
    }
}

struct Waiter {
    done: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

type WaiterCache = Mutex<HashMap<String, Waiter>>;

pub struct ReadinessGate {
    page: Arc<Page>,
    timeout: Duration,
    images: WaiterCache,
    interactives: WaiterCache,
}

impl ReadinessGate {
    pub fn new(page: Arc<Page>, timeout: Duration) -> Self {
        Self {
            page,
            timeout,
            images: Mutex::new(HashMap::new()),
            interactives: Mutex::new(HashMap::new()),
        }
    }

    /// Waits for the requested resources under `container` (or the whole document).
    pub async fn ready(
        &self,
        key: &str,
        container: Option<ElementId>,
        options: &FindOptions,
    ) -> Readiness {
        let images = match options.wait_for_images {
            true => Some(self.waiter(Resource::Images, key, container).await),
            false => None,
        };
        let interactives = match options.wait_for_interactives {
            true => Some(self.waiter(Resource::Interactives, key, container).await),
            false => None,
        };

        let both = async {
            tokio::join!(settled(images), settled(interactives));
        };
        match tokio::time::timeout(self.timeout, both).await {
            Ok(()) => Readiness::Ready,
            Err(_) => {
                info!(container = key, timeout_ms = self.timeout.as_millis() as u64, "Spacefinder timeout hit");
                Readiness::TimedOut
            }
        }
    }

    /// Aborts and forgets every cached waiter. Call on navigation.
    pub async fn reset(&self) {
        for cache in [&self.images, &self.interactives] {
            for (_, waiter) in cache.lock().await.drain() {
                waiter.task.abort();
            }
        }
    }

    pub async fn cached_waiters(&self) -> usize {
        self.images.lock().await.len() + self.interactives.lock().await.len()
    }

    async fn waiter(
        &self,
        resource: Resource,
        key: &str,
        container: Option<ElementId>,
    ) -> watch::Receiver<bool> {
        let cache = match resource {
            Resource::Images => &self.images,
            Resource::Interactives => &self.interactives,
        };
        let mut cache = cache.lock().await;
        if let Some(waiter) = cache.get(key) {
            return waiter.done.clone();
        }

        let (tx, rx) = watch::channel(false);
        let page = Arc::clone(&self.page);
        let task = tokio::spawn(async move {
            wait_for(&page, resource, container).await;
            let _ = tx.send(true);
        });
        cache.insert(
            key.to_string(),
            Waiter {
                done: rx.clone(),
                task,
            },
        );
        rx
    }
}

impl Drop for ReadinessGate {
    fn drop(&mut self) {
        for cache in [&mut self.images, &mut self.interactives] {
            for waiter in cache.get_mut().values() {
                waiter.task.abort();
            }
        }
    }
}

async fn settled(waiter: Option<watch::Receiver<bool>>) {
    if let Some(mut rx) = waiter {
        // a dropped sender means the waiter task is gone; nothing left to wait for
        let _ = rx.wait_for(|done| *done).await;
    }
}

/// Resolves once everything pending at the time of the call has loaded.
async fn wait_for(page: &Page, resource: Resource, container: Option<ElementId>) {
    let mut changes = page.subscribe();
    let pending = page
        .measure(|doc| resource.pending(doc, container.unwrap_or_else(|| doc.root())))
        .await;
    if pending.is_empty() {
        return;
    }
    debug!(resource = resource.label(), count = pending.len(), "waiting for resources");

    loop {
        let done = page
            .measure(|doc| pending.iter().all(|&id| resource.is_settled(doc, id)))
            .await;
        if done {
            debug!(resource = resource.label(), "resources settled");
            return;
        }
        if changes.changed().await.is_err() {
            return;
        }
    }
}
