//! Ad slot factory and the writer that inserts slots before search winners.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::dom::{ElementId, NewElement, Page};
use crate::errors::SpacefinderError;
use crate::filler::SpaceWriter;

/// Builds the container element for one ad slot.
pub fn create_ad_slot(name: &str, classes: &[String], height: f64) -> NewElement {
    let mut slot = NewElement::new("div")
        .with_id(&format!("dfp-ad--{name}"))
        .with_class("js-ad-slot")
        .with_class("ad-slot")
        .with_class(&format!("ad-slot--{name}"))
        .with_attribute("data-name", name)
        .with_attribute("data-link-name", &format!("ad slot {name}"))
        .with_height(height);
    for class in classes {
        slot = slot.with_class(&format!("ad-slot--{class}"));
    }
    slot
}

/// Inserts one slot before each winner, up to `max_slots`.
#[derive(Clone)]
pub struct SlotWriter {
    page: Arc<Page>,
    prefix: String,
    classes: Vec<String>,
    height: f64,
    max_slots: usize,
    counter: Arc<AtomicUsize>,
    inserted: Arc<Mutex<Vec<String>>>,
}

impl SlotWriter {
    pub fn new(page: Arc<Page>, prefix: &str, height: f64) -> Self {
        Self {
            page,
            prefix: prefix.to_string(),
            classes: Vec::new(),
            height,
            max_slots: usize::MAX,
            counter: Arc::new(AtomicUsize::new(0)),
            inserted: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_classes(mut self, classes: Vec<String>) -> Self {
        self.classes = classes;
        self
    }

    pub fn with_max_slots(mut self, max_slots: usize) -> Self {
        self.max_slots = max_slots;
        self
    }

    /// Shares slot numbering with other writers using the same prefix.
    pub fn with_counter(mut self, counter: Arc<AtomicUsize>) -> Self {
        self.counter = counter;
        self
    }

    /// Names of every slot this writer (and its clones) has inserted.
    pub async fn inserted(&self) -> Vec<String> {
        self.inserted.lock().await.clone()
    }
}

#[async_trait]
impl SpaceWriter for SlotWriter {
    async fn write(&self, winners: Vec<ElementId>) -> anyhow::Result<()> {
        let names = self
            .page
            .mutate(|doc| {
                let winners = &winners[..winners.len().min(self.max_slots)];
                // all or nothing: a slot is only inserted once every winner can take one
                if let Some(detached) = winners
                    .iter()
                    .find(|&&winner| winner == doc.root() || !doc.contains(doc.root(), winner))
                {
                    return Err(SpacefinderError::Dom(format!("{detached} is not attached to the page")));
                }
                winners
                    .iter()
                    .map(|&winner| {
                        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
                        let name = format!("{}{n}", self.prefix);
                        doc.insert_before(create_ad_slot(&name, &self.classes, self.height), winner)?;
                        Ok(name)
                    })
                    .collect::<Result<Vec<_>, SpacefinderError>>()
            })
            .await?;

        debug!(slots = ?names, "inserted ad slots");
        self.inserted.lock().await.extend(names);
        Ok(())
    }
}
