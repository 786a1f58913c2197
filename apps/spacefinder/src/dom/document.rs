//! Render tree — an arena of laid-out elements with page-absolute geometry.
//!
//! # Geometry model
//! - Every element carries a page-absolute `Rect` (top + height). Horizontal
//!   geometry is irrelevant to placement search and is not modelled.
//! - `bounding_client_rect` is viewport-relative (`top − scroll_y`), mirroring how
//!   a browser reports it.
//! - Insertions reflow as a single block column: elements at or below the
//!   insertion point shift down, ancestors of the insertion point grow.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::dom::selector::SelectorList;
use crate::errors::SpacefinderError;

pub const DEFAULT_VIEWPORT_WIDTH: f64 = 1300.0;

// ────────────────────────────────────────────────────────────────────────────
// Core types
// ────────────────────────────────────────────────────────────────────────────

/// Handle to an element inside one `Document`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(pub usize);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub top: f64,
    pub height: f64,
}

impl Rect {
    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

/// Resource loading strategy (images only).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Loading {
    #[default]
    Eager,
    Lazy,
}

#[derive(Debug, Clone)]
pub struct Element {
    /// Lowercased tag name.
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attributes: BTreeMap<String, String>,
    pub rect: Rect,
    pub loading: Loading,
    /// `img.complete` for images, "loaded" for iframes. Always true for other elements.
    pub complete: bool,
    parent: Option<ElementId>,
    children: Vec<ElementId>,
}

impl Element {
    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        match name {
            "id" => self.id.as_deref(),
            _ => self.attributes.get(name).map(String::as_str),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Fixture format
// ────────────────────────────────────────────────────────────────────────────

/// Serializable description of a laid-out page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageFixture {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_viewport_width")]
    pub viewport_width: f64,
    #[serde(default)]
    pub scroll_y: f64,
    pub root: ElementNode,
}

impl PageFixture {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read page fixture {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse page fixture {}", path.display()))
    }
}

/// One element of a `PageFixture`, with its subtree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementNode {
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub top: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(default)]
    pub loading: Loading,
    #[serde(default = "default_complete")]
    pub complete: bool,
    #[serde(default)]
    pub children: Vec<ElementNode>,
}

fn default_complete() -> bool {
    true
}

fn default_viewport_width() -> f64 {
    DEFAULT_VIEWPORT_WIDTH
}

impl ElementNode {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            id: None,
            classes: Vec::new(),
            attributes: BTreeMap::new(),
            top: 0.0,
            height: 0.0,
            loading: Loading::Eager,
            complete: true,
            children: Vec::new(),
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn class(mut self, class: &str) -> Self {
        self.classes.push(class.to_string());
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    /// Page-absolute position.
    pub fn at(mut self, top: f64, height: f64) -> Self {
        self.top = top;
        self.height = height;
        self
    }

    pub fn lazy(mut self) -> Self {
        self.loading = Loading::Lazy;
        self
    }

    pub fn incomplete(mut self) -> Self {
        self.complete = false;
        self
    }

    pub fn child(mut self, child: ElementNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = ElementNode>) -> Self {
        self.children.extend(children);
        self
    }
}

/// An element about to be inserted by a writer.
#[derive(Debug, Clone)]
pub struct NewElement {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attributes: BTreeMap<String, String>,
    pub height: f64,
    pub loading: Loading,
    pub complete: bool,
}

impl NewElement {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            id: None,
            classes: Vec::new(),
            attributes: BTreeMap::new(),
            height: 0.0,
            loading: Loading::Eager,
            complete: true,
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.classes.push(class.to_string());
        self
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_height(mut self, height: f64) -> Self {
        self.height = height;
        self
    }

    pub fn incomplete(mut self) -> Self {
        self.complete = false;
        self
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Document
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Document {
    elements: Vec<Element>,
    root: ElementId,
    scroll_y: f64,
    url: String,
    viewport_width: f64,
}

impl Document {
    /// Builds a document from a bare element tree (no URL, no scroll).
    pub fn new(root: ElementNode) -> Self {
        Self::from_fixture(PageFixture {
            url: String::new(),
            viewport_width: DEFAULT_VIEWPORT_WIDTH,
            scroll_y: 0.0,
            root,
        })
    }

    pub fn from_fixture(fixture: PageFixture) -> Self {
        let mut doc = Document {
            elements: Vec::new(),
            root: ElementId(0),
            scroll_y: fixture.scroll_y,
            url: fixture.url,
            viewport_width: fixture.viewport_width,
        };
        doc.root = doc.push_node(fixture.root, None);
        doc
    }

    fn push_node(&mut self, node: ElementNode, parent: Option<ElementId>) -> ElementId {
        let id = ElementId(self.elements.len());
        let ElementNode {
            tag,
            id: html_id,
            classes,
            attributes,
            top,
            height,
            loading,
            complete,
            children,
        } = node;

        self.elements.push(Element {
            tag: tag.to_ascii_lowercase(),
            id: html_id,
            classes,
            attributes,
            rect: Rect { top, height },
            loading,
            complete,
            parent,
            children: Vec::new(),
        });

        for child in children {
            let child_id = self.push_node(child, Some(id));
            self.elements[id.0].children.push(child_id);
        }
        id
    }

    // ── accessors ───────────────────────────────────────────────────────────

    pub fn root(&self) -> ElementId {
        self.root
    }

    pub fn get(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn viewport_width(&self) -> f64 {
        self.viewport_width
    }

    pub fn scroll_y(&self) -> f64 {
        self.scroll_y
    }

    pub fn set_scroll_y(&mut self, scroll_y: f64) {
        self.scroll_y = scroll_y;
    }

    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.get(id).and_then(|el| el.parent)
    }

    pub fn children(&self, id: ElementId) -> &[ElementId] {
        self.get(id).map_or(&[], |el| el.children.as_slice())
    }

    /// All descendants of `scope` in document order, excluding `scope` itself.
    pub fn descendants(&self, scope: ElementId) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut stack: Vec<ElementId> = self.children(scope).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev());
        }
        out
    }

    /// Inclusive ancestor chain: `id`, its parent, ..., the root.
    pub fn lineage(&self, id: ElementId) -> Vec<ElementId> {
        let mut chain = Vec::new();
        let mut current = self.get(id).map(|_| id);
        while let Some(el) = current {
            chain.push(el);
            current = self.parent(el);
        }
        chain
    }

    /// `Node.contains` semantics: an element contains itself.
    pub fn contains(&self, ancestor: ElementId, id: ElementId) -> bool {
        let mut current = Some(id);
        while let Some(el) = current {
            if el == ancestor {
                return true;
            }
            current = self.parent(el);
        }
        false
    }

    /// Viewport-relative rect.
    pub fn bounding_client_rect(&self, id: ElementId) -> Option<Rect> {
        self.get(id).map(|el| Rect {
            top: el.rect.top - self.scroll_y,
            height: el.rect.height,
        })
    }

    /// Full scroll height of the page.
    pub fn document_height(&self) -> f64 {
        self.elements
            .iter()
            .map(|el| el.rect.bottom())
            .fold(0.0_f64, f64::max)
    }

    // ── queries ─────────────────────────────────────────────────────────────

    pub fn query_selector_all(&self, scope: ElementId, selector: &SelectorList) -> Vec<ElementId> {
        self.descendants(scope)
            .into_iter()
            .filter(|&id| selector.matches(self, id, scope))
            .collect()
    }

    pub fn query_selector(&self, scope: ElementId, selector: &SelectorList) -> Option<ElementId> {
        self.descendants(scope)
            .into_iter()
            .find(|&id| selector.matches(self, id, scope))
    }

    // ── mutations ───────────────────────────────────────────────────────────

    /// Inserts `new` immediately before `reference`, reflowing the page.
    pub fn insert_before(
        &mut self,
        new: NewElement,
        reference: ElementId,
    ) -> Result<ElementId, SpacefinderError> {
        let parent = self
            .parent(reference)
            .ok_or_else(|| SpacefinderError::Dom(format!("{reference} has no parent")))?;
        let index = self
            .children(parent)
            .iter()
            .position(|&c| c == reference)
            .ok_or_else(|| SpacefinderError::Dom(format!("{reference} is detached")))?;
        let y = self.elements[reference.0].rect.top;
        Ok(self.insert_at(parent, index, new, y))
    }

    /// Appends `new` as the last child of `parent`, reflowing the page.
    pub fn append_child(
        &mut self,
        parent: ElementId,
        new: NewElement,
    ) -> Result<ElementId, SpacefinderError> {
        let el = self
            .get(parent)
            .ok_or_else(|| SpacefinderError::Dom(format!("unknown element {parent}")))?;
        let y = el
            .children
            .last()
            .and_then(|&c| self.get(c))
            .map_or(el.rect.top, |c| c.rect.bottom());
        let index = el.children.len();
        Ok(self.insert_at(parent, index, new, y))
    }

    /// Flags an image or iframe as loaded. Returns false for unknown ids.
    pub fn mark_complete(&mut self, id: ElementId) -> bool {
        match self.elements.get_mut(id.0) {
            Some(el) => {
                el.complete = true;
                true
            }
            None => false,
        }
    }

    fn insert_at(&mut self, parent: ElementId, index: usize, new: NewElement, y: f64) -> ElementId {
        if new.height > 0.0 {
            self.reflow(parent, y, new.height);
        }

        let id = ElementId(self.elements.len());
        self.elements.push(Element {
            tag: new.tag,
            id: new.id,
            classes: new.classes,
            attributes: new.attributes,
            rect: Rect {
                top: y,
                height: new.height,
            },
            loading: new.loading,
            complete: new.complete,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.elements[parent.0].children.insert(index, id);
        id
    }

    fn reflow(&mut self, parent: ElementId, y: f64, height: f64) {
        let ancestors = self.lineage(parent);
        for (i, el) in self.elements.iter_mut().enumerate() {
            if ancestors.contains(&ElementId(i)) {
                el.rect.height += height;
            } else if el.rect.top >= y {
                el.rect.top += height;
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn article() -> Document {
        Document::new(
            ElementNode::new("body").at(0.0, 2000.0).child(
                ElementNode::new("article")
                    .class("content")
                    .at(100.0, 1500.0)
                    .children([
                        ElementNode::new("p").id("first").at(100.0, 100.0),
                        ElementNode::new("h2").at(200.0, 50.0),
                        ElementNode::new("p").at(250.0, 200.0),
                    ]),
            ),
        )
    }

    #[test]
    fn test_descendants_are_in_document_order() {
        let doc = article();
        let tags: Vec<&str> = doc
            .descendants(doc.root())
            .into_iter()
            .filter_map(|id| doc.get(id))
            .map(|el| el.tag.as_str())
            .collect();
        assert_eq!(tags, vec!["article", "p", "h2", "p"]);
    }

    #[test]
    fn test_contains_is_inclusive() {
        let doc = article();
        let article = doc.children(doc.root())[0];
        let para = doc.children(article)[0];
        assert!(doc.contains(article, para));
        assert!(doc.contains(para, para));
        assert!(!doc.contains(para, article));
        assert_eq!(doc.lineage(para), vec![para, article, doc.root()]);
    }

    #[test]
    fn test_client_rect_accounts_for_scroll() {
        let mut doc = article();
        let article = doc.children(doc.root())[0];
        doc.set_scroll_y(300.0);
        let rect = doc.bounding_client_rect(article).expect("article exists");
        assert_eq!(rect.top, -200.0);
        assert_eq!(rect.height, 1500.0);
        assert!(doc.bounding_client_rect(ElementId(99)).is_none());
    }

    #[test]
    fn test_insert_before_reflows_following_content() {
        let mut doc = article();
        let article = doc.children(doc.root())[0];
        let heading = doc.children(article)[1];
        let last = doc.children(article)[2];

        let slot = doc
            .insert_before(NewElement::new("div").with_height(250.0), heading)
            .expect("insert succeeds");

        assert_eq!(doc.children(article)[1], slot);
        assert_eq!(doc.get(slot).map(|el| el.rect.top), Some(200.0));
        assert_eq!(doc.get(heading).map(|el| el.rect.top), Some(450.0));
        assert_eq!(doc.get(last).map(|el| el.rect.top), Some(500.0));
        // ancestors grow, earlier siblings stay put
        assert_eq!(doc.get(article).map(|el| el.rect.height), Some(1750.0));
        assert_eq!(doc.get(doc.root()).map(|el| el.rect.height), Some(2250.0));
        assert_eq!(doc.children(article).first().and_then(|&p| doc.get(p)).map(|el| el.rect.top), Some(100.0));
    }

    #[test]
    fn test_insert_before_root_is_an_error() {
        let mut doc = article();
        let root = doc.root();
        let err = doc
            .insert_before(NewElement::new("div"), root)
            .expect_err("root has no parent");
        assert!(matches!(err, SpacefinderError::Dom(_)));
    }

    #[test]
    fn test_append_child_lands_after_last_child() {
        let mut doc = article();
        let article = doc.children(doc.root())[0];
        let iframe = doc
            .append_child(article, NewElement::new("IFRAME").incomplete())
            .expect("append succeeds");
        let el = doc.get(iframe).expect("iframe exists");
        assert_eq!(el.tag, "iframe");
        assert_eq!(el.rect.top, 450.0);
        assert!(!el.complete);
        assert!(doc.mark_complete(iframe));
        assert_eq!(doc.get(iframe).map(|el| el.complete), Some(true));
    }

    #[test]
    fn test_fixture_loads_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(
            file,
            r#"{{
                "url": "https://example.com/story?sfdebug",
                "viewportWidth": 375,
                "root": {{ "tag": "body", "height": 900, "children": [
                    {{ "tag": "img", "top": 10, "height": 200, "complete": false, "loading": "lazy" }}
                ]}}
            }}"#
        )
        .expect("write fixture");

        let fixture = PageFixture::load(file.path()).expect("fixture parses");
        let doc = Document::from_fixture(fixture);
        assert_eq!(doc.viewport_width(), 375.0);
        assert_eq!(doc.len(), 2);
        let img = doc.get(doc.children(doc.root())[0]).expect("img");
        assert_eq!(img.loading, Loading::Lazy);
        assert!(!img.complete);
        assert_eq!(doc.document_height(), 900.0);
    }
}
