// Render tree the placement search runs against.
// All reads and writes from async code go through `Page` (the layout scheduler).

pub mod document;
pub mod page;
pub mod selector;

pub use document::{Document, Element, ElementId, ElementNode, Loading, NewElement, PageFixture, Rect};
pub use page::Page;
pub use selector::SelectorList;
