//! CSS selector subset used by placement rule sets.
//!
//! Supported: type and universal selectors, `#id`, `.class`, attribute selectors
//! (`[a]`, `[a=v]`, `[a~=v]`, `[a^=v]`, `[a$=v]`, `[a*=v]`), `:scope`, `:not(...)`
//! over a list of compound selectors, descendant and child combinators, and
//! comma-separated lists. A selector that starts with `>` is relative to the
//! search scope (`> p` ≡ `:scope > p`).

use crate::dom::document::{Document, ElementId};
use crate::errors::SpacefinderError;

#[derive(Debug, Clone, PartialEq)]
pub struct SelectorList {
    source: String,
    selectors: Vec<ComplexSelector>,
}

#[derive(Debug, Clone, PartialEq)]
struct ComplexSelector {
    /// Left to right. `combinators[i]` sits between `compounds[i]` and `compounds[i + 1]`.
    compounds: Vec<Compound>,
    combinators: Vec<Combinator>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Compound {
    tag: Option<String>,
    universal: bool,
    simple: Vec<Simple>,
}

#[derive(Debug, Clone, PartialEq)]
enum Simple {
    Id(String),
    Class(String),
    Attribute {
        name: String,
        test: Option<(AttrOp, String)>,
    },
    Scope,
    /// Matches when none of the compounds match.
    Not(Vec<Compound>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum AttrOp {
    Equals,
    Includes,
    Prefix,
    Suffix,
    Substring,
}

impl SelectorList {
    pub fn parse(source: &str) -> Result<Self, SpacefinderError> {
        let mut parser = Parser::new(source);
        let selectors = parser.parse_list()?;
        Ok(Self {
            source: source.to_string(),
            selectors,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// True if `id` matches any selector in the list, with `scope` bound to `:scope`.
    pub fn matches(&self, doc: &Document, id: ElementId, scope: ElementId) -> bool {
        self.selectors
            .iter()
            .any(|sel| sel.matches_at(doc, id, scope, sel.compounds.len() - 1))
    }
}

impl ComplexSelector {
    fn matches_at(&self, doc: &Document, id: ElementId, scope: ElementId, index: usize) -> bool {
        if !self.compounds[index].matches(doc, id, scope) {
            return false;
        }
        if index == 0 {
            return true;
        }

        match self.combinators[index - 1] {
            Combinator::Child => doc
                .parent(id)
                .is_some_and(|parent| self.matches_at(doc, parent, scope, index - 1)),
            Combinator::Descendant => {
                let mut current = doc.parent(id);
                while let Some(ancestor) = current {
                    if self.matches_at(doc, ancestor, scope, index - 1) {
                        return true;
                    }
                    current = doc.parent(ancestor);
                }
                false
            }
        }
    }
}

impl Compound {
    fn matches(&self, doc: &Document, id: ElementId, scope: ElementId) -> bool {
        let Some(el) = doc.get(id) else {
            return false;
        };
        if let Some(tag) = &self.tag {
            if *tag != el.tag {
                return false;
            }
        }

        self.simple.iter().all(|simple| match simple {
            Simple::Id(value) => el.id.as_deref() == Some(value.as_str()),
            Simple::Class(class) => el.has_class(class),
            Simple::Scope => id == scope,
            Simple::Not(excluded) => !excluded.iter().any(|c| c.matches(doc, id, scope)),
            Simple::Attribute { name, test } => {
                let actual = if name == "class" {
                    (!el.classes.is_empty()).then(|| el.classes.join(" "))
                } else {
                    el.attribute(name).map(str::to_string)
                };
                match (actual, test) {
                    (None, _) => false,
                    (Some(_), None) => true,
                    (Some(actual), Some((op, expected))) => match op {
                        AttrOp::Equals => actual == *expected,
                        AttrOp::Includes => actual.split_whitespace().any(|w| w == expected.as_str()),
                        AttrOp::Prefix => !expected.is_empty() && actual.starts_with(expected.as_str()),
                        AttrOp::Suffix => !expected.is_empty() && actual.ends_with(expected.as_str()),
                        AttrOp::Substring => !expected.is_empty() && actual.contains(expected.as_str()),
                    },
                }
            }
        })
    }

    fn is_empty(&self) -> bool {
        self.tag.is_none() && !self.universal && self.simple.is_empty()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Parser
// ────────────────────────────────────────────────────────────────────────────

struct Parser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, reason: impl Into<String>) -> SpacefinderError {
        SpacefinderError::InvalidSelector {
            selector: self.source.to_string(),
            reason: reason.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    /// Returns true if any whitespace was consumed.
    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn parse_list(&mut self) -> Result<Vec<ComplexSelector>, SpacefinderError> {
        let mut selectors = vec![self.parse_complex()?];
        while self.peek() == Some(',') {
            self.bump();
            selectors.push(self.parse_complex()?);
        }
        if let Some(c) = self.peek() {
            return Err(self.error(format!("unexpected '{c}' at {}", self.pos)));
        }
        Ok(selectors)
    }

    fn parse_complex(&mut self) -> Result<ComplexSelector, SpacefinderError> {
        self.skip_whitespace();
        let mut compounds = Vec::new();
        let mut combinators = Vec::new();

        if self.peek() == Some('>') {
            self.bump();
            self.skip_whitespace();
            compounds.push(Compound {
                simple: vec![Simple::Scope],
                ..Compound::default()
            });
            combinators.push(Combinator::Child);
        }

        loop {
            let compound = self.parse_compound()?;
            if compound.is_empty() {
                return Err(match self.peek() {
                    Some(c) => self.error(format!("unexpected '{c}' at {}", self.pos)),
                    None => self.error("expected a selector"),
                });
            }
            compounds.push(compound);

            let had_space = self.skip_whitespace();
            match self.peek() {
                None | Some(',') => break,
                Some('>') => {
                    self.bump();
                    self.skip_whitespace();
                    combinators.push(Combinator::Child);
                }
                Some(_) if had_space => combinators.push(Combinator::Descendant),
                Some(c) => return Err(self.error(format!("unexpected '{c}' at {}", self.pos))),
            }
        }

        Ok(ComplexSelector {
            compounds,
            combinators,
        })
    }

    fn parse_compound(&mut self) -> Result<Compound, SpacefinderError> {
        let mut compound = Compound::default();

        match self.peek() {
            Some('*') => {
                self.bump();
                compound.universal = true;
            }
            Some(c) if is_ident_start(c) => {
                compound.tag = Some(self.parse_ident()?.to_ascii_lowercase());
            }
            _ => {}
        }

        loop {
            match self.peek() {
                Some('#') => {
                    self.bump();
                    compound.simple.push(Simple::Id(self.parse_ident()?));
                }
                Some('.') => {
                    self.bump();
                    compound.simple.push(Simple::Class(self.parse_ident()?));
                }
                Some('[') => {
                    self.bump();
                    compound.simple.push(self.parse_attribute()?);
                }
                Some(':') => {
                    self.bump();
                    let pseudo = self.parse_ident()?;
                    match pseudo.as_str() {
                        "scope" => compound.simple.push(Simple::Scope),
                        "not" => compound.simple.push(self.parse_negation()?),
                        _ => return Err(self.error(format!("unsupported pseudo-class ':{pseudo}'"))),
                    }
                }
                _ => break,
            }
        }
        Ok(compound)
    }

    /// `:not(` has been consumed up to the parenthesis.
    fn parse_negation(&mut self) -> Result<Simple, SpacefinderError> {
        if self.bump() != Some('(') {
            return Err(self.error("expected '(' after ':not'"));
        }
        let mut excluded = Vec::new();
        loop {
            self.skip_whitespace();
            let compound = self.parse_compound()?;
            if compound.is_empty() {
                return Err(self.error("expected a selector inside ':not()'"));
            }
            excluded.push(compound);
            self.skip_whitespace();
            match self.bump() {
                Some(',') => continue,
                Some(')') => break,
                Some(c) => return Err(self.error(format!("unexpected '{c}' inside ':not()'"))),
                None => return Err(self.error("unterminated ':not()'")),
            }
        }
        Ok(Simple::Not(excluded))
    }

    fn parse_attribute(&mut self) -> Result<Simple, SpacefinderError> {
        self.skip_whitespace();
        let name = self.parse_ident()?.to_ascii_lowercase();
        self.skip_whitespace();

        let op = match self.peek() {
            Some(']') => {
                self.bump();
                return Ok(Simple::Attribute { name, test: None });
            }
            Some('=') => AttrOp::Equals,
            Some('~') => AttrOp::Includes,
            Some('^') => AttrOp::Prefix,
            Some('$') => AttrOp::Suffix,
            Some('*') => AttrOp::Substring,
            Some(c) => return Err(self.error(format!("unexpected '{c}' in attribute selector"))),
            None => return Err(self.error("unterminated attribute selector")),
        };
        self.bump();
        if op != AttrOp::Equals && self.bump() != Some('=') {
            return Err(self.error("expected '=' in attribute selector"));
        }
        self.skip_whitespace();

        let value = match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.bump();
                let mut value = String::new();
                loop {
                    match self.bump() {
                        Some(c) if c == quote => break,
                        Some(c) => value.push(c),
                        None => return Err(self.error("unterminated string")),
                    }
                }
                value
            }
            _ => self.parse_ident()?,
        };

        self.skip_whitespace();
        if self.bump() != Some(']') {
            return Err(self.error("expected ']'"));
        }
        Ok(Simple::Attribute {
            name,
            test: Some((op, value)),
        })
    }

    fn parse_ident(&mut self) -> Result<String, SpacefinderError> {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_char) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(match self.peek() {
                Some(c) => self.error(format!("expected identifier, found '{c}'")),
                None => self.error("expected identifier"),
            });
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '-'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::document::ElementNode;

    fn page() -> Document {
        Document::new(
            ElementNode::new("body").child(
                ElementNode::new("div")
                    .class("js-article__body")
                    .attr("data-component", "body")
                    .children([
                        ElementNode::new("p").id("lede"),
                        ElementNode::new("h2"),
                        ElementNode::new("aside")
                            .class("element-rich-link")
                            .class("element--thumbnail")
                            .child(ElementNode::new("p").class("nested")),
                        ElementNode::new("figure")
                            .class("element-interactive")
                            .attr("data-spacefinder-role", "inline"),
                    ]),
            ),
        )
    }

    fn body(doc: &Document) -> ElementId {
        doc.children(doc.root())[0]
    }

    fn select(doc: &Document, scope: ElementId, selector: &str) -> Vec<ElementId> {
        let list = SelectorList::parse(selector).expect("valid selector");
        doc.query_selector_all(scope, &list)
    }

    #[test]
    fn test_type_and_descendant_selectors() {
        let doc = page();
        assert_eq!(select(&doc, doc.root(), "p").len(), 2);
        assert_eq!(select(&doc, doc.root(), "aside p").len(), 1);
        assert_eq!(select(&doc, doc.root(), "body p").len(), 2);
    }

    #[test]
    fn test_leading_child_combinator_is_scope_relative() {
        let doc = page();
        let scope = body(&doc);
        let direct = select(&doc, scope, " > p");
        assert_eq!(direct.len(), 1);
        assert_eq!(doc.get(direct[0]).and_then(|el| el.id.clone()), Some("lede".to_string()));
        assert_eq!(select(&doc, scope, ":scope > p"), direct);
        // the root is not the scope, so nothing is a direct child of it here
        assert!(select(&doc, doc.root(), "> p").is_empty());
    }

    #[test]
    fn test_class_id_and_universal() {
        let doc = page();
        assert_eq!(select(&doc, doc.root(), ".element-rich-link.element--thumbnail").len(), 1);
        assert_eq!(select(&doc, doc.root(), "#lede").len(), 1);
        assert_eq!(select(&doc, doc.root(), "p#lede").len(), 1);
        assert_eq!(select(&doc, doc.root(), "h2#lede").len(), 0);
        assert_eq!(select(&doc, doc.root(), "*").len(), doc.len() - 1);
        assert_eq!(select(&doc, body(&doc), "> *").len(), 4);
    }

    #[test]
    fn test_attribute_operators() {
        let doc = page();
        let root = doc.root();
        assert_eq!(select(&doc, root, "[data-spacefinder-role]").len(), 1);
        assert_eq!(select(&doc, root, "[data-spacefinder-role=\"inline\"]").len(), 1);
        assert_eq!(select(&doc, root, "[data-spacefinder-role='immersive']").len(), 0);
        assert_eq!(select(&doc, root, "[data-component^=bo]").len(), 1);
        assert_eq!(select(&doc, root, "[data-component$=dy]").len(), 1);
        assert_eq!(select(&doc, root, "[data-component*=od]").len(), 1);
        assert_eq!(select(&doc, root, "[class~=element--thumbnail]").len(), 1);
    }

    #[test]
    fn test_selector_list_unions_matches() {
        let doc = page();
        assert_eq!(select(&doc, doc.root(), "h2, .element-interactive").len(), 2);
    }

    #[test]
    fn test_element_matches() {
        let doc = page();
        let lede = select(&doc, doc.root(), "#lede")[0];
        let list = SelectorList::parse(".js-article__body > p").expect("valid");
        assert!(list.matches(&doc, lede, doc.root()));
        let list = SelectorList::parse("aside > p").expect("valid");
        assert!(!list.matches(&doc, lede, doc.root()));
    }

    #[test]
    fn test_negation_excludes_listed_compounds() {
        let doc = page();
        let scope = body(&doc);
        let others = select(&doc, scope, " > :not(p):not(h2)");
        assert_eq!(others.len(), 2);
        assert!(others
            .iter()
            .all(|&id| doc.get(id).is_some_and(|el| el.tag == "aside" || el.tag == "figure")));

        assert_eq!(select(&doc, scope, "> :not(.element-rich-link, h2)").len(), 2);
        assert_eq!(select(&doc, doc.root(), "p:not(.nested)").len(), 1);
        assert_eq!(select(&doc, doc.root(), "p:not( [id] )").len(), 1);
        assert!(select(&doc, scope, "> :not(*)").is_empty());
    }

    #[test]
    fn test_invalid_selectors_are_rejected() {
        for bad in [
            "", "p >", "[data-x", "p:first-child", ".", "p,", "a ! b", "[a|=b]",
            ":not", ":not()", ":not(p", ":not(aside p)", "p:not(:first-child)",
        ] {
            let err = SelectorList::parse(bad).expect_err(bad);
            assert!(
                matches!(err, SpacefinderError::InvalidSelector { .. }),
                "{bad} should be invalid"
            );
        }
    }
}
