//! Minimal CSS selector engine for the in-memory DOM.
//!
//! Supported: type, `.class`, `#id`, attribute selectors (`[a]`, `=`, `*=`,
//! `^=`, `$=`, `~=`, with the `i` flag), `:not(...)`, descendant and `>`
//! combinators, and comma-separated lists. Anything else is a parse error.

use super::dom::{MockDom, NodeId};
use crate::result::{ProbeError, ProbeResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals,
    Contains,
    Prefix,
    Suffix,
    Word,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrSelector {
    name: String,
    op: AttrOp,
    value: String,
    case_insensitive: bool,
}

impl AttrSelector {
    fn matches(&self, actual: Option<&str>) -> bool {
        let Some(actual) = actual else {
            return false;
        };
        let (actual, expected) = if self.case_insensitive {
            (actual.to_lowercase(), self.value.to_lowercase())
        } else {
            (actual.to_string(), self.value.clone())
        };
        match self.op {
            AttrOp::Exists => true,
            AttrOp::Equals => actual == expected,
            AttrOp::Contains => !expected.is_empty() && actual.contains(&expected),
            AttrOp::Prefix => !expected.is_empty() && actual.starts_with(&expected),
            AttrOp::Suffix => !expected.is_empty() && actual.ends_with(&expected),
            AttrOp::Word => actual.split_whitespace().any(|w| w == expected),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    ids: Vec<String>,
    classes: Vec<String>,
    attrs: Vec<AttrSelector>,
    negations: Vec<Compound>,
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none()
            && self.ids.is_empty()
            && self.classes.is_empty()
            && self.attrs.is_empty()
            && self.negations.is_empty()
    }

    fn matches(&self, dom: &MockDom, id: NodeId) -> bool {
        if let Some(tag) = &self.tag {
            if tag != "*" && !dom.tag(id).eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if !self.ids.iter().all(|want| dom.attr(id, "id") == Some(want.as_str())) {
            return false;
        }
        let classes = dom.classes(id);
        if !self.classes.iter().all(|c| classes.contains(&c.as_str())) {
            return false;
        }
        if !self.attrs.iter().all(|a| a.matches(dom.attr(id, &a.name))) {
            return false;
        }
        !self.negations.iter().any(|n| n.matches(dom, id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

/// Subject compound plus its ancestor constraints, nearest first
#[derive(Debug, Clone, PartialEq, Eq)]
struct Complex {
    subject: Compound,
    ancestors: Vec<(Combinator, Compound)>,
}

impl Complex {
    fn matches(&self, dom: &MockDom, id: NodeId) -> bool {
        self.subject.matches(dom, id) && Self::match_ancestors(dom, id, &self.ancestors)
    }

    fn match_ancestors(dom: &MockDom, id: NodeId, rest: &[(Combinator, Compound)]) -> bool {
        let Some(((combinator, compound), tail)) = rest.split_first() else {
            return true;
        };
        match combinator {
            Combinator::Child => dom
                .parent(id)
                .is_some_and(|p| compound.matches(dom, p) && Self::match_ancestors(dom, p, tail)),
            Combinator::Descendant => {
                let mut cursor = dom.parent(id);
                while let Some(p) = cursor {
                    if compound.matches(dom, p) && Self::match_ancestors(dom, p, tail) {
                        return true;
                    }
                    cursor = dom.parent(p);
                }
                false
            }
        }
    }
}

/// A parsed, comma-separated selector list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList {
    alternatives: Vec<Complex>,
}

impl SelectorList {
    /// Parse a selector list
    pub fn parse(source: &str) -> ProbeResult<Self> {
        let mut parser = Parser {
            chars: source.chars().collect(),
            pos: 0,
            source,
        };
        let list = parser.selector_list()?;
        parser.skip_ws();
        if parser.pos < parser.chars.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(list)
    }

    /// Whether the node matches any alternative
    pub fn matches(&self, dom: &MockDom, id: NodeId) -> bool {
        self.alternatives.iter().any(|c| c.matches(dom, id))
    }
}

struct Parser<'a> {
    chars: Vec<char>,
    pos: usize,
    source: &'a str,
}

impl Parser<'_> {
    fn error(&self, what: &str) -> ProbeError {
        ProbeError::page(format!(
            "invalid selector '{}' at {}: {what}",
            self.source, self.pos
        ))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn expect(&mut self, want: char) -> ProbeResult<()> {
        if self.bump() == Some(want) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{want}'")))
        }
    }

    fn ident(&mut self) -> ProbeResult<String> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '-' || c == '_')
        {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error("expected identifier"));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn selector_list(&mut self) -> ProbeResult<SelectorList> {
        let mut alternatives = vec![self.complex()?];
        loop {
            self.skip_ws();
            if self.peek() == Some(',') {
                self.pos += 1;
                alternatives.push(self.complex()?);
            } else {
                break;
            }
        }
        Ok(SelectorList { alternatives })
    }

    fn complex(&mut self) -> ProbeResult<Complex> {
        self.skip_ws();
        let mut compounds = vec![self.compound()?];
        let mut combinators = Vec::new();
        loop {
            let had_ws = self.skip_ws();
            match self.peek() {
                Some('>') => {
                    self.pos += 1;
                    self.skip_ws();
                    combinators.push(Combinator::Child);
                    compounds.push(self.compound()?);
                }
                Some(c) if had_ws && c != ',' && c != ')' => {
                    combinators.push(Combinator::Descendant);
                    compounds.push(self.compound()?);
                }
                _ => break,
            }
        }
        let subject = compounds.pop().unwrap_or_default();
        let ancestors = combinators.into_iter().rev().zip(compounds.into_iter().rev()).collect();
        Ok(Complex { subject, ancestors })
    }

    fn compound(&mut self) -> ProbeResult<Compound> {
        let mut compound = Compound::default();
        if self.peek() == Some('*') {
            self.pos += 1;
            compound.tag = Some("*".into());
        } else if self.peek().is_some_and(char::is_alphabetic) {
            compound.tag = Some(self.ident()?.to_ascii_lowercase());
        }
        loop {
            match self.peek() {
                Some('.') => {
                    self.pos += 1;
                    compound.classes.push(self.ident()?);
                }
                Some('#') => {
                    self.pos += 1;
                    compound.ids.push(self.ident()?);
                }
                Some('[') => {
                    self.pos += 1;
                    compound.attrs.push(self.attribute()?);
                }
                Some(':') => {
                    self.pos += 1;
                    let name = self.ident()?;
                    if name != "not" {
                        return Err(self.error(&format!("unsupported pseudo-class :{name}")));
                    }
                    self.expect('(')?;
                    loop {
                        self.skip_ws();
                        compound.negations.push(self.compound()?);
                        self.skip_ws();
                        if self.peek() == Some(',') {
                            self.pos += 1;
                        } else {
                            break;
                        }
                    }
                    self.expect(')')?;
                }
                _ => break,
            }
        }
        if compound.is_empty() {
            return Err(self.error("empty compound selector"));
        }
        Ok(compound)
    }

    fn attribute(&mut self) -> ProbeResult<AttrSelector> {
        self.skip_ws();
        let name = self.ident()?.to_ascii_lowercase();
        self.skip_ws();
        let op = match self.peek() {
            Some(']') => {
                self.pos += 1;
                return Ok(AttrSelector {
                    name,
                    op: AttrOp::Exists,
                    value: String::new(),
                    case_insensitive: false,
                });
            }
            Some('=') => AttrOp::Equals,
            Some('*') => AttrOp::Contains,
            Some('^') => AttrOp::Prefix,
            Some('$') => AttrOp::Suffix,
            Some('~') => AttrOp::Word,
            _ => return Err(self.error("expected attribute operator")),
        };
        self.pos += 1;
        if op != AttrOp::Equals {
            self.expect('=')?;
        }
        self.skip_ws();
        let value = match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let start = self.pos;
                while self.peek().is_some_and(|c| c != quote) {
                    self.pos += 1;
                }
                let value: String = self.chars[start..self.pos].iter().collect();
                self.expect(quote)?;
                value
            }
            _ => self.ident()?,
        };
        self.skip_ws();
        let case_insensitive = if matches!(self.peek(), Some('i' | 'I')) {
            self.pos += 1;
            self.skip_ws();
            true
        } else {
            false
        };
        self.expect(']')?;
        Ok(AttrSelector {
            name,
            op,
            value,
            case_insensitive,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::mock::dom::MockElement;

    fn sample() -> (MockDom, NodeId, NodeId, NodeId) {
        let mut dom = MockDom::new("https://shop.test/");
        let main = dom.append(None, MockElement::new("main").id("content"));
        let card = dom.append(
            Some(main),
            MockElement::new("a").class("CGtC98 tile").attr("href", "/samsung-m14/p/itm1"),
        );
        let radio = dom.append(
            None,
            MockElement::new("div").attr("role", "radio").attr("aria-disabled", "true"),
        );
        (dom, main, card, radio)
    }

    #[test]
    fn test_class_and_attribute_contains() {
        let (dom, _, card, _) = sample();
        let sel = SelectorList::parse(r#"a[href*="/p/"].tile"#).unwrap();
        assert!(sel.matches(&dom, card));
    }

    #[test]
    fn test_child_and_descendant_combinators() {
        let (dom, main, card, _) = sample();
        assert!(SelectorList::parse("main > a").unwrap().matches(&dom, card));
        assert!(SelectorList::parse("#content a").unwrap().matches(&dom, card));
        assert!(!SelectorList::parse("div a").unwrap().matches(&dom, card));
        assert!(!SelectorList::parse("main > a").unwrap().matches(&dom, main));
    }

    #[test]
    fn test_not_with_attribute() {
        let (dom, _, _, radio) = sample();
        let sel = SelectorList::parse(r#"[role="radio"]:not([aria-disabled="true"])"#).unwrap();
        assert!(!sel.matches(&dom, radio));
        assert!(SelectorList::parse(r#"[role="radio"]"#).unwrap().matches(&dom, radio));
    }

    #[test]
    fn test_case_insensitive_flag() {
        let mut dom = MockDom::new("https://shop.test/");
        let input = dom.append(None, MockElement::new("input").attr("name", "OTP-code"));
        assert!(SelectorList::parse(r#"input[name*="otp" i]"#).unwrap().matches(&dom, input));
        assert!(!SelectorList::parse(r#"input[name*="otp"]"#).unwrap().matches(&dom, input));
    }

    #[test]
    fn test_selector_list() {
        let (dom, _, card, radio) = sample();
        let sel = SelectorList::parse("span.B_NuCI, a.tile").unwrap();
        assert!(sel.matches(&dom, card));
        assert!(!sel.matches(&dom, radio));
    }

    #[test]
    fn test_parse_errors() {
        assert!(SelectorList::parse("").is_err());
        assert!(SelectorList::parse("a:has(b)").is_err());
        assert!(SelectorList::parse("a[href").is_err());
    }
}
