//! In-memory document model and locator evaluation.

use super::css::SelectorList;
use crate::driver::ElementInfo;
use crate::locator::{normalize_whitespace, AriaRole, Locator, Query, TextMatch};
use crate::result::ProbeResult;
use crate::wait::LoadState;
use std::collections::{BTreeMap, BTreeSet};

/// Handle to a node of a [`MockDom`]; never reused within one page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Element description used to build a [`MockDom`]
#[derive(Debug, Clone)]
pub struct MockElement {
    tag: String,
    attrs: BTreeMap<String, String>,
    text: String,
    visible: bool,
    children: Vec<MockElement>,
}

impl MockElement {
    /// Element with the given tag name
    #[must_use]
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs: BTreeMap::new(),
            text: String::new(),
            visible: true,
            children: Vec::new(),
        }
    }

    /// Set an attribute
    #[must_use]
    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Set the `id` attribute
    #[must_use]
    pub fn id(self, id: &str) -> Self {
        self.attr("id", id)
    }

    /// Add space-separated classes
    #[must_use]
    pub fn class(mut self, classes: &str) -> Self {
        let merged = match self.attrs.get("class") {
            Some(existing) => format!("{existing} {classes}"),
            None => classes.to_string(),
        };
        self.attrs.insert("class".into(), merged);
        self
    }

    /// Set an explicit ARIA role
    #[must_use]
    pub fn role(self, role: AriaRole) -> Self {
        self.attr("role", role.as_str())
    }

    /// Set the element's own text
    #[must_use]
    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    /// Render the element without a box (`display: none`)
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Mark the element disabled
    #[must_use]
    pub fn disabled(self) -> Self {
        self.attr("disabled", "")
    }

    /// Append a child
    #[must_use]
    pub fn child(mut self, child: Self) -> Self {
        self.children.push(child);
        self
    }
}

#[derive(Debug, Clone)]
struct Node {
    tag: String,
    attrs: BTreeMap<String, String>,
    text: String,
    visible: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attached: bool,
}

const NON_RENDERED: [&str; 6] = ["script", "style", "meta", "head", "title", "link"];

/// A page's document plus the navigation state the driver reports
#[derive(Debug, Clone)]
pub struct MockDom {
    url: String,
    title: String,
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
    unreached: BTreeSet<&'static str>,
}

impl MockDom {
    /// Empty document at `url`
    #[must_use]
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            title: String::new(),
            nodes: Vec::new(),
            roots: Vec::new(),
            unreached: BTreeSet::new(),
        }
    }

    /// Detach every node and start a fresh document at `url`
    pub fn reset(&mut self, url: &str) {
        for node in &mut self.nodes {
            node.attached = false;
        }
        self.roots.clear();
        self.url = url.to_string();
        self.title.clear();
        self.unreached.clear();
    }

    /// Current URL
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Change the URL without touching the document (client-side routing)
    pub fn set_url(&mut self, url: &str) {
        self.url = url.to_string();
    }

    /// Document title
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Set the document title
    pub fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
    }

    /// Mark a load milestone reached or pending
    pub fn set_load_state(&mut self, state: LoadState, reached: bool) {
        if reached {
            self.unreached.remove(state.event_name());
        } else {
            self.unreached.insert(state.event_name());
        }
    }

    /// Whether a load milestone is reached (all are, unless marked pending)
    #[must_use]
    pub fn load_state_reached(&self, state: LoadState) -> bool {
        !self.unreached.contains(state.event_name())
    }

    /// Insert an element tree under `parent` (or at the top level)
    pub fn append(&mut self, parent: Option<NodeId>, element: MockElement) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            tag: element.tag,
            attrs: element.attrs,
            text: element.text,
            visible: element.visible,
            parent,
            children: Vec::new(),
            attached: true,
        });
        match parent.and_then(|p| self.nodes.get_mut(p.0)) {
            Some(p) => p.children.push(id),
            None => self.roots.push(id),
        }
        for child in element.children {
            self.append(Some(id), child);
        }
        id
    }

    /// Detach a node and its subtree
    pub fn remove(&mut self, id: NodeId) {
        let parent = self.nodes.get(id.0).and_then(|n| n.parent);
        match parent.and_then(|p| self.nodes.get_mut(p.0)) {
            Some(p) => p.children.retain(|c| *c != id),
            None => self.roots.retain(|c| *c != id),
        }
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.attached = false;
        }
    }

    /// Show or hide a node
    pub fn set_visible(&mut self, id: NodeId, visible: bool) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.visible = visible;
        }
    }

    /// Replace a node's own text
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.text = text.to_string();
        }
    }

    /// Set an attribute
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.attrs.insert(name.to_ascii_lowercase(), value.to_string());
        }
    }

    /// Remove an attribute
    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.attrs.remove(&name.to_ascii_lowercase());
        }
    }

    /// Tag name (lowercase); empty for unknown ids
    #[must_use]
    pub fn tag(&self, id: NodeId) -> &str {
        self.nodes.get(id.0).map_or("", |n| n.tag.as_str())
    }

    /// Attribute value
    #[must_use]
    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.nodes
            .get(id.0)
            .and_then(|n| n.attrs.get(&name.to_ascii_lowercase()))
            .map(String::as_str)
    }

    /// Class list
    #[must_use]
    pub fn classes(&self, id: NodeId) -> Vec<&str> {
        self.attr(id, "class")
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default()
    }

    /// Parent node
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|n| n.parent)
    }

    fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(id.0).map_or(&[], |n| n.children.as_slice())
    }

    fn is_attached(&self, id: NodeId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            match self.nodes.get(current.0) {
                Some(node) if node.attached => cursor = node.parent,
                _ => return false,
            }
        }
        true
    }

    /// Attached, rendered, and every ancestor rendered
    #[must_use]
    pub fn is_visible(&self, id: NodeId) -> bool {
        if !self.is_attached(id) || NON_RENDERED.contains(&self.tag(id)) {
            return false;
        }
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            match self.nodes.get(current.0) {
                Some(node) if node.visible => cursor = node.parent,
                _ => return false,
            }
        }
        true
    }

    /// No `disabled` attribute and no `aria-disabled="true"`
    #[must_use]
    pub fn is_enabled(&self, id: NodeId) -> bool {
        self.attr(id, "disabled").is_none() && self.attr(id, "aria-disabled") != Some("true")
    }

    /// Whether `id` is a strict descendant of `ancestor`
    #[must_use]
    pub fn is_descendant(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut cursor = self.parent(id);
        while let Some(p) = cursor {
            if p == ancestor {
                return true;
            }
            cursor = self.parent(p);
        }
        false
    }

    /// Attached nodes in document order
    #[must_use]
    pub fn document_order(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    /// Own text plus descendant text, whitespace-normalized
    #[must_use]
    pub fn full_text(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        self.collect_text(id, &mut parts);
        normalize_whitespace(&parts.join(" "))
    }

    fn collect_text(&self, id: NodeId, parts: &mut Vec<String>) {
        if NON_RENDERED.contains(&self.tag(id)) {
            return;
        }
        if let Some(node) = self.nodes.get(id.0) {
            if !node.text.is_empty() {
                parts.push(node.text.clone());
            }
        }
        for child in self.children(id) {
            self.collect_text(*child, parts);
        }
    }

    /// Explicit `role` attribute, else the implicit role of the tag
    #[must_use]
    pub fn role(&self, id: NodeId) -> Option<AriaRole> {
        if let Some(explicit) = self.attr(id, "role") {
            return AriaRole::parse(explicit);
        }
        let input_type = self.attr(id, "type").unwrap_or("text").to_ascii_lowercase();
        match self.tag(id) {
            "button" => Some(AriaRole::Button),
            "a" if self.attr(id, "href").is_some() => Some(AriaRole::Link),
            "input" => match input_type.as_str() {
                "button" | "submit" | "reset" => Some(AriaRole::Button),
                "checkbox" => Some(AriaRole::Checkbox),
                "radio" => Some(AriaRole::Radio),
                "text" | "email" | "tel" | "search" | "url" => Some(AriaRole::Textbox),
                _ => None,
            },
            "textarea" => Some(AriaRole::Textbox),
            "select" => Some(AriaRole::Combobox),
            "option" => Some(AriaRole::Option),
            "form" => Some(AriaRole::Form),
            "dialog" => Some(AriaRole::Dialog),
            "img" => Some(AriaRole::Img),
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => Some(AriaRole::Heading),
            _ => None,
        }
    }

    fn heading_level(&self, id: NodeId) -> Option<u8> {
        if let Some(level) = self.attr(id, "aria-level").and_then(|l| l.parse().ok()) {
            return Some(level);
        }
        self.tag(id)
            .strip_prefix('h')
            .and_then(|n| n.parse().ok())
    }

    fn is_form_control(&self, id: NodeId) -> bool {
        matches!(self.tag(id), "input" | "select" | "textarea")
    }

    /// Text of the `<label>` associated by `for` or by nesting
    #[must_use]
    pub fn label_text(&self, id: NodeId) -> Option<String> {
        if let Some(control_id) = self.attr(id, "id") {
            let by_for = self
                .document_order()
                .into_iter()
                .find(|l| self.tag(*l) == "label" && self.attr(*l, "for") == Some(control_id));
            if let Some(label) = by_for {
                return Some(self.full_text(label));
            }
        }
        let mut cursor = self.parent(id);
        while let Some(p) = cursor {
            if self.tag(p) == "label" {
                return Some(self.full_text(p));
            }
            cursor = self.parent(p);
        }
        None
    }

    fn labelled_by(&self, id: NodeId) -> Option<String> {
        let target = self.attr(id, "aria-labelledby")?;
        self.document_order()
            .into_iter()
            .find(|n| self.attr(*n, "id") == Some(target))
            .map(|n| self.full_text(n))
    }

    /// Accessible name: aria-label, aria-labelledby, label, title/placeholder, content
    #[must_use]
    pub fn accessible_name(&self, id: NodeId) -> String {
        if let Some(label) = self.attr(id, "aria-label") {
            return normalize_whitespace(label);
        }
        if let Some(label) = self.labelled_by(id) {
            return label;
        }
        if self.is_form_control(id) {
            if let Some(label) = self.label_text(id) {
                return label;
            }
            if let Some(value) = self.attr(id, "title").or_else(|| self.attr(id, "placeholder")) {
                return normalize_whitespace(value);
            }
            return String::new();
        }
        if self.tag(id) == "img" {
            return self.attr(id, "alt").map(normalize_whitespace).unwrap_or_default();
        }
        self.full_text(id)
    }

    fn query_matches(&self, query: &Query, id: NodeId) -> ProbeResult<bool> {
        let matched = match query {
            Query::Role { role, name, level } => {
                self.role(id) == Some(*role)
                    && name
                        .as_ref()
                        .map_or(true, |n| n.matches(&self.accessible_name(id)))
                    && level.map_or(true, |l| self.heading_level(id) == Some(l))
            }
            Query::Text { text } => {
                !NON_RENDERED.contains(&self.tag(id))
                    && text.matches(&self.full_text(id))
                    && !self
                        .children(id)
                        .iter()
                        .any(|c| text.matches(&self.full_text(*c)))
            }
            Query::Label { text } => {
                self.attr(id, "aria-label").is_some_and(|l| text.matches(l))
                    || (self.is_form_control(id)
                        && (self.label_text(id).is_some_and(|l| text.matches(&l))
                            || self.labelled_by(id).is_some_and(|l| text.matches(&l))))
            }
            Query::Placeholder { text } => {
                self.attr(id, "placeholder").is_some_and(|p| text.matches(p))
            }
            Query::Css { selector } => SelectorList::parse(selector)?.matches(self, id),
        };
        Ok(matched)
    }

    fn text_filter(&self, filter: Option<&TextMatch>, id: NodeId, keep_on_match: bool) -> bool {
        filter.map_or(true, |f| f.matches(&self.full_text(id)) == keep_on_match)
    }

    /// Elements matching the locator, in document order
    pub fn find(&self, locator: &Locator) -> ProbeResult<Vec<NodeId>> {
        let pool: Vec<NodeId> = match &locator.within {
            Some(scope) => {
                let scopes = self.find(scope)?;
                self.document_order()
                    .into_iter()
                    .filter(|n| scopes.iter().any(|s| self.is_descendant(*n, *s)))
                    .collect()
            }
            None => self.document_order(),
        };
        let inner = match &locator.has {
            Some(child) => Some(self.find(child)?),
            None => None,
        };
        let mut out = Vec::new();
        for id in pool {
            if !self.query_matches(&locator.query, id)? {
                continue;
            }
            if !self.text_filter(locator.has_text.as_ref(), id, true)
                || !self.text_filter(locator.has_not_text.as_ref(), id, false)
            {
                continue;
            }
            if let Some(inner) = &inner {
                if !inner.iter().any(|d| self.is_descendant(*d, id)) {
                    continue;
                }
            }
            out.push(id);
        }
        Ok(out)
    }

    /// CSS convenience wrapper around [`MockDom::find`]
    pub fn select(&self, selector: &str) -> ProbeResult<Vec<NodeId>> {
        self.find(&Locator::css(selector))
    }

    /// Snapshot reported to callers of `PageDriver::query`
    #[must_use]
    pub fn info(&self, id: NodeId) -> ElementInfo {
        ElementInfo {
            text: self.full_text(id),
            visible: self.is_visible(id),
            enabled: self.is_enabled(id),
        }
    }

    /// JSON-LD script bodies
    #[must_use]
    pub fn structured_data(&self) -> Vec<String> {
        self.document_order()
            .into_iter()
            .filter(|id| {
                self.tag(*id) == "script" && self.attr(*id, "type") == Some("application/ld+json")
            })
            .filter_map(|id| self.nodes.get(id.0).map(|n| n.text.clone()))
            .collect()
    }

    /// Own texts of rendered nodes in document order
    #[must_use]
    pub fn body_texts(&self, limit: usize) -> Vec<String> {
        self.document_order()
            .into_iter()
            .filter(|id| !NON_RENDERED.contains(&self.tag(*id)))
            .filter_map(|id| self.nodes.get(id.0))
            .map(|n| normalize_whitespace(&n.text))
            .filter(|t| !t.is_empty())
            .take(limit)
            .collect()
    }
}
