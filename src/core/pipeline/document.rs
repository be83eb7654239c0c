//! Mutable document tree used by the step runner.
//!
//! Mutations never touch the parsed tree in place. Actions describe their changes as an
//! [`EditPlan`]; the document serializes itself with the plan spliced in and reparses the
//! result. This serialize -> rewrite -> reparse boundary is the only way the tree changes,
//! so textual side effects (attribute order, residual whitespace) stay observable to later
//! regex-based actions exactly as the markup reads.

use crate::core::error::ActionError;
use ego_tree::{NodeId, NodeRef};
use scraper::node::Element;
use scraper::{Html, Node, Selector};
use std::collections::{HashMap, HashSet};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "basefont", "bgsound", "br", "col", "embed", "frame", "hr", "img", "input",
    "keygen", "link", "meta", "param", "source", "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &[
    "style", "script", "xmp", "iframe", "noembed", "noframes", "plaintext", "noscript",
];

const PREFORMATTED_ELEMENTS: &[&str] = &["pre", "textarea", "listing"];

const INLINE_ELEMENTS: &[&str] = &[
    "a", "abbr", "acronym", "b", "bdi", "bdo", "big", "br", "button", "cite", "code", "data",
    "del", "dfn", "em", "font", "i", "img", "amp-img", "input", "ins", "kbd", "label", "mark",
    "q", "s", "samp", "select", "option", "small", "span", "strike", "strong", "sub", "sup",
    "time", "title", "tt", "u", "var", "wbr",
];

/// Pending attribute change recorded in an [`EditPlan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeEdit {
    Set(String, String),
    Remove(String),
}

/// Set of changes applied to a [`Document`] in one serialize/reparse pass.
#[derive(Debug, Default)]
pub struct EditPlan {
    inner: HashMap<NodeId, String>,
    append: HashMap<NodeId, Vec<String>>,
    after: HashMap<NodeId, Vec<String>>,
    attributes: HashMap<NodeId, Vec<AttributeEdit>>,
    removed: HashSet<NodeId>,
    document: Option<String>,
}

impl EditPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the children of `id` with raw markup.
    pub fn set_inner(&mut self, id: NodeId, markup: String) {
        self.inner.insert(id, markup);
    }

    /// Append raw markup after the existing children of `id`.
    pub fn append_markup(&mut self, id: NodeId, markup: String) {
        self.append.entry(id).or_default().push(markup);
    }

    /// Emit raw markup directly after the end tag of `id`.
    pub fn insert_after(&mut self, id: NodeId, markup: String) {
        self.after.entry(id).or_default().push(markup);
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) {
        self.attributes
            .entry(id)
            .or_default()
            .push(AttributeEdit::Set(name.to_ascii_lowercase(), value.to_string()));
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) {
        self.attributes
            .entry(id)
            .or_default()
            .push(AttributeEdit::Remove(name.to_string()));
    }

    /// Drop `id` and its subtree from the serialized output.
    pub fn detach(&mut self, id: NodeId) {
        self.removed.insert(id);
    }

    /// Replace the whole document with new markup. Takes precedence over node edits.
    pub fn replace_document(&mut self, markup: String) {
        self.document = Some(markup);
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
            && self.append.is_empty()
            && self.after.is_empty()
            && self.attributes.is_empty()
            && self.removed.is_empty()
            && self.document.is_none()
    }
}

/// Parsed HTML document owned by one pipeline run.
pub struct Document {
    html: Html,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("html", &self.to_html())
            .finish()
    }
}

impl Document {
    pub fn parse(markup: &str) -> Self {
        Self {
            html: Html::parse_document(markup),
        }
    }

    /// All elements matching `selector`, in document order.
    pub fn select(&self, selector: &str) -> Result<Vec<NodeId>, ActionError> {
        let parsed = parse_selector(selector)?;
        Ok(self.html.select(&parsed).map(|element| element.id()).collect())
    }

    /// First element matching `selector`.
    pub fn select_first(&self, selector: &str) -> Result<Option<NodeId>, ActionError> {
        let parsed = parse_selector(selector)?;
        Ok(self.html.select(&parsed).next().map(|element| element.id()))
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|element| element.name())
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|element| element.attr(name))
    }

    /// Elements below `id`, including `id` itself.
    pub fn descendant_elements(&self, id: NodeId) -> Vec<&Element> {
        match self.html.tree.get(id) {
            Some(node) => node
                .descendants()
                .filter_map(|descendant| match descendant.value() {
                    Node::Element(element) => Some(element),
                    _ => None,
                })
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn inner_html(&self, id: NodeId) -> String {
        let mut writer = MarkupWriter::new(None);
        if let Some(node) = self.html.tree.get(id) {
            let raw = node_name(node).is_some_and(is_raw_text);
            for child in node.children() {
                writer.write_node(child, raw);
            }
        }
        writer.finish()
    }

    pub fn outer_html(&self, id: NodeId) -> String {
        let mut writer = MarkupWriter::new(None);
        if let Some(node) = self.html.tree.get(id) {
            writer.write_node(node, false);
        }
        writer.finish()
    }

    /// Outer markup of `id` with its children replaced by `inner`.
    pub fn outer_html_with_inner(&self, id: NodeId, inner: &str) -> String {
        let mut plan = EditPlan::new();
        plan.set_inner(id, inner.to_string());
        let mut writer = MarkupWriter::new(Some(&plan));
        if let Some(node) = self.html.tree.get(id) {
            writer.write_node(node, false);
        }
        writer.finish()
    }

    /// Compact serialization of the whole document.
    pub fn to_html(&self) -> String {
        let mut writer = MarkupWriter::new(None);
        writer.write_node(self.html.tree.root(), false);
        writer.finish()
    }

    /// Canonical indented form: two-space indentation, one block element per line,
    /// raw text and inline-only content left on a single line.
    pub fn to_pretty_html(&self) -> String {
        let mut out = String::from("<!DOCTYPE html>\n");
        for child in self.html.tree.root().children() {
            pretty_node(child, 0, &mut out);
        }
        while out.ends_with('\n') {
            out.pop();
        }
        out
    }

    /// Apply `plan` by serializing with the edits spliced in, then reparsing.
    pub fn apply(&mut self, plan: EditPlan) {
        if plan.is_empty() {
            return;
        }
        let markup = match plan.document {
            Some(ref markup) => markup.clone(),
            None => {
                let mut writer = MarkupWriter::new(Some(&plan));
                writer.write_node(self.html.tree.root(), false);
                writer.finish()
            }
        };
        self.html = Html::parse_document(&markup);
    }

    /// Reformat to canonical indentation and reparse. Returns the formatted markup.
    pub fn reformat(&mut self) -> String {
        let pretty = self.to_pretty_html();
        self.html = Html::parse_document(&pretty);
        pretty
    }

    fn element(&self, id: NodeId) -> Option<&Element> {
        self.html.tree.get(id).and_then(|node| match node.value() {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }
}

fn parse_selector(selector: &str) -> Result<Selector, ActionError> {
    Selector::parse(selector).map_err(|err| ActionError::InvalidSelector {
        selector: selector.to_string(),
        reason: format!("{:?}", err),
    })
}

fn node_name<'a>(node: NodeRef<'a, Node>) -> Option<&'a str> {
    match node.value() {
        Node::Element(element) => Some(element.name()),
        _ => None,
    }
}

fn is_void(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name)
}

fn is_raw_text(name: &str) -> bool {
    RAW_TEXT_ELEMENTS.contains(&name)
}

struct MarkupWriter<'p> {
    out: String,
    plan: Option<&'p EditPlan>,
}

impl<'p> MarkupWriter<'p> {
    fn new(plan: Option<&'p EditPlan>) -> Self {
        Self {
            out: String::new(),
            plan,
        }
    }

    fn finish(self) -> String {
        self.out
    }

    fn write_node(&mut self, node: NodeRef<'_, Node>, raw_parent: bool) {
        match node.value() {
            Node::Document | Node::Fragment => {
                for child in node.children() {
                    self.write_node(child, false);
                }
            }
            Node::Doctype(doctype) => {
                self.out.push_str("<!DOCTYPE ");
                self.out.push_str(doctype.name());
                self.out.push('>');
            }
            Node::Comment(comment) => {
                self.out.push_str("<!--");
                self.out.push_str(comment);
                self.out.push_str("-->");
            }
            Node::Text(text) => {
                if raw_parent {
                    self.out.push_str(text);
                } else {
                    escape_text(text, &mut self.out);
                }
            }
            Node::ProcessingInstruction(instruction) => {
                self.out.push_str("<?");
                self.out.push_str(&instruction.target);
                self.out.push(' ');
                self.out.push_str(&instruction.data);
                self.out.push('>');
            }
            Node::Element(element) => self.write_element(node, element),
        }
    }

    fn write_element(&mut self, node: NodeRef<'_, Node>, element: &Element) {
        let id = node.id();
        let plan = self.plan;
        if plan.is_some_and(|plan| plan.removed.contains(&id)) {
            return;
        }
        let name = element.name();
        let edits = plan.and_then(|plan| plan.attributes.get(&id));
        write_start_tag(element, edits.map(Vec::as_slice), &mut self.out);

        if !is_void(name) {
            match plan.and_then(|plan| plan.inner.get(&id)) {
                Some(inner) => self.out.push_str(inner),
                None => {
                    let raw = is_raw_text(name);
                    for child in node.children() {
                        self.write_node(child, raw);
                    }
                }
            }
            if let Some(appended) = plan.and_then(|plan| plan.append.get(&id)) {
                for markup in appended {
                    self.out.push_str(markup);
                }
            }
            self.out.push_str("</");
            self.out.push_str(name);
            self.out.push('>');
        }

        if let Some(following) = plan.and_then(|plan| plan.after.get(&id)) {
            for markup in following {
                self.out.push_str(markup);
            }
        }
    }
}

fn write_start_tag(element: &Element, edits: Option<&[AttributeEdit]>, out: &mut String) {
    let mut attributes: Vec<(String, String)> = element
        .attrs()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();
    for edit in edits.unwrap_or_default() {
        match edit {
            AttributeEdit::Set(name, value) => {
                match attributes
                    .iter_mut()
                    .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
                {
                    Some(slot) => slot.1 = value.clone(),
                    None => attributes.push((name.clone(), value.clone())),
                }
            }
            AttributeEdit::Remove(name) => {
                attributes.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
            }
        }
    }

    out.push('<');
    out.push_str(element.name());
    for (name, value) in &attributes {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        escape_attribute(value, out);
        out.push('"');
    }
    out.push('>');
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

/// Escape a value for use inside a double-quoted attribute.
pub fn escape_attribute(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

fn push_line(depth: usize, content: &str, out: &mut String) {
    for _ in 0..depth {
        out.push_str("  ");
    }
    out.push_str(content);
    out.push('\n');
}

fn compact_children(node: NodeRef<'_, Node>, raw: bool) -> String {
    let mut writer = MarkupWriter::new(None);
    for child in node.children() {
        writer.write_node(child, raw);
    }
    writer.finish()
}

fn has_inline_content(node: NodeRef<'_, Node>) -> bool {
    node.children().all(|child| match child.value() {
        Node::Text(_) | Node::Comment(_) => true,
        Node::Element(element) => {
            INLINE_ELEMENTS.contains(&element.name()) && has_inline_content(child)
        }
        _ => false,
    })
}

fn pretty_node(node: NodeRef<'_, Node>, depth: usize, out: &mut String) {
    match node.value() {
        Node::Document | Node::Fragment => {
            for child in node.children() {
                pretty_node(child, depth, out);
            }
        }
        Node::Doctype(_) | Node::ProcessingInstruction(_) => {}
        Node::Comment(comment) => push_line(depth, &format!("<!--{}-->", &**comment), out),
        Node::Text(text) => {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                let mut escaped = String::new();
                escape_text(trimmed, &mut escaped);
                push_line(depth, &escaped, out);
            }
        }
        Node::Element(element) => {
            let name = element.name();
            let mut open = String::new();
            write_start_tag(element, None, &mut open);
            if is_void(name) {
                push_line(depth, &open, out);
                return;
            }
            let close = format!("</{}>", name);
            if is_raw_text(name) || PREFORMATTED_ELEMENTS.contains(&name) {
                let body = compact_children(node, is_raw_text(name));
                push_line(depth, &format!("{}{}{}", open, body, close), out);
            } else if has_inline_content(node) {
                let body = compact_children(node, false);
                push_line(depth, &format!("{}{}{}", open, body.trim(), close), out);
            } else {
                push_line(depth, &open, out);
                for child in node.children() {
                    pretty_node(child, depth + 1, out);
                }
                push_line(depth, &close, out);
            }
        }
    }
}
