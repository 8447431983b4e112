//! In-memory [`Document`] implementation.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. The document is
//! built programmatically; layout-dependent values (rects, natural sizes,
//! computed backgrounds) are supplied by the caller rather than computed.

use std::collections::HashMap;

use skopeo_types::{Dimensions, Rect};
use url::Url;

use crate::platform::{Document, LookupError};

mod selector;
mod xpath;

pub use selector::SelectorList;
pub use xpath::XPathExpr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
enum NodeData {
    Document,
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone)]
struct ElementData {
    tag: String,
    attrs: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data: NodeData,
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

#[derive(Debug, Clone)]
pub struct MemoryDocument {
    nodes: Vec<Node>,
    base_url: Option<Url>,
    styles: Vec<String>,
    scrolled: Vec<NodeId>,
    rects: HashMap<NodeId, Rect>,
    natural_sizes: HashMap<NodeId, Dimensions>,
    backgrounds: HashMap<NodeId, String>,
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocument {
    /// Creates `<html><head></head><body></body></html>`.
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                data: NodeData::Document,
            }],
            base_url: None,
            styles: Vec::new(),
            scrolled: Vec::new(),
            rects: HashMap::new(),
            natural_sizes: HashMap::new(),
            backgrounds: HashMap::new(),
        };
        let html = doc.append_element(doc.root(), "html", &[]);
        doc.append_element(html, "head", &[]);
        doc.append_element(html, "body", &[]);
        doc
    }

    /// Relative `src` attributes resolve against this URL.
    pub fn with_base_url(mut self, base: &str) -> Self {
        self.base_url = Url::parse(base).ok();
        self
    }

    /// The document node itself (parent of `<html>`).
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn html(&self) -> NodeId {
        self.nodes[0]
            .children
            .iter()
            .copied()
            .find(|id| self.is_element(*id))
            .unwrap_or(NodeId(0))
    }

    pub fn head(&self) -> NodeId {
        self.child_by_tag(self.html(), "head").unwrap_or_else(|| self.html())
    }

    pub fn body(&self) -> NodeId {
        self.child_by_tag(self.html(), "body").unwrap_or_else(|| self.html())
    }

    fn child_by_tag(&self, parent: NodeId, tag: &str) -> Option<NodeId> {
        self.nodes[parent.0]
            .children
            .iter()
            .copied()
            .find(|id| self.tag(*id) == Some(tag))
    }

    fn push_node(&mut self, parent: NodeId, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: Some(parent),
            children: Vec::new(),
            data,
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn append_element(&mut self, parent: NodeId, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        self.push_node(
            parent,
            NodeData::Element(ElementData {
                tag: tag.to_ascii_lowercase(),
                attrs: attrs
                    .iter()
                    .map(|(name, value)| (name.to_ascii_lowercase(), value.to_string()))
                    .collect(),
            }),
        )
    }

    pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        self.push_node(parent, NodeData::Text(text.to_string()))
    }

    /// Detaches `node` (and its subtree) from its parent.
    pub fn remove(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|child| *child != node);
        }
    }

    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        let Some(element) = self.element_mut(node) else {
            return;
        };
        let name = name.to_ascii_lowercase();
        match element.attrs.iter_mut().find(|(key, _)| *key == name) {
            Some((_, existing)) => *existing = value.to_string(),
            None => element.attrs.push((name, value.to_string())),
        }
    }

    pub fn remove_attribute(&mut self, node: NodeId, name: &str) {
        if let Some(element) = self.element_mut(node) {
            element.attrs.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
        }
    }

    pub fn set_rect(&mut self, node: NodeId, rect: Rect) {
        self.rects.insert(node, rect);
    }

    pub fn set_natural_size(&mut self, node: NodeId, width: u32, height: u32) {
        self.natural_sizes.insert(node, Dimensions { width, height });
    }

    /// Sets the computed `background-image` value, e.g. `url("a.png")`.
    pub fn set_background_image(&mut self, node: NodeId, value: &str) {
        self.backgrounds.insert(node, value.to_string());
    }

    pub fn injected_styles(&self) -> &[String] {
        &self.styles
    }

    pub fn scrolled(&self) -> &[NodeId] {
        &self.scrolled
    }

    /// `document.querySelector`.
    pub fn select_first(&self, selector: &str) -> Result<Option<NodeId>, LookupError> {
        self.query_selector(&self.root(), selector)
    }

    pub fn select_all(&self, selector: &str) -> Result<Vec<NodeId>, LookupError> {
        let list = SelectorList::parse(selector)?;
        Ok(self
            .descendant_elements(self.root())
            .into_iter()
            .filter(|node| list.matches(self, *node))
            .collect())
    }

    pub(crate) fn tag(&self, node: NodeId) -> Option<&str> {
        match &self.nodes[node.0].data {
            NodeData::Element(element) => Some(element.tag.as_str()),
            _ => None,
        }
    }

    pub(crate) fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        match &self.nodes[node.0].data {
            NodeData::Element(element) => element
                .attrs
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.as_str()),
            _ => None,
        }
    }

    fn element_mut(&mut self, node: NodeId) -> Option<&mut ElementData> {
        match &mut self.nodes[node.0].data {
            NodeData::Element(element) => Some(element),
            _ => None,
        }
    }

    pub(crate) fn is_element(&self, node: NodeId) -> bool {
        matches!(self.nodes[node.0].data, NodeData::Element(_))
    }

    pub(crate) fn parent_node(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    pub(crate) fn element_parent(&self, node: NodeId) -> Option<NodeId> {
        self.parent_node(node).filter(|parent| self.is_element(*parent))
    }

    pub(crate) fn element_children(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes[node.0]
            .children
            .iter()
            .copied()
            .filter(|child| self.is_element(*child))
            .collect()
    }

    /// Element siblings including `node`, in order.
    pub(crate) fn element_siblings(&self, node: NodeId) -> Vec<NodeId> {
        match self.parent_node(node) {
            Some(parent) => self.element_children(parent),
            None => vec![node],
        }
    }

    pub(crate) fn text_children(&self, node: NodeId) -> Vec<&str> {
        self.nodes[node.0]
            .children
            .iter()
            .filter_map(|child| match &self.nodes[child.0].data {
                NodeData::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Elements strictly below `node`, in document order.
    pub(crate) fn descendant_elements(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_descendants(node, &mut out);
        out
    }

    fn collect_descendants(&self, node: NodeId, out: &mut Vec<NodeId>) {
        for child in &self.nodes[node.0].children {
            if self.is_element(*child) {
                out.push(*child);
            }
            self.collect_descendants(*child, out);
        }
    }

    pub(crate) fn document_order(&self) -> HashMap<NodeId, usize> {
        let mut order = vec![self.root()];
        self.collect_descendants(self.root(), &mut order);
        order
            .into_iter()
            .enumerate()
            .map(|(position, node)| (node, position))
            .collect()
    }

    fn text_content(&self, node: NodeId, out: &mut String) {
        match &self.nodes[node.0].data {
            NodeData::Text(text) => out.push_str(text),
            NodeData::Element(element) if matches!(element.tag.as_str(), "script" | "style") => {}
            _ => {
                for child in &self.nodes[node.0].children {
                    self.text_content(*child, out);
                }
            }
        }
    }

    fn serialize(&self, node: NodeId, out: &mut String) {
        match &self.nodes[node.0].data {
            NodeData::Text(text) => out.push_str(&escape_text(text)),
            NodeData::Element(element) => {
                out.push('<');
                out.push_str(&element.tag);
                for (name, value) in &element.attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape_attr(value));
                    out.push('"');
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&element.tag.as_str()) {
                    return;
                }
                for child in &self.nodes[node.0].children {
                    self.serialize(*child, out);
                }
                out.push_str("</");
                out.push_str(&element.tag);
                out.push('>');
            }
            NodeData::Document => {
                for child in &self.nodes[node.0].children {
                    self.serialize(*child, out);
                }
            }
        }
    }

    fn resolve_url(&self, raw: &str) -> String {
        match &self.base_url {
            Some(base) => base
                .join(raw)
                .map(|url| url.to_string())
                .unwrap_or_else(|_| raw.to_string()),
            None => raw.to_string(),
        }
    }
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

impl Document for MemoryDocument {
    type Node = NodeId;

    fn document_element(&self) -> Option<NodeId> {
        let html = self.html();
        self.is_element(html).then_some(html)
    }

    fn parent_element(&self, node: &NodeId) -> Option<NodeId> {
        self.element_parent(*node)
    }

    fn children(&self, node: &NodeId) -> Vec<NodeId> {
        self.element_children(*node)
    }

    fn tag_name(&self, node: &NodeId) -> String {
        self.tag(*node).unwrap_or_default().to_string()
    }

    fn attributes(&self, node: &NodeId) -> Vec<(String, String)> {
        match &self.nodes[node.0].data {
            NodeData::Element(element) => element.attrs.clone(),
            _ => Vec::new(),
        }
    }

    fn attribute(&self, node: &NodeId, name: &str) -> Option<String> {
        self.attr(*node, name).map(str::to_string)
    }

    fn inner_text(&self, node: &NodeId) -> String {
        let mut out = String::new();
        self.text_content(*node, &mut out);
        out.trim().to_string()
    }

    fn inner_html(&self, node: &NodeId) -> String {
        let mut out = String::new();
        for child in &self.nodes[node.0].children {
            self.serialize(*child, &mut out);
        }
        out
    }

    fn bounding_rect(&self, node: &NodeId) -> Rect {
        self.rects.get(node).copied().unwrap_or_default()
    }

    fn add_class(&mut self, node: &NodeId, class: &str) {
        let current = self.attr(*node, "class").unwrap_or_default().to_string();
        if current.split_ascii_whitespace().any(|token| token == class) {
            return;
        }
        let updated = if current.trim().is_empty() {
            class.to_string()
        } else {
            format!("{} {class}", current.trim_end())
        };
        self.set_attribute(*node, "class", &updated);
    }

    fn remove_class(&mut self, node: &NodeId, class: &str) {
        let Some(current) = self.attr(*node, "class") else {
            return;
        };
        if !current.split_ascii_whitespace().any(|token| token == class) {
            return;
        }
        let updated = current
            .split_ascii_whitespace()
            .filter(|token| *token != class)
            .collect::<Vec<_>>()
            .join(" ");
        if updated.is_empty() {
            self.remove_attribute(*node, "class");
        } else {
            self.set_attribute(*node, "class", &updated);
        }
    }

    fn query_selector(&self, scope: &NodeId, selector: &str) -> Result<Option<NodeId>, LookupError> {
        let list = SelectorList::parse(selector)?;
        Ok(self
            .descendant_elements(*scope)
            .into_iter()
            .find(|node| list.matches(self, *node)))
    }

    fn evaluate_xpath(&self, expression: &str) -> Result<Option<NodeId>, LookupError> {
        let expr = XPathExpr::parse(expression)?;
        Ok(expr.evaluate(self).into_iter().next())
    }

    fn inject_style(&mut self, css: &str) {
        let head = self.head();
        let style = self.append_element(head, "style", &[]);
        self.append_text(style, css);
        self.styles.push(css.to_string());
    }

    fn scroll_into_view(&mut self, node: &NodeId) {
        self.scrolled.push(*node);
    }

    fn resource_url(&self, node: &NodeId) -> Option<String> {
        self.attr(*node, "src")
            .filter(|src| !src.trim().is_empty())
            .map(|src| self.resolve_url(src.trim()))
    }

    fn natural_size(&self, node: &NodeId) -> Option<Dimensions> {
        self.natural_sizes.get(node).copied()
    }

    fn background_image(&self, node: &NodeId) -> Option<String> {
        self.backgrounds.get(node).cloned()
    }
}
