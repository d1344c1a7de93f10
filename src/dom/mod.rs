//! Document Model
//!
//! An owned arena tree standing in for the rendered page. The reader only
//! ever traverses it, toggles highlight classes, and registers click
//! listeners; everything else is the renderer's business.

use std::collections::BTreeMap;
use std::ops::Range;

mod markup;

use crate::error::ReadAloudResult;

/// Handle to a node in a [`Document`]. Handles are never reused, so a handle
/// to a removed node stays valid but reports itself as detached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

/// Handle to a registered click listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

/// The live position of a word unit: a whole element, or a character range
/// inside a text node's normalized (whitespace-collapsed) text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomAnchor {
    pub node: NodeId,
    pub word: Option<Range<usize>>,
}

impl DomAnchor {
    pub fn element(node: NodeId) -> Self {
        Self { node, word: None }
    }

    pub fn word(node: NodeId, range: Range<usize>) -> Self {
        Self {
            node,
            word: Some(range),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Element {
    tag: String,
    attributes: BTreeMap<String, String>,
}

impl Element {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attributes: BTreeMap::new(),
        }
    }

    /// Lower-cased tag name
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Attribute value trimmed, `None` when absent or blank
    pub fn non_empty_attribute(&self, name: &str) -> Option<&str> {
        self.attribute(name).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attribute("class").unwrap_or("").split_whitespace()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }
}

#[derive(Debug, Clone)]
pub enum NodeData {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data: NodeData,
    attached: bool,
}

/// The rendered page as the reader sees it
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    body: NodeId,
    generation: u64,
    listeners: BTreeMap<ListenerId, NodeId>,
    next_listener: u64,
    highlight: Option<DomAnchor>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document with a `body` root
    pub fn new() -> Self {
        let body = Node {
            parent: None,
            children: Vec::new(),
            data: NodeData::Element(Element::new("body")),
            attached: true,
        };
        Self {
            nodes: vec![body],
            body: NodeId(0),
            generation: 0,
            listeners: BTreeMap::new(),
            next_listener: 0,
            highlight: None,
        }
    }

    /// Build a document from an (X)HTML fragment or page
    pub fn parse(markup: &str) -> ReadAloudResult<Self> {
        markup::parse(markup)
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    /// Incremented on every structural change that can affect readable content
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn data(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id.0).map(|n| &n.data)
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match self.data(id) {
            Some(NodeData::Element(el)) => Some(el),
            _ => None,
        }
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.data(id) {
            Some(NodeData::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(Element::tag)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.0)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_attached(&self, id: NodeId) -> bool {
        self.nodes.get(id.0).is_some_and(|n| n.attached)
    }

    /// The node itself followed by its ancestors up to the root
    pub fn self_and_ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(
            self.nodes.get(id.0).map(|_| id),
            move |n| self.parent(*n),
        )
    }

    /// Nearest element, starting at `id`, that satisfies `predicate`
    pub fn closest<F>(&self, id: NodeId, mut predicate: F) -> Option<NodeId>
    where
        F: FnMut(&Element) -> bool,
    {
        self.self_and_ancestors(id)
            .find(|n| self.element(*n).is_some_and(&mut predicate))
    }

    /// Pre-order traversal of the subtree rooted at `id`
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).iter().rev().copied());
        }
        out
    }

    pub fn elements_by_tag(&self, tag: &str) -> Vec<NodeId> {
        self.descendants(self.body)
            .into_iter()
            .filter(|n| self.tag(*n) == Some(tag))
            .collect()
    }

    pub fn elements_with_class(&self, class: &str) -> Vec<NodeId> {
        self.descendants(self.body)
            .into_iter()
            .filter(|n| self.element(*n).is_some_and(|el| el.has_class(class)))
            .collect()
    }

    /// The element an anchor paints on: the node itself, or a text node's parent
    pub fn anchor_element(&self, anchor: &DomAnchor) -> Option<NodeId> {
        match self.data(anchor.node)? {
            NodeData::Element(_) => Some(anchor.node),
            NodeData::Text(_) => self.parent(anchor.node),
        }
    }

    // Structural mutations

    pub fn append_element(&mut self, parent: NodeId, tag: &str) -> NodeId {
        self.append(parent, NodeData::Element(Element::new(tag)))
    }

    pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        self.append(parent, NodeData::Text(text.to_string()))
    }

    fn append(&mut self, parent: NodeId, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        let attached = self.is_attached(parent);
        self.nodes.push(Node {
            parent: Some(parent),
            children: Vec::new(),
            data,
            attached,
        });
        if let Some(p) = self.nodes.get_mut(parent.0) {
            p.children.push(id);
        }
        self.generation += 1;
        id
    }

    /// Detach a node and its subtree. The root cannot be removed.
    pub fn remove(&mut self, id: NodeId) -> bool {
        if id == self.body || !self.is_attached(id) {
            return false;
        }
        if let Some(parent) = self.parent(id) {
            if let Some(p) = self.nodes.get_mut(parent.0) {
                p.children.retain(|c| *c != id);
            }
        }
        let subtree = self.descendants(id);
        for node in &subtree {
            if let Some(n) = self.nodes.get_mut(node.0) {
                n.attached = false;
            }
        }
        self.listeners.retain(|_, node| !subtree.contains(node));
        self.generation += 1;
        true
    }

    pub fn set_text(&mut self, id: NodeId, text: &str) {
        if let Some(Node {
            data: NodeData::Text(current),
            ..
        }) = self.nodes.get_mut(id.0)
        {
            *current = text.to_string();
            self.generation += 1;
        }
    }

    /// Set an attribute. Changing `class` is presentational and does not
    /// advance the generation.
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        if let Some(el) = self.element_mut(id) {
            let structural = name != "class";
            el.attributes.insert(name, value.to_string());
            if structural {
                self.generation += 1;
            }
        }
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) {
        let name = name.to_ascii_lowercase();
        if let Some(el) = self.element_mut(id) {
            let structural = name != "class";
            if el.attributes.remove(&name).is_some() && structural {
                self.generation += 1;
            }
        }
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) {
        let Some(el) = self.element(id) else { return };
        if el.has_class(class) {
            return;
        }
        let mut classes: Vec<String> = el.classes().map(str::to_string).collect();
        classes.push(class.to_string());
        self.set_attribute(id, "class", &classes.join(" "));
    }

    pub fn remove_class(&mut self, id: NodeId, class: &str) {
        let Some(el) = self.element(id) else { return };
        if !el.has_class(class) {
            return;
        }
        let classes: Vec<&str> = el.classes().filter(|c| *c != class).collect();
        let joined = classes.join(" ");
        self.set_attribute(id, "class", &joined);
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match self.nodes.get_mut(id.0) {
            Some(Node {
                data: NodeData::Element(el),
                ..
            }) => Some(el),
            _ => None,
        }
    }

    // Highlight slot

    pub fn highlight(&self) -> Option<&DomAnchor> {
        self.highlight.as_ref()
    }

    pub fn set_highlight(&mut self, anchor: Option<DomAnchor>) {
        self.highlight = anchor;
    }

    // Click listeners

    pub fn add_click_listener(&mut self, node: NodeId) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.insert(id, node);
        id
    }

    pub fn remove_click_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    pub fn has_click_listener(&self, id: ListenerId) -> bool {
        self.listeners.contains_key(&id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Listeners a click on `target` reaches, innermost first
    pub fn click_listeners(&self, target: NodeId) -> Vec<ListenerId> {
        if !self.is_attached(target) {
            return Vec::new();
        }
        let mut out = Vec::new();
        for node in self.self_and_ancestors(target) {
            out.extend(
                self.listeners
                    .iter()
                    .filter(|(_, n)| **n == node)
                    .map(|(id, _)| *id),
            );
        }
        out
    }
}
