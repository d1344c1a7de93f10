//! Interaction Binder
//!
//! Click-to-speak. A single delegated listener sits on the document body and
//! each click is resolved against the element that was actually hit, so
//! re-renders never leave stale or duplicate listeners behind.

use tracing::debug;

use crate::dom::{Document, Element, ListenerId, NodeId};
use crate::page::extract::is_rendered;
use crate::page::PageTextExtractor;

/// Elements that can be read by clicking
const READABLE_TAGS: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "span", "img", "button", "input", "textarea",
    "select", "label", "a", "li",
];

/// Elements whose readable content is their form value
const FORM_TAGS: &[&str] = &["input", "label", "textarea", "select"];

/// Also used to decide whether the space hotkey belongs to the page
pub const TEXT_INPUT_TAGS: &[&str] = &["input", "textarea", "select"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickResolution {
    Readable { element: NodeId, content: String },
    /// Inside the reader's own controls or a region marked not for reading
    IgnoredRegion,
    NotReadable,
    EmptyContent,
}

#[derive(Debug)]
pub struct InteractionBinder {
    extractor: PageTextExtractor,
    listener: Option<ListenerId>,
}

impl InteractionBinder {
    pub fn new(extractor: PageTextExtractor) -> Self {
        Self {
            extractor,
            listener: None,
        }
    }

    /// Attach the delegated listener, replacing any previous one
    pub fn bind(&mut self, doc: &mut Document) -> ListenerId {
        self.unbind(doc);
        let id = doc.add_click_listener(doc.body());
        debug!("Click listener {:?} bound", id);
        self.listener = Some(id);
        id
    }

    /// Bind only if this document does not already carry our listener
    pub fn ensure_bound(&mut self, doc: &mut Document) -> ListenerId {
        match self.listener {
            Some(id) if doc.has_click_listener(id) => id,
            _ => self.bind(doc),
        }
    }

    pub fn unbind(&mut self, doc: &mut Document) {
        if let Some(id) = self.listener.take() {
            doc.remove_click_listener(id);
        }
    }

    pub fn is_bound(&self) -> bool {
        self.listener.is_some()
    }

    pub fn owns(&self, id: ListenerId) -> bool {
        self.listener == Some(id)
    }

    /// Decide what a click on `target` should read
    pub fn resolve(&self, doc: &Document, target: NodeId) -> ClickResolution {
        if !doc.is_attached(target) {
            return ClickResolution::NotReadable;
        }
        if self.extractor.in_ignored_region(doc, target) {
            return ClickResolution::IgnoredRegion;
        }
        let Some(element) = doc.closest(target, |el| READABLE_TAGS.contains(&el.tag())) else {
            return ClickResolution::NotReadable;
        };
        if doc
            .self_and_ancestors(element)
            .filter_map(|n| doc.element(n))
            .any(|el| !is_rendered(el))
        {
            return ClickResolution::NotReadable;
        }

        let content = self.content_of(doc, element);
        if content.is_empty() {
            ClickResolution::EmptyContent
        } else {
            ClickResolution::Readable { element, content }
        }
    }

    fn content_of(&self, doc: &Document, node: NodeId) -> String {
        let Some(el) = doc.element(node) else {
            return String::new();
        };
        let content = match el.tag() {
            "img" => el.non_empty_attribute("alt").map(str::to_string),
            "a" => self
                .first_image_alt(doc, node)
                .or_else(|| Some(self.extractor.rendered_text(doc, node))),
            "select" => selected_option(doc, node).or_else(|| form_value(el)),
            tag if FORM_TAGS.contains(&tag) => form_value(el)
                .or_else(|| Some(self.extractor.rendered_text(doc, node))),
            "button" => Some(self.extractor.rendered_text(doc, node))
                .filter(|t| !t.trim().is_empty())
                .or_else(|| el.non_empty_attribute("title").map(str::to_string))
                .or_else(|| el.non_empty_attribute("aria-label").map(str::to_string)),
            _ => Some(self.extractor.rendered_text(doc, node)),
        };
        content.map(|c| c.trim().to_string()).unwrap_or_default()
    }

    fn first_image_alt(&self, doc: &Document, node: NodeId) -> Option<String> {
        doc.descendants(node)
            .into_iter()
            .filter(|n| doc.tag(*n) == Some("img"))
            .find_map(|n| doc.element(n)?.non_empty_attribute("alt").map(str::to_string))
    }
}

/// value, else placeholder, else name, else title
fn form_value(el: &Element) -> Option<String> {
    ["value", "placeholder", "name", "title"]
        .iter()
        .find_map(|attr| el.non_empty_attribute(attr))
        .map(str::to_string)
}

fn selected_option(doc: &Document, select: NodeId) -> Option<String> {
    let options: Vec<NodeId> = doc
        .descendants(select)
        .into_iter()
        .filter(|n| doc.tag(*n) == Some("option"))
        .collect();
    let chosen = options
        .iter()
        .find(|n| doc.element(**n).is_some_and(|el| el.has_attribute("selected")))
        .or_else(|| options.first())?;
    let text: String = doc
        .descendants(*chosen)
        .into_iter()
        .filter_map(|n| doc.text(n))
        .collect::<Vec<_>>()
        .join(" ");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}
