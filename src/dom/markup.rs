//! Markup loading
//!
//! Reads page markup with quick-xml in a lenient mode so ordinary HTML
//! (unclosed `<img>`, valueless `hidden`, `&nbsp;`) loads as well as XHTML.

use std::borrow::Cow;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{Document, NodeId};
use crate::error::{ReadAloudError, ReadAloudResult};

/// Elements that never have content or a closing tag
const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Elements whose content is raw text, not markup
const RAW_TEXT_TAGS: &[&str] = &["script", "style"];

/// Wrappers whose children belong directly to the document body
const TRANSPARENT_TAGS: &[&str] = &["html", "body"];

fn resolve_html_entity(entity: &str) -> Option<&'static str> {
    match entity {
        "nbsp" => Some("\u{a0}"),
        "ndash" => Some("\u{2013}"),
        "mdash" => Some("\u{2014}"),
        "hellip" => Some("\u{2026}"),
        "rsquo" => Some("\u{2019}"),
        "lsquo" => Some("\u{2018}"),
        "ldquo" => Some("\u{201c}"),
        "rdquo" => Some("\u{201d}"),
        "copy" => Some("\u{a9}"),
        _ => None,
    }
}

pub(super) fn parse(markup: &str) -> ReadAloudResult<Document> {
    let mut doc = Document::new();
    let source = strip_raw_text(markup);
    let mut reader = Reader::from_str(&source);
    {
        let config = reader.config_mut();
        config.trim_text(false);
        config.check_end_names = false;
        config.allow_unmatched_ends = true;
    }

    // Open elements: (tag, node children are appended to)
    let mut open: Vec<(String, NodeId)> = Vec::new();

    loop {
        let parent = open.last().map(|(_, id)| *id).unwrap_or(doc.body());
        match reader.read_event()? {
            Event::Start(e) => {
                let tag = tag_name(&e);
                if TRANSPARENT_TAGS.contains(&tag.as_str()) {
                    open.push((tag, parent));
                    continue;
                }
                let node = append_element(&mut doc, parent, &tag, &e)?;
                if !VOID_TAGS.contains(&tag.as_str()) {
                    open.push((tag, node));
                }
            }
            Event::Empty(e) => {
                let tag = tag_name(&e);
                if !TRANSPARENT_TAGS.contains(&tag.as_str()) {
                    append_element(&mut doc, parent, &tag, &e)?;
                }
            }
            Event::End(e) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();
                if VOID_TAGS.contains(&tag.as_str()) {
                    continue;
                }
                // Close up to the matching element; stray end tags are dropped
                if let Some(pos) = open.iter().rposition(|(t, _)| *t == tag) {
                    open.truncate(pos);
                }
            }
            Event::Text(e) => {
                let text = match e.unescape_with(resolve_html_entity) {
                    Ok(text) => text.into_owned(),
                    Err(_) => String::from_utf8_lossy(&e).into_owned(),
                };
                if !text.is_empty() {
                    doc.append_text(parent, &text);
                }
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(&e).into_owned();
                if !text.is_empty() {
                    doc.append_text(parent, &text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(doc)
}

/// Empty out script and style bodies. Their content is never read and may
/// hold `<` or `&` that is not markup.
fn strip_raw_text(markup: &str) -> Cow<'_, str> {
    // ASCII lowercasing keeps byte offsets aligned with `markup`
    let lower = markup.to_ascii_lowercase();
    let mut out = String::new();
    let mut copied = 0;
    let mut from = 0;

    while let Some((tag, open)) = next_raw_text_open(&lower, from) {
        let Some(body_start) = lower[open..].find('>').map(|i| open + i + 1) else {
            break;
        };
        if lower[open..body_start].ends_with("/>") {
            from = body_start;
            continue;
        }
        let close = format!("</{}", tag);
        let body_end = lower[body_start..]
            .find(&close)
            .map_or(lower.len(), |i| body_start + i);
        out.push_str(&markup[copied..body_start]);
        copied = body_end;
        from = body_end;
    }

    if copied == 0 {
        return Cow::Borrowed(markup);
    }
    out.push_str(&markup[copied..]);
    Cow::Owned(out)
}

/// Earliest `<script` or `<style` open tag at or after `from`
fn next_raw_text_open(lower: &str, from: usize) -> Option<(&'static str, usize)> {
    RAW_TEXT_TAGS
        .iter()
        .filter_map(|tag| {
            let pattern = format!("<{}", tag);
            let mut at = from;
            while let Some(i) = lower[at..].find(&pattern) {
                let start = at + i;
                at = start + pattern.len();
                let boundary = lower[at..]
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_whitespace() || c == '>' || c == '/');
                if boundary {
                    return Some((*tag, start));
                }
            }
            None
        })
        .min_by_key(|(_, start)| *start)
}

fn tag_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase()
}

fn append_element(
    doc: &mut Document,
    parent: NodeId,
    tag: &str,
    e: &BytesStart<'_>,
) -> ReadAloudResult<NodeId> {
    let node = doc.append_element(parent, tag);
    for attr in e.html_attributes() {
        let attr = attr.map_err(|err| ReadAloudError::Markup(err.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = match attr.unescape_value_with(resolve_html_entity) {
            Ok(value) => value.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        };
        doc.set_attribute(node, &key, &value);
    }
    Ok(node)
}
