//! Page Text Extraction
//!
//! Linearizes the rendered page into the text a sighted reader would see,
//! top to bottom. Images speak their alt text in place.

use crate::config::Config;
use crate::dom::{Document, Element, NodeData, NodeId};

/// Tags that never produce visible text
const NON_VISUAL_TAGS: &[&str] = &[
    "head", "style", "script", "template", "noscript", "meta", "link", "title",
];

/// Tags rendered on their own line
const BLOCK_TAGS: &[&str] = &[
    "address",
    "article",
    "aside",
    "blockquote",
    "caption",
    "dd",
    "details",
    "div",
    "dl",
    "dt",
    "fieldset",
    "figcaption",
    "figure",
    "footer",
    "form",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "header",
    "hr",
    "li",
    "main",
    "nav",
    "ol",
    "p",
    "pre",
    "section",
    "summary",
    "table",
    "tbody",
    "tfoot",
    "thead",
    "tr",
    "ul",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceKind {
    Text,
    ImageDescription,
}

/// A run of extracted text produced by one node. Offsets are char offsets
/// into [`PageText::text`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextPiece {
    pub node: NodeId,
    pub start: usize,
    pub end: usize,
    pub kind: PieceKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageText {
    pub text: String,
    pub pieces: Vec<TextPiece>,
}

/// Whether an element has a layout box
pub fn is_rendered(el: &Element) -> bool {
    if el.has_attribute("hidden") {
        return false;
    }
    let style: String = el
        .attribute("style")
        .unwrap_or("")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    !(style.contains("display:none") || style.contains("visibility:hidden"))
}

#[derive(Debug, Clone)]
pub struct PageTextExtractor {
    control_bar_class: String,
    ignore_attribute: String,
}

impl PageTextExtractor {
    pub fn new(control_bar_class: &str, ignore_attribute: &str) -> Self {
        Self {
            control_bar_class: control_bar_class.to_string(),
            ignore_attribute: ignore_attribute.to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.control_bar_class, &config.ignore_attribute)
    }

    /// The reader's own controls, or anything flagged as not for reading
    pub fn is_chrome(&self, el: &Element) -> bool {
        el.has_class(&self.control_bar_class) || el.has_attribute(&self.ignore_attribute)
    }

    /// Whether `node` sits inside the reader's controls or an ignored region
    pub fn in_ignored_region(&self, doc: &Document, node: NodeId) -> bool {
        doc.closest(node, |el| self.is_chrome(el)).is_some()
    }

    fn skips(&self, el: &Element) -> bool {
        NON_VISUAL_TAGS.contains(&el.tag()) || self.is_chrome(el) || !is_rendered(el)
    }

    /// Linearized text of the whole page
    pub fn extract(&self, doc: &Document) -> String {
        self.extract_pieces(doc, doc.body()).text
    }

    /// Linearized text of one element's subtree
    pub fn rendered_text(&self, doc: &Document, node: NodeId) -> String {
        self.extract_pieces(doc, node).text
    }

    /// Linearized text with per-node provenance. Read-only: the page is
    /// never touched.
    pub fn extract_pieces(&self, doc: &Document, root: NodeId) -> PageText {
        let mut builder = TextBuilder::default();
        self.walk(doc, root, &mut builder);
        builder.finish()
    }

    fn walk(&self, doc: &Document, node: NodeId, out: &mut TextBuilder) {
        match doc.data(node) {
            Some(NodeData::Text(text)) => out.push_text(node, text),
            Some(NodeData::Element(el)) => {
                if self.skips(el) {
                    return;
                }
                match el.tag() {
                    "img" => {
                        out.push_description(node, el.attribute("alt").unwrap_or(""));
                        return;
                    }
                    "br" => {
                        out.line_break();
                        return;
                    }
                    _ => {}
                }
                let block = BLOCK_TAGS.contains(&el.tag());
                if block {
                    out.line_break();
                }
                for child in doc.children(node) {
                    self.walk(doc, *child, out);
                }
                if block {
                    out.line_break();
                }
            }
            None => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
enum Separator {
    #[default]
    None,
    Space,
    Break,
}

#[derive(Debug, Default)]
struct TextBuilder {
    text: String,
    chars: usize,
    pieces: Vec<TextPiece>,
    pending: Separator,
}

impl TextBuilder {
    fn separate(&mut self, sep: Separator) {
        if self.chars > 0 && sep > self.pending {
            self.pending = sep;
        }
    }

    fn line_break(&mut self) {
        self.separate(Separator::Break);
    }

    fn flush(&mut self) {
        match std::mem::take(&mut self.pending) {
            Separator::Break => self.push_char('\n'),
            Separator::Space => self.push_char(' '),
            Separator::None => {}
        }
    }

    fn push_char(&mut self, c: char) {
        self.text.push(c);
        self.chars += 1;
    }

    fn push_text(&mut self, node: NodeId, raw: &str) {
        let mut start = None;
        for c in raw.chars() {
            if c.is_whitespace() {
                self.separate(Separator::Space);
                continue;
            }
            self.flush();
            if start.is_none() {
                start = Some(self.chars);
            }
            self.push_char(c);
        }
        if let Some(start) = start {
            self.pieces.push(TextPiece {
                node,
                start,
                end: self.chars,
                kind: PieceKind::Text,
            });
        }
    }

    fn push_description(&mut self, node: NodeId, alt: &str) {
        let words: Vec<&str> = alt.split_whitespace().collect();
        if words.is_empty() {
            return;
        }
        self.separate(Separator::Space);
        self.flush();
        let start = self.chars;
        for (i, word) in words.iter().enumerate() {
            if i > 0 {
                self.push_char(' ');
            }
            for c in word.chars() {
                self.push_char(c);
            }
        }
        self.pieces.push(TextPiece {
            node,
            start,
            end: self.chars,
            kind: PieceKind::ImageDescription,
        });
        self.separate(Separator::Space);
    }

    fn finish(self) -> PageText {
        PageText {
            text: self.text,
            pieces: self.pieces,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> PageTextExtractor {
        PageTextExtractor::from_config(&Config::default())
    }

    #[test]
    fn test_reading_order_and_blocks() {
        let doc = Document::parse(
            "<h1>Rhythm</h1><p>A <b>quarter</b>   note\n lasts one beat.</p><p>Next</p>",
        )
        .unwrap();
        assert_eq!(
            extractor().extract(&doc),
            "Rhythm\nA quarter note lasts one beat.\nNext"
        );
    }

    #[test]
    fn test_excludes_chrome_and_non_visual() {
        let doc = Document::parse(
            r#"<p>Visible</p>
            <div class="ttsBar"><button>Play</button></div>
            <button data-ignore-tts="">Menu</button>
            <script>var x = 1;</script><style>p {}</style><template><p>T</p></template>
            <p hidden>Hidden</p><p style="display: none">Gone</p>
            <span>End</span>"#,
        )
        .unwrap();
        assert_eq!(extractor().extract(&doc), "Visible\nEnd");
    }

    #[test]
    fn test_image_alt_is_inline_unit() {
        let doc = Document::parse(
            r#"<p>See<img alt="a  treble clef"/>here and <img alt=""/> there</p>"#,
        )
        .unwrap();
        let page = extractor().extract_pieces(&doc, doc.body());
        assert_eq!(page.text, "See a treble clef here and there");

        let descriptions: Vec<&TextPiece> = page
            .pieces
            .iter()
            .filter(|p| p.kind == PieceKind::ImageDescription)
            .collect();
        assert_eq!(descriptions.len(), 1);
        let slice: String = page
            .text
            .chars()
            .skip(descriptions[0].start)
            .take(descriptions[0].end - descriptions[0].start)
            .collect();
        assert_eq!(slice, "a treble clef");

        // The image element itself is untouched
        let imgs = doc.elements_by_tag("img");
        assert_eq!(imgs.len(), 2);
    }

    #[test]
    fn test_extract_is_idempotent_and_read_only() {
        let doc = Document::parse("<p>One <img alt='clef'/> two</p>").unwrap();
        let generation = doc.generation();
        let first = extractor().extract(&doc);
        let second = extractor().extract(&doc);
        assert_eq!(first, second);
        assert_eq!(doc.generation(), generation);
    }

    #[test]
    fn test_in_ignored_region() {
        let doc = Document::parse(r#"<div class="ttsBar"><span>Speed</span></div><p>x</p>"#)
            .unwrap();
        let span = doc.elements_by_tag("span")[0];
        let p = doc.elements_by_tag("p")[0];
        assert!(extractor().in_ignored_region(&doc, span));
        assert!(!extractor().in_ignored_region(&doc, p));
    }
}
