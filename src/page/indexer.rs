//! Word Indexer
//!
//! Splits the extracted page into addressable word units. The result is
//! cached per view generation and recomputed lazily once the page changes.

use std::sync::Arc;
use tracing::debug;

use super::extract::{PageText, PageTextExtractor, PieceKind};
use crate::dom::{DomAnchor, Document};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Word,
    /// An image's alt text, spoken and highlighted as a single unit
    ImageDescription,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordUnit {
    pub sequence_index: usize,
    pub text: String,
    pub anchor: DomAnchor,
    pub kind: UnitKind,
}

/// Identifies one render of a view: the route epoch plus the document's
/// structural generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewGeneration {
    pub route: u64,
    pub document: u64,
}

#[derive(Debug)]
pub struct WordIndexer {
    extractor: PageTextExtractor,
    route_epoch: u64,
    cache: Option<(ViewGeneration, Arc<[WordUnit]>)>,
}

impl WordIndexer {
    pub fn new(extractor: PageTextExtractor) -> Self {
        Self {
            extractor,
            route_epoch: 0,
            cache: None,
        }
    }

    pub fn extractor(&self) -> &PageTextExtractor {
        &self.extractor
    }

    /// Mark the current index stale (route change or async content load)
    pub fn invalidate(&mut self) {
        self.route_epoch += 1;
    }

    pub fn generation(&self, doc: &Document) -> ViewGeneration {
        ViewGeneration {
            route: self.route_epoch,
            document: doc.generation(),
        }
    }

    pub fn is_stale(&self, doc: &Document) -> bool {
        let current = self.generation(doc);
        !matches!(&self.cache, Some((generation, _)) if *generation == current)
    }

    /// Word units of the current view, recomputed only when stale
    pub fn index(&mut self, doc: &Document) -> Arc<[WordUnit]> {
        let current = self.generation(doc);
        if let Some((generation, units)) = &self.cache {
            if *generation == current {
                return units.clone();
            }
        }

        let page = self.extractor.extract_pieces(doc, doc.body());
        let units: Arc<[WordUnit]> = partition(&page).into();
        debug!(
            "Indexed {} word units (route epoch {}, document generation {})",
            units.len(),
            current.route,
            current.document
        );
        self.cache = Some((current, units.clone()));
        units
    }
}

/// Whitespace-delimited tokens of the page text, with each image
/// description kept whole.
pub fn partition(page: &PageText) -> Vec<WordUnit> {
    let chars: Vec<char> = page.text.chars().collect();
    let mut units = Vec::new();
    let mut piece = 0;
    let mut token_start: Option<usize> = None;
    let mut i = 0;

    let emit = |units: &mut Vec<WordUnit>, start: usize, end: usize, piece: usize| {
        let Some(owner) = page.pieces.get(piece) else {
            return;
        };
        let text: String = chars[start..end].iter().collect();
        let (anchor, kind) = match owner.kind {
            PieceKind::ImageDescription => {
                (DomAnchor::element(owner.node), UnitKind::ImageDescription)
            }
            PieceKind::Text => (
                DomAnchor::word(
                    owner.node,
                    (start - owner.start)..(end.min(owner.end) - owner.start),
                ),
                UnitKind::Word,
            ),
        };
        units.push(WordUnit {
            sequence_index: units.len(),
            text,
            anchor,
            kind,
        });
    };

    while i < chars.len() {
        // Advance to the piece covering position i
        while piece + 1 < page.pieces.len() && page.pieces[piece + 1].start <= i {
            piece += 1;
        }

        if let Some(owner) = page.pieces.get(piece) {
            if owner.kind == PieceKind::ImageDescription && owner.start == i {
                if let Some(start) = token_start.take() {
                    emit(&mut units, start, i, owner_of(page, start));
                }
                emit(&mut units, owner.start, owner.end, piece);
                i = owner.end;
                continue;
            }
        }

        if chars[i].is_whitespace() {
            if let Some(start) = token_start.take() {
                emit(&mut units, start, i, owner_of(page, start));
            }
        } else if token_start.is_none() {
            token_start = Some(i);
        }
        i += 1;
    }
    if let Some(start) = token_start {
        emit(&mut units, start, chars.len(), owner_of(page, start));
    }

    units
}

/// Index of the piece whose range contains char offset `at`
fn owner_of(page: &PageText, at: usize) -> usize {
    page.pieces
        .partition_point(|p| p.start <= at)
        .saturating_sub(1)
}
