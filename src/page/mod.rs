//! Page reading
//!
//! Turns the rendered document into text and addressable word units.

pub mod extract;
pub mod indexer;

pub use extract::{PageText, PageTextExtractor, PieceKind, TextPiece};
pub use indexer::{UnitKind, ViewGeneration, WordIndexer, WordUnit};
