//! ReadAloud Library
//!
//! Text-to-speech page reading: word-highlighted read-along, click-to-speak,
//! page announcements on navigation, and persisted reader preferences.

pub mod announcer;
pub mod binder;
pub mod config;
pub mod dom;
pub mod error;
pub mod page;
pub mod prefs;
pub mod reader;
pub mod tts;

pub use error::{ReadAloudError, ReadAloudResult};
pub use reader::{ClickOutcome, ReadAloud};
