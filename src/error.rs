//! ReadAloud Error Types
//!
//! Every failure in the reader is recovered locally. These variants describe
//! what went wrong so callers can log it; none of them is fatal to the host page.

use thiserror::Error;

/// Central error type for ReadAloud
#[derive(Error, Debug)]
pub enum ReadAloudError {
    #[error("Speech engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Nothing to speak")]
    EmptyContent,

    #[error("Failed to load preferences: {0}")]
    PreferenceLoad(String),

    #[error("Failed to save preferences: {0}")]
    PreferenceSave(String),

    #[error("Markup error: {0}")]
    Markup(String),

    #[error("Lock poisoned: {0}")]
    Lock(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for ReadAloud operations
pub type ReadAloudResult<T> = Result<T, ReadAloudError>;

/// Helper to convert Mutex poison errors
impl<T> From<std::sync::PoisonError<T>> for ReadAloudError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        ReadAloudError::Lock(err.to_string())
    }
}

impl From<quick_xml::Error> for ReadAloudError {
    fn from(err: quick_xml::Error) -> Self {
        ReadAloudError::Markup(err.to_string())
    }
}
