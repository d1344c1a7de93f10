//! Local preference cache
//!
//! A small JSON file mirroring the last-known preferences so a fresh session
//! can apply them before the durable record arrives.

use super::Preferences;
use crate::error::ReadAloudResult;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct LocalCache {
    path: PathBuf,
}

impl LocalCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cached preferences; a missing or unreadable file yields `None`
    pub fn read(&self) -> Option<Preferences> {
        if !self.path.exists() {
            return None;
        }
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                warn!("⚠️ Could not read preference cache {:?}: {}", self.path, e);
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(prefs) => Some(prefs),
            Err(e) => {
                warn!("⚠️ Preference cache corrupted, ignoring: {}", e);
                None
            }
        }
    }

    pub fn write(&self, prefs: &Preferences) -> ReadAloudResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(prefs)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    pub fn clear(&self) -> ReadAloudResult<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}
