use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Speech
    pub tts_engine: String,
    pub voice_menu_size: usize,

    // Page
    pub highlight_class: String,
    pub control_bar_class: String,
    pub ignore_attribute: String,

    // Preferences
    pub preference_db_path: String,
    pub preference_cache_path: String,

    // Meta
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tts_engine: "system".to_string(),
            voice_menu_size: 3,
            highlight_class: "tts-highlight".to_string(),
            control_bar_class: "ttsBar".to_string(),
            ignore_attribute: "data-ignore-tts".to_string(),
            preference_db_path: dirs::data_dir()
                .unwrap_or_default()
                .join("readaloud/preferences.db")
                .to_string_lossy()
                .to_string(),
            preference_cache_path: dirs::cache_dir()
                .unwrap_or_default()
                .join("readaloud/preferences.json")
                .to_string_lossy()
                .to_string(),
            log_level: "INFO".to_string(),
        }
    }
}

impl Config {
    /// Load config from file, or create default
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    pub fn load_from(config_path: &std::path::Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_path)?;
        match serde_json::from_str(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                // Graceful degradation: log warning and use defaults
                tracing::warn!("⚠️ Config file corrupted or invalid, using defaults: {}", e);
                // Backup corrupt file for debugging
                let backup_path = config_path.with_extension("json.corrupt");
                let _ = std::fs::rename(config_path, &backup_path);
                Ok(Self::default())
            }
        }
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path())
    }

    pub fn save_to(&self, config_path: &std::path::Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("readaloud")
        .join("config.json")
}
