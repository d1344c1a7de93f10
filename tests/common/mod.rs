#![allow(dead_code)]

pub mod mock_engine;

use readaloud::config::Config;
use readaloud::prefs::{LocalCache, MemoryBackend, PreferenceStore, Preferences};
use readaloud::ReadAloud;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

pub use mock_engine::MockEngine;

/// A lesson page with a control bar, an ignored region and images
pub const LESSON_PAGE: &str = r#"
<div class="ttsBar"><button>Play</button><button>Stop</button></div>
<h1>Rhythm basics</h1>
<p>A quarter note lasts one beat in common time.</p>
<p>Two eighth notes <img alt="Two eighth notes beamed"/> fill the same beat.</p>
<img alt=""/>
<div data-ignore-tts=""><p>Sidebar menu</p></div>
<input placeholder="Your answer"/>
"#;

/// Isolated preference storage in a temp dir
pub struct TestContext {
    pub temp_dir: TempDir,
    pub backend: Arc<MemoryBackend>,
    pub config: Config,
}

impl TestContext {
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config = Config {
            preference_cache_path: temp_dir
                .path()
                .join("preferences.json")
                .to_string_lossy()
                .to_string(),
            preference_db_path: temp_dir
                .path()
                .join("preferences.db")
                .to_string_lossy()
                .to_string(),
            ..Config::default()
        };
        Self {
            temp_dir,
            backend: Arc::new(MemoryBackend::new()),
            config,
        }
    }

    pub fn cache_path(&self) -> PathBuf {
        PathBuf::from(&self.config.preference_cache_path)
    }

    pub fn store(&self) -> PreferenceStore {
        PreferenceStore::new(LocalCache::new(self.cache_path()), self.backend.clone())
    }

    /// Seed the local cache so new sessions start from these preferences
    pub fn seed(&self, prefs: &Preferences) {
        LocalCache::new(self.cache_path())
            .write(prefs)
            .expect("Failed to seed preference cache");
    }

    pub fn reader(&self, engine: &MockEngine) -> ReadAloud {
        ReadAloud::new(engine.boxed(), self.store(), &self.config)
    }
}
