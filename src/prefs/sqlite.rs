//! SQLite preference backend
//!
//! Stores TTS settings in the `users` table. Saving only touches the TTS
//! columns so other profile fields survive.

use super::{PreferenceBackend, Preferences};
use crate::error::{ReadAloudError, ReadAloudResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone)]
pub struct SqliteBackend {
    db_path: PathBuf,
}

impl SqliteBackend {
    pub fn new(db_path: impl Into<PathBuf>) -> ReadAloudResult<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let backend = Self { db_path };
        backend.init_db()?;
        info!("🗄️ Preference database at {:?}", backend.db_path);
        Ok(backend)
    }

    fn init_db(&self) -> ReadAloudResult<()> {
        let conn = Connection::open(&self.db_path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                uid TEXT PRIMARY KEY,
                speed REAL NOT NULL,
                voice TEXT NOT NULL,
                announcement INTEGER NOT NULL,
                clickTTS INTEGER NOT NULL,
                highlightTTS INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    fn load_blocking(db_path: &Path, user_id: &str) -> ReadAloudResult<Option<Preferences>> {
        let conn = Connection::open(db_path)?;
        let prefs = conn
            .query_row(
                "SELECT speed, voice, announcement, clickTTS, highlightTTS
                 FROM users WHERE uid = ?1",
                [user_id],
                |row| {
                    Ok(Preferences {
                        rate: row.get(0)?,
                        voice_id: row.get(1)?,
                        announce_enabled: row.get(2)?,
                        click_to_speak_enabled: row.get(3)?,
                        highlight_enabled: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(prefs)
    }

    fn save_blocking(db_path: &Path, user_id: &str, prefs: &Preferences) -> ReadAloudResult<()> {
        let conn = Connection::open(db_path)?;
        conn.execute(
            "INSERT INTO users (uid, speed, voice, announcement, clickTTS, highlightTTS)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(uid) DO UPDATE SET
                speed = excluded.speed,
                voice = excluded.voice,
                announcement = excluded.announcement,
                clickTTS = excluded.clickTTS,
                highlightTTS = excluded.highlightTTS",
            params![
                user_id,
                prefs.rate,
                prefs.voice_id,
                prefs.announce_enabled,
                prefs.click_to_speak_enabled,
                prefs.highlight_enabled
            ],
        )?;
        Ok(())
    }
}

#[async_trait]
impl PreferenceBackend for SqliteBackend {
    async fn load(&self, user_id: &str) -> ReadAloudResult<Option<Preferences>> {
        let db_path = self.db_path.clone();
        let user = user_id.to_string();
        tokio::task::spawn_blocking(move || Self::load_blocking(&db_path, &user))
            .await
            .map_err(|e| ReadAloudError::Other(e.into()))?
    }

    async fn save(&self, user_id: &str, prefs: &Preferences) -> ReadAloudResult<()> {
        let db_path = self.db_path.clone();
        let user = user_id.to_string();
        let prefs = prefs.clone();
        tokio::task::spawn_blocking(move || Self::save_blocking(&db_path, &user, &prefs))
            .await
            .map_err(|e| ReadAloudError::Other(e.into()))?
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}
