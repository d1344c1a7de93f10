//! Preference Store
//!
//! Reader settings are mirrored in a local cache for instant reuse and
//! persisted per user in a durable backend. Persisting never sits on the
//! speech path: durable saves run on their own task and failures are only
//! logged.

use crate::error::{ReadAloudError, ReadAloudResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

pub mod cache;
pub mod sqlite;

pub use cache::LocalCache;
pub use sqlite::SqliteBackend;

pub const MIN_RATE: f64 = 0.1;
pub const MAX_RATE: f64 = 10.0;

/// User TTS settings. Field names on disk match the user profile record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    #[serde(rename = "speed")]
    pub rate: f64,
    /// Voice name; empty selects the first available voice
    #[serde(rename = "voice")]
    pub voice_id: String,
    #[serde(rename = "highlightTTS")]
    pub highlight_enabled: bool,
    #[serde(rename = "announcement")]
    pub announce_enabled: bool,
    #[serde(rename = "clickTTS")]
    pub click_to_speak_enabled: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            rate: 1.0,
            voice_id: String::new(),
            highlight_enabled: true,
            announce_enabled: true,
            click_to_speak_enabled: true,
        }
    }
}

impl Preferences {
    /// A usable speech rate, or `None` for non-positive or non-finite input
    pub fn normalize_rate(rate: f64) -> Option<f64> {
        (rate.is_finite() && rate > 0.0).then(|| rate.clamp(MIN_RATE, MAX_RATE))
    }
}

/// Durable per-user storage
#[async_trait]
pub trait PreferenceBackend: Send + Sync + std::fmt::Debug {
    /// `Ok(None)` when the user has no stored record
    async fn load(&self, user_id: &str) -> ReadAloudResult<Option<Preferences>>;

    async fn save(&self, user_id: &str, prefs: &Preferences) -> ReadAloudResult<()>;

    fn name(&self) -> &str;
}

/// Process-local backend for ephemeral sessions
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: Mutex<HashMap<String, Preferences>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, user_id: &str) -> Option<Preferences> {
        self.records.lock().ok()?.get(user_id).cloned()
    }
}

#[async_trait]
impl PreferenceBackend for MemoryBackend {
    async fn load(&self, user_id: &str) -> ReadAloudResult<Option<Preferences>> {
        Ok(self.records.lock()?.get(user_id).cloned())
    }

    async fn save(&self, user_id: &str, prefs: &Preferences) -> ReadAloudResult<()> {
        self.records
            .lock()?
            .insert(user_id.to_string(), prefs.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[derive(Debug)]
enum WriterMessage {
    Save { user: String, prefs: Preferences },
    Flush(oneshot::Sender<()>),
}

/// Applies durable saves one at a time, in the order they were queued
async fn run_writer(
    backend: Arc<dyn PreferenceBackend>,
    mut queue: mpsc::UnboundedReceiver<WriterMessage>,
) {
    while let Some(message) = queue.recv().await {
        match message {
            WriterMessage::Save { user, prefs } => match backend.save(&user, &prefs).await {
                Ok(()) => debug!("💾 Saved preferences for {}", user),
                Err(e) => warn!("⚠️ {}", ReadAloudError::PreferenceSave(e.to_string())),
            },
            WriterMessage::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct PreferenceStore {
    cache: LocalCache,
    backend: Arc<dyn PreferenceBackend>,
    writer: Arc<Mutex<Option<mpsc::UnboundedSender<WriterMessage>>>>,
}

impl PreferenceStore {
    pub fn new(cache: LocalCache, backend: Arc<dyn PreferenceBackend>) -> Self {
        Self {
            cache,
            backend,
            writer: Arc::new(Mutex::new(None)),
        }
    }

    pub fn backend(&self) -> &Arc<dyn PreferenceBackend> {
        &self.backend
    }

    /// Last-known preferences from the local cache, or defaults
    pub fn cached(&self) -> Preferences {
        self.cache.read().unwrap_or_default()
    }

    /// Load a user's durable record. Absent records and read failures fall
    /// back to the last-known preferences.
    pub async fn load(&self, user_id: Option<&str>) -> Preferences {
        let fallback = self.cached();
        let Some(user) = user_id else {
            return fallback;
        };

        match self.backend.load(user).await {
            Ok(Some(prefs)) => {
                info!("📥 Loaded preferences for {} from {}", user, self.backend.name());
                if let Err(e) = self.cache.write(&prefs) {
                    warn!("⚠️ Could not refresh preference cache: {}", e);
                }
                prefs
            }
            Ok(None) => {
                debug!("No stored preferences for {}, using last known", user);
                fallback
            }
            Err(e) => {
                warn!("⚠️ {}", ReadAloudError::PreferenceLoad(e.to_string()));
                fallback
            }
        }
    }

    /// Write the cache and, for a signed-in user, the durable record
    pub async fn save(&self, user_id: Option<&str>, prefs: &Preferences) -> ReadAloudResult<()> {
        self.cache
            .write(prefs)
            .map_err(|e| ReadAloudError::PreferenceSave(e.to_string()))?;
        if let Some(user) = user_id {
            self.backend
                .save(user, prefs)
                .await
                .map_err(|e| ReadAloudError::PreferenceSave(e.to_string()))?;
        }
        Ok(())
    }

    /// Fire-and-forget save. The cache is written immediately; the durable
    /// write is queued behind earlier ones and its failure is only logged.
    /// Returns whether a durable write was queued.
    pub fn persist(&self, user_id: Option<String>, prefs: Preferences) -> bool {
        if let Err(e) = self.cache.write(&prefs) {
            warn!("⚠️ {}", ReadAloudError::PreferenceSave(e.to_string()));
        }

        let Some(user) = user_id else {
            return false;
        };
        let Some(writer) = self.writer() else {
            return false;
        };
        writer.send(WriterMessage::Save { user, prefs }).is_ok()
    }

    /// Wait until every queued durable write has been applied
    pub async fn flush(&self) {
        let writer = match self.writer.lock() {
            Ok(slot) => slot.clone(),
            Err(e) => {
                warn!("⚠️ {}", ReadAloudError::from(e));
                None
            }
        };
        let Some(writer) = writer else {
            return;
        };
        let (done_tx, done_rx) = oneshot::channel();
        if writer.send(WriterMessage::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// The save queue, started on first use inside a tokio runtime
    fn writer(&self) -> Option<mpsc::UnboundedSender<WriterMessage>> {
        let mut slot = match self.writer.lock() {
            Ok(slot) => slot,
            Err(e) => {
                warn!("⚠️ {}", ReadAloudError::from(e));
                return None;
            }
        };
        if let Some(tx) = slot.as_ref().filter(|tx| !tx.is_closed()) {
            return Some(tx.clone());
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("⚠️ No async runtime, durable preference save skipped");
            return None;
        };
        let (tx, rx) = mpsc::unbounded_channel();
        handle.spawn(run_writer(self.backend.clone(), rx));
        *slot = Some(tx.clone());
        Some(tx)
    }
}
