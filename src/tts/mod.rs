//! TTS (Text-to-Speech) Module
//!
//! The host speech engine seam plus the controller that owns it.

use crate::config::Config;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

pub mod controller;
pub mod system;

pub use controller::{
    PlaybackState, PlaybackStatus, SessionPhase, SpeechController, SpeechRequest, SpeechSource,
    SpokenUnit,
};

/// Identifies one utterance handed to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UtteranceId(pub u64);

/// A voice offered by the host engine. The id is the voice name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub id: String,
    pub language: Option<String>,
}

impl Voice {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            language: None,
        }
    }
}

/// One request to vocalize a string with a given voice and rate
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub id: UtteranceId,
    pub text: String,
    pub rate: f64,
    pub voice: Option<Voice>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEventKind {
    /// The engine reached the word starting at this char offset
    Boundary { char_index: usize },
    End,
    Error(String),
}

/// Progress reported by an engine, delivered through the host event loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineEvent {
    pub utterance: UtteranceId,
    pub kind: EngineEventKind,
}

impl EngineEvent {
    pub fn boundary(utterance: UtteranceId, char_index: usize) -> Self {
        Self {
            utterance,
            kind: EngineEventKind::Boundary { char_index },
        }
    }

    pub fn end(utterance: UtteranceId) -> Self {
        Self {
            utterance,
            kind: EngineEventKind::End,
        }
    }
}

pub type EventSender = UnboundedSender<EngineEvent>;

/// Trait for host speech engines
///
/// Only the [`SpeechController`] talks to an engine. `speak` starts an
/// utterance and returns immediately; progress arrives later as
/// [`EngineEvent`]s.
pub trait SpeechEngine: Send + std::fmt::Debug {
    /// Start speaking an utterance
    fn speak(&mut self, utterance: &Utterance) -> Result<()>;

    /// Silence whatever is being spoken
    fn cancel(&mut self);

    /// Voices currently offered by the host
    fn voices(&self) -> Vec<Voice>;

    /// Get the engine name
    fn name(&self) -> &str;
}

/// Factory to create the configured speech engine
pub fn create_engine(config: &Config, events: EventSender) -> Box<dyn SpeechEngine> {
    info!("🛠️ Creating speech engine: {}", config.tts_engine);
    let engine: Box<dyn SpeechEngine> = match config.tts_engine.as_str() {
        "system" | "espeak" | "espeak-ng" => Box::new(system::SystemEngine::new(events)),
        _ => {
            warn!(
                "  - Unknown engine '{}', falling back to System",
                config.tts_engine
            );
            Box::new(system::SystemEngine::new(events))
        }
    };
    info!("✅ Speech engine '{}' initialized", engine.name());
    engine
}
