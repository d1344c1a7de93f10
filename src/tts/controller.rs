//! Speech Controller
//!
//! Owns the host engine and the single live speech session.
//!
//! ```text
//!   Idle ──speak──▶ Speaking ──pause──▶ Paused
//!    ▲                │  ▲                │
//!    │   end / stop   │  └────resume──────┘
//!    └────────────────┘     (restart at the paused word)
//! ```
//!
//! Every `speak` cancels the engine and clears highlights before anything
//! else, so at most one utterance is ever audible and a stale highlight never
//! outlives its session. Pausing cancels too: resuming restarts from the
//! tracked word rather than relying on a native resume.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{EngineEvent, EngineEventKind, SpeechEngine, Utterance, UtteranceId, Voice};
use crate::dom::{DomAnchor, Document, NodeId};
use crate::error::{ReadAloudError, ReadAloudResult};
use crate::page::{UnitKind, WordUnit};
use crate::prefs::Preferences;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Speaking,
    Paused,
}

/// What a session is reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechSource {
    /// The current view, word by word
    Page,
    /// A clicked element, highlighted as a whole
    Element(NodeId),
    /// A one-shot phrase such as an announcement
    Phrase,
}

/// Whether the engine is on ordinary words or on an image description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Reading,
    Describing { image: NodeId },
}

/// Reactive snapshot published on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackStatus {
    pub state: PlaybackState,
    pub current_index: Option<usize>,
    pub phase: SessionPhase,
}

impl PlaybackStatus {
    pub fn idle() -> Self {
        Self {
            state: PlaybackState::Idle,
            current_index: None,
            phase: SessionPhase::Reading,
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.state == PlaybackState::Speaking
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpokenUnit {
    pub text: String,
    pub anchor: Option<DomAnchor>,
    pub kind: UnitKind,
}

impl From<&WordUnit> for SpokenUnit {
    fn from(unit: &WordUnit) -> Self {
        Self {
            text: unit.text.clone(),
            anchor: Some(unit.anchor.clone()),
            kind: unit.kind,
        }
    }
}

fn plain_words(text: &str) -> Arc<[SpokenUnit]> {
    text.split_whitespace()
        .map(|word| SpokenUnit {
            text: word.to_string(),
            anchor: None,
            kind: UnitKind::Word,
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct SpeechRequest {
    source: SpeechSource,
    units: Arc<[SpokenUnit]>,
    start_index: usize,
}

impl SpeechRequest {
    /// Read the page's word units starting at `start_index`
    pub fn page(units: &[WordUnit], start_index: usize) -> Self {
        Self {
            source: SpeechSource::Page,
            units: units.iter().map(SpokenUnit::from).collect(),
            start_index,
        }
    }

    /// Read a clicked element's content from its first word
    pub fn element(node: NodeId, content: &str) -> Self {
        Self {
            source: SpeechSource::Element(node),
            units: plain_words(content),
            start_index: 0,
        }
    }

    pub fn phrase(text: &str) -> Self {
        Self {
            source: SpeechSource::Phrase,
            units: plain_words(text),
            start_index: 0,
        }
    }

    pub fn source(&self) -> SpeechSource {
        self.source
    }

    pub fn start_index(&self) -> usize {
        self.start_index
    }

    pub fn is_empty(&self) -> bool {
        self.start_index >= self.units.len()
    }
}

#[derive(Debug)]
struct SpeechSession {
    source: SpeechSource,
    units: Arc<[SpokenUnit]>,
    start_index: usize,
    current_index: Option<usize>,
    state: PlaybackState,
    phase: SessionPhase,
    /// Live utterance; `None` while paused
    utterance: Option<UtteranceId>,
    source_text: String,
    /// Char offset in `source_text` of each unit from `start_index` on
    offsets: Vec<usize>,
}

impl SpeechSession {
    /// Unit being spoken at a char offset of the utterance
    fn index_at(&self, char_index: usize) -> usize {
        let spoken = self.offsets.partition_point(|o| *o <= char_index).max(1);
        (self.start_index + spoken - 1).min(self.units.len().saturating_sub(1))
    }
}

#[derive(Debug)]
pub struct SpeechController {
    engine: Box<dyn SpeechEngine>,
    voices: Vec<Voice>,
    session: Option<SpeechSession>,
    next_utterance: u64,
    highlight_class: String,
    status_tx: watch::Sender<PlaybackStatus>,
}

impl SpeechController {
    pub fn new(engine: Box<dyn SpeechEngine>, highlight_class: &str) -> Self {
        let (status_tx, _) = watch::channel(PlaybackStatus::idle());
        let mut controller = Self {
            engine,
            voices: Vec::new(),
            session: None,
            next_utterance: 0,
            highlight_class: highlight_class.to_string(),
            status_tx,
        };
        controller.refresh_voices();
        controller
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Re-read the host's voice list
    pub fn refresh_voices(&mut self) -> &[Voice] {
        self.voices = self.engine.voices();
        debug!("{} voices available", self.voices.len());
        &self.voices
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    /// The voice with this id, else the first available
    pub fn resolve_voice(&self, voice_id: &str) -> Option<Voice> {
        self.voices
            .iter()
            .find(|v| v.id == voice_id)
            .or_else(|| self.voices.first())
            .cloned()
    }

    pub fn status(&self) -> PlaybackStatus {
        match &self.session {
            Some(session) => PlaybackStatus {
                state: session.state,
                current_index: session.current_index,
                phase: session.phase,
            },
            None => PlaybackStatus::idle(),
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.status().state
    }

    pub fn is_speaking(&self) -> bool {
        self.state() == PlaybackState::Speaking
    }

    pub fn current_index(&self) -> Option<usize> {
        self.session.as_ref().and_then(|s| s.current_index)
    }

    pub fn source(&self) -> Option<SpeechSource> {
        self.session.as_ref().map(|s| s.source)
    }

    /// Text handed to the engine for the live session
    pub fn source_text(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.source_text.as_str())
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackStatus> {
        self.status_tx.subscribe()
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.status());
    }

    /// Start speaking, superseding whatever is live
    pub fn speak(
        &mut self,
        doc: &mut Document,
        request: SpeechRequest,
        prefs: &Preferences,
    ) -> ReadAloudResult<UtteranceId> {
        self.clear_highlights(doc);
        self.engine.cancel();
        self.session = None;

        if request.is_empty() {
            self.publish();
            return Err(ReadAloudError::EmptyContent);
        }

        if self.voices.is_empty() {
            self.refresh_voices();
        }
        if self.voices.is_empty() {
            self.publish();
            return Err(ReadAloudError::EngineUnavailable(format!(
                "{} offers no voices",
                self.engine.name()
            )));
        }

        let mut source_text = String::new();
        let mut offsets = Vec::with_capacity(request.units.len() - request.start_index);
        let mut chars = 0;
        for unit in &request.units[request.start_index..] {
            if !source_text.is_empty() {
                source_text.push(' ');
                chars += 1;
            }
            offsets.push(chars);
            source_text.push_str(&unit.text);
            chars += unit.text.chars().count();
        }

        let id = UtteranceId(self.next_utterance);
        self.next_utterance += 1;
        let utterance = Utterance {
            id,
            text: source_text.clone(),
            rate: prefs.rate,
            voice: self.resolve_voice(&prefs.voice_id),
        };

        if let Err(e) = self.engine.speak(&utterance) {
            warn!("⚠️ Speech engine refused utterance: {}", e);
            self.publish();
            return Err(ReadAloudError::EngineUnavailable(e.to_string()));
        }

        if let SpeechSource::Element(node) = request.source {
            if prefs.highlight_enabled {
                self.mark(doc, DomAnchor::element(node));
            }
        }

        info!(
            "🗣️ Speaking {:?} from word {} ({} words)",
            request.source,
            request.start_index,
            offsets.len()
        );
        self.session = Some(SpeechSession {
            source: request.source,
            units: request.units,
            start_index: request.start_index,
            current_index: Some(request.start_index),
            state: PlaybackState::Speaking,
            phase: SessionPhase::Reading,
            utterance: Some(id),
            source_text,
            offsets,
        });
        self.publish();
        Ok(id)
    }

    /// Silence the engine but keep the position for `resume`
    pub fn pause(&mut self) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if session.state != PlaybackState::Speaking {
            return false;
        }
        self.engine.cancel();
        session.state = PlaybackState::Paused;
        session.utterance = None;
        debug!("⏸️ Paused at word {:?}", session.current_index);
        self.publish();
        true
    }

    /// Restart a paused session at the word it was paused on
    pub fn resume(
        &mut self,
        doc: &mut Document,
        prefs: &Preferences,
    ) -> ReadAloudResult<Option<UtteranceId>> {
        if self.state() != PlaybackState::Paused {
            return Ok(None);
        }
        let Some(session) = self.session.take() else {
            return Ok(None);
        };
        let request = SpeechRequest {
            source: session.source,
            start_index: session.current_index.unwrap_or(session.start_index),
            units: session.units,
        };
        self.speak(doc, request, prefs).map(Some)
    }

    /// Unconditional cancel back to idle
    pub fn stop(&mut self, doc: &mut Document) {
        self.engine.cancel();
        self.clear_highlights(doc);
        if self.session.take().is_some() {
            debug!("⏹️ Speech stopped");
        }
        self.publish();
    }

    /// Apply engine progress. Events for anything but the live utterance are
    /// dropped.
    pub fn handle_event(&mut self, doc: &mut Document, prefs: &Preferences, event: EngineEvent) {
        let live = self.session.as_ref().is_some_and(|s| {
            s.state == PlaybackState::Speaking && s.utterance == Some(event.utterance)
        });
        if !live {
            debug!("Ignoring stale event for {:?}", event.utterance);
            return;
        }

        match event.kind {
            EngineEventKind::Boundary { char_index } => self.on_boundary(doc, prefs, char_index),
            EngineEventKind::End => {
                debug!("✅ Utterance {:?} finished", event.utterance);
                self.finish(doc);
            }
            EngineEventKind::Error(msg) => {
                warn!("⚠️ Utterance {:?} failed: {}", event.utterance, msg);
                self.finish(doc);
            }
        }
    }

    fn on_boundary(&mut self, doc: &mut Document, prefs: &Preferences, char_index: usize) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let index = session.index_at(char_index);
        session.current_index = Some(index);

        let unit = &session.units[index];
        session.phase = match (unit.kind, &unit.anchor) {
            (UnitKind::ImageDescription, Some(anchor)) => SessionPhase::Describing {
                image: anchor.node,
            },
            _ => SessionPhase::Reading,
        };
        let anchor = match session.source {
            SpeechSource::Page => unit.anchor.clone(),
            _ => None,
        };

        if prefs.highlight_enabled {
            if let Some(anchor) = anchor {
                self.mark(doc, anchor);
            }
        }
        self.publish();
    }

    fn finish(&mut self, doc: &mut Document) {
        self.clear_highlights(doc);
        self.session = None;
        self.publish();
    }

    /// Remove every highlight mark from the page
    pub fn clear_highlights(&self, doc: &mut Document) {
        for node in doc.elements_with_class(&self.highlight_class) {
            doc.remove_class(node, &self.highlight_class);
        }
        doc.set_highlight(None);
    }

    fn mark(&self, doc: &mut Document, anchor: DomAnchor) {
        self.clear_highlights(doc);
        if let Some(element) = doc.anchor_element(&anchor) {
            if doc.is_attached(element) {
                doc.add_class(element, &self.highlight_class);
            }
        }
        doc.set_highlight(Some(anchor));
    }
}
