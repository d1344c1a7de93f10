//! ReadAloud session
//!
//! Wires the page reader together for one application session: the speech
//! controller, word index, click binder, navigation announcer and user
//! preferences. UI code talks only to this type.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::announcer::{Announcement, NavigationAnnouncer};
use crate::binder::{ClickResolution, InteractionBinder, TEXT_INPUT_TAGS};
use crate::config::Config;
use crate::dom::{Document, NodeId};
use crate::error::{ReadAloudError, ReadAloudResult};
use crate::page::{PageTextExtractor, ViewGeneration, WordIndexer, WordUnit};
use crate::prefs::{PreferenceStore, Preferences};
use crate::tts::{
    EngineEvent, PlaybackState, PlaybackStatus, SpeechController, SpeechEngine, SpeechRequest,
    SpeechSource, UtteranceId, Voice,
};

/// What a click-to-speak click did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    Spoken {
        element: NodeId,
        utterance: UtteranceId,
    },
    /// Click-to-speak is switched off
    Disabled,
    /// The click never reached the reader's listener
    NotBound,
    IgnoredRegion,
    NotReadable,
    EmptyContent,
    EngineUnavailable,
}

/// Key names that toggle reading
const TOGGLE_KEYS: &[&str] = &[" ", "Space", "space", "Spacebar"];

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

#[derive(Debug)]
pub struct ReadAloud {
    controller: SpeechController,
    indexer: WordIndexer,
    binder: InteractionBinder,
    announcer: NavigationAnnouncer,
    store: PreferenceStore,
    prefs: Preferences,
    user: Option<String>,
    route: Option<String>,
    voice_menu_size: usize,
    /// View the current page session was indexed from
    page_view: Option<ViewGeneration>,
}

impl ReadAloud {
    /// Create a session. Preferences start from the local cache so they apply
    /// before any durable record is loaded.
    pub fn new(engine: Box<dyn SpeechEngine>, store: PreferenceStore, config: &Config) -> Self {
        let extractor = PageTextExtractor::from_config(config);
        let prefs = store.cached();
        info!(
            "🐧 ReadAloud ready (engine: {}, rate: {}, voice: '{}')",
            engine.name(),
            prefs.rate,
            prefs.voice_id
        );
        Self {
            controller: SpeechController::new(engine, &config.highlight_class),
            indexer: WordIndexer::new(extractor.clone()),
            binder: InteractionBinder::new(extractor),
            announcer: NavigationAnnouncer::new(),
            store,
            prefs,
            user: None,
            route: None,
            voice_menu_size: config.voice_menu_size,
            page_view: None,
        }
    }

    // Lifecycle

    /// Hook the reader into a freshly rendered document
    pub fn attach(&mut self, doc: &mut Document) {
        self.indexer.invalidate();
        if self.prefs.click_to_speak_enabled {
            self.binder.bind(doc);
        } else {
            self.binder.unbind(doc);
        }
    }

    /// Route change or re-render. Returns the announcement spoken, if any.
    pub fn navigate(&mut self, doc: &mut Document, route: &str) -> Option<Announcement> {
        if self.route.as_deref() != Some(route) {
            debug!("Route changed to {}", route);
            if self.controller.source() == Some(SpeechSource::Page) {
                self.controller.stop(doc);
            }
            self.route = Some(route.to_string());
        }
        self.attach(doc);

        let announcement = self
            .announcer
            .on_route_change(route, self.prefs.announce_enabled)?;
        info!("📢 {}", announcement.rendered_phrase);
        if let Err(e) = self.speak_text(doc, &announcement.rendered_phrase) {
            debug!("Announcement not spoken: {}", e);
        }
        Some(announcement)
    }

    /// Readable content changed without a route change (async load)
    pub fn content_changed(&mut self, doc: &mut Document) {
        self.indexer.invalidate();
        if self.prefs.click_to_speak_enabled {
            self.binder.ensure_bound(doc);
        }
    }

    /// Load the signed-in user's durable preferences
    pub async fn sign_in(&mut self, user_id: &str) -> &Preferences {
        self.prefs = self.store.load(Some(user_id)).await;
        self.user = Some(user_id.to_string());
        &self.prefs
    }

    /// Back to local-only preferences
    pub fn sign_out(&mut self) {
        self.user = None;
    }

    // Speech controls

    /// Read the current view from the top
    pub fn speak_current_view(&mut self, doc: &mut Document) -> ReadAloudResult<UtteranceId> {
        self.speak_from(doc, 0)
    }

    /// Read the current view starting at a word index
    pub fn speak_from(&mut self, doc: &mut Document, index: usize) -> ReadAloudResult<UtteranceId> {
        let units = self.indexer.index(doc);
        self.page_view = Some(self.indexer.generation(doc));
        self.controller
            .speak(doc, SpeechRequest::page(&units, index), &self.prefs)
    }

    /// Speak a one-shot phrase
    pub fn speak_text(&mut self, doc: &mut Document, text: &str) -> ReadAloudResult<UtteranceId> {
        self.controller
            .speak(doc, SpeechRequest::phrase(text), &self.prefs)
    }

    pub fn pause(&mut self) -> bool {
        self.controller.pause()
    }

    /// Continue a paused session. A paused page read whose view changed in
    /// the meantime restarts from the same word position of the fresh index.
    pub fn resume(&mut self, doc: &mut Document) -> ReadAloudResult<Option<UtteranceId>> {
        if self.controller.state() == PlaybackState::Paused
            && self.controller.source() == Some(SpeechSource::Page)
            && self.page_view != Some(self.indexer.generation(doc))
        {
            let paused_at = self.controller.current_index().unwrap_or(0);
            let len = self.indexer.index(doc).len();
            debug!("View changed while paused, re-indexed {} words", len);
            return self
                .speak_from(doc, paused_at.min(len.saturating_sub(1)))
                .map(Some);
        }
        self.controller.resume(doc, &self.prefs)
    }

    pub fn stop(&mut self, doc: &mut Document) {
        self.controller.stop(doc);
    }

    /// Play/pause: pause while speaking, resume when paused, else read the page
    pub fn toggle(&mut self, doc: &mut Document) -> ReadAloudResult<PlaybackState> {
        match self.controller.state() {
            PlaybackState::Speaking => {
                self.pause();
            }
            PlaybackState::Paused => {
                self.resume(doc)?;
            }
            PlaybackState::Idle => {
                self.speak_current_view(doc)?;
            }
        }
        Ok(self.controller.state())
    }

    /// Global hotkey. Returns whether the key was consumed.
    pub fn handle_key(&mut self, doc: &mut Document, key: &str, focus: Option<NodeId>) -> bool {
        if !TOGGLE_KEYS.contains(&key) {
            return false;
        }
        let typing = focus.is_some_and(|node| {
            doc.closest(node, |el| {
                TEXT_INPUT_TAGS.contains(&el.tag())
                    || el
                        .attribute("contenteditable")
                        .is_some_and(|v| v != "false")
            })
            .is_some()
        });
        if typing {
            return false;
        }
        if let Err(e) = self.toggle(doc) {
            debug!("Toggle did not start speech: {}", e);
        }
        true
    }

    /// Click-to-speak dispatch for a click on `target`
    pub fn click(&mut self, doc: &mut Document, target: NodeId) -> ClickOutcome {
        if !self.prefs.click_to_speak_enabled {
            return ClickOutcome::Disabled;
        }
        let reached = doc
            .click_listeners(target)
            .into_iter()
            .any(|id| self.binder.owns(id));
        if !reached {
            return ClickOutcome::NotBound;
        }

        match self.binder.resolve(doc, target) {
            ClickResolution::Readable { element, content } => {
                debug!("Clicked {:?}: '{}'", element, content);
                match self.controller.speak(
                    doc,
                    SpeechRequest::element(element, &content),
                    &self.prefs,
                ) {
                    Ok(utterance) => ClickOutcome::Spoken { element, utterance },
                    Err(ReadAloudError::EmptyContent) => ClickOutcome::EmptyContent,
                    Err(e) => {
                        warn!("⚠️ Click-to-speak failed: {}", e);
                        ClickOutcome::EngineUnavailable
                    }
                }
            }
            ClickResolution::IgnoredRegion => ClickOutcome::IgnoredRegion,
            ClickResolution::NotReadable => ClickOutcome::NotReadable,
            ClickResolution::EmptyContent => ClickOutcome::EmptyContent,
        }
    }

    /// Feed engine progress back in from the host event loop
    pub fn handle_engine_event(&mut self, doc: &mut Document, event: EngineEvent) {
        self.controller.handle_event(doc, &self.prefs, event);
    }

    // Settings

    fn persist(&mut self) {
        self.store.persist(self.user.clone(), self.prefs.clone());
    }

    fn confirm(&mut self, doc: &mut Document, phrase: &str) {
        if let Err(e) = self.speak_text(doc, phrase) {
            debug!("Confirmation not spoken: {}", e);
        }
    }

    /// Wait for outstanding durable saves
    pub async fn flush(&mut self) {
        self.store.flush().await;
    }

    /// Change the speech rate. Non-positive or non-finite rates are rejected.
    pub fn set_rate(&mut self, doc: &mut Document, rate: f64) -> bool {
        let Some(rate) = Preferences::normalize_rate(rate) else {
            warn!("⚠️ Ignoring invalid speech rate {}", rate);
            return false;
        };
        self.prefs.rate = rate;
        self.persist();
        self.confirm(doc, &format!("Speed: {}", rate));
        true
    }

    /// Change the voice. The id must name one of the host's voices.
    pub fn set_voice(&mut self, doc: &mut Document, voice_id: &str) -> bool {
        let Some(position) = self
            .controller
            .voices()
            .iter()
            .position(|v| v.id == voice_id)
        else {
            warn!("⚠️ Unknown voice '{}'", voice_id);
            return false;
        };
        self.prefs.voice_id = voice_id.to_string();
        self.persist();
        let label = if position < self.voice_menu_size {
            format!("Voice {}", position + 1)
        } else {
            voice_id.to_string()
        };
        self.confirm(doc, &format!("Voice: {}", label));
        true
    }

    pub fn set_highlight_enabled(&mut self, doc: &mut Document, enabled: bool) {
        self.prefs.highlight_enabled = enabled;
        if !enabled {
            self.controller.clear_highlights(doc);
        }
        self.persist();
        self.confirm(doc, &format!("Highlight {}", on_off(enabled)));
    }

    pub fn set_announce_enabled(&mut self, doc: &mut Document, enabled: bool) {
        self.prefs.announce_enabled = enabled;
        self.persist();
        self.confirm(doc, &format!("Announce Page {}", on_off(enabled)));
    }

    pub fn set_click_to_speak_enabled(&mut self, doc: &mut Document, enabled: bool) {
        self.prefs.click_to_speak_enabled = enabled;
        if enabled {
            self.binder.ensure_bound(doc);
        } else {
            self.binder.unbind(doc);
        }
        self.persist();
        self.confirm(doc, &format!("Click to speak {}", on_off(enabled)));
    }

    // State

    pub fn preferences(&self) -> &Preferences {
        &self.prefs
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }

    pub fn is_speaking(&self) -> bool {
        self.controller.is_speaking()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.controller.current_index()
    }

    pub fn state(&self) -> PlaybackState {
        self.controller.state()
    }

    pub fn status(&self) -> PlaybackStatus {
        self.controller.status()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackStatus> {
        self.controller.subscribe()
    }

    pub fn controller(&self) -> &SpeechController {
        &self.controller
    }

    /// Re-read the host's voices (voices-changed notification)
    pub fn refresh_voices(&mut self) -> &[Voice] {
        self.controller.refresh_voices()
    }

    pub fn voices(&self) -> &[Voice] {
        self.controller.voices()
    }

    /// The voices offered in the settings menu, labelled `Voice 1..n`
    pub fn voice_menu(&self) -> Vec<(String, Voice)> {
        self.controller
            .voices()
            .iter()
            .take(self.voice_menu_size)
            .enumerate()
            .map(|(i, v)| (format!("Voice {}", i + 1), v.clone()))
            .collect()
    }

    /// The current view as it will be read
    pub fn page_text(&self, doc: &Document) -> String {
        self.indexer.extractor().extract(doc)
    }

    pub fn word_units(&mut self, doc: &Document) -> Arc<[WordUnit]> {
        self.indexer.index(doc)
    }
}
