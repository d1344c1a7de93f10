//! Mock Speech Engine for Testing
//!
//! Records every utterance and cancel so tests can check what was spoken
//! and that two utterances were never audible at once.

use anyhow::Result;
use readaloud::tts::{SpeechEngine, Utterance, UtteranceId, Voice};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub struct EngineLog {
    pub spoken: Vec<Utterance>,
    pub cancels: usize,
    pub active: Option<UtteranceId>,
    /// Set if `speak` ever ran while another utterance was still active
    pub overlapped: bool,
}

/// Mock engine that records utterances instead of playing them
#[derive(Debug, Clone)]
pub struct MockEngine {
    pub log: Arc<Mutex<EngineLog>>,
    pub voices: Arc<Mutex<Vec<Voice>>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::with_voices(&["Voice 1", "Voice 2", "Voice 3"])
    }

    pub fn with_voices(names: &[&str]) -> Self {
        Self {
            log: Arc::new(Mutex::new(EngineLog::default())),
            voices: Arc::new(Mutex::new(names.iter().map(|n| Voice::new(n)).collect())),
        }
    }

    /// An engine with no voices, as when the host has no speech support
    pub fn unavailable() -> Self {
        Self::with_voices(&[])
    }

    pub fn boxed(&self) -> Box<dyn SpeechEngine> {
        Box::new(self.clone())
    }

    pub fn spoken_texts(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .spoken
            .iter()
            .map(|u| u.text.clone())
            .collect()
    }

    pub fn last(&self) -> Option<Utterance> {
        self.log.lock().unwrap().spoken.last().cloned()
    }

    pub fn was_spoken(&self, text: &str) -> bool {
        self.spoken_texts().iter().any(|s| s == text)
    }

    pub fn cancels(&self) -> usize {
        self.log.lock().unwrap().cancels
    }

    pub fn overlapped(&self) -> bool {
        self.log.lock().unwrap().overlapped
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechEngine for MockEngine {
    fn speak(&mut self, utterance: &Utterance) -> Result<()> {
        if self.voices.lock().unwrap().is_empty() {
            return Err(anyhow::anyhow!("Mock engine has no voices"));
        }
        let mut log = self.log.lock().unwrap();
        if log.active.is_some() {
            log.overlapped = true;
        }
        log.active = Some(utterance.id);
        log.spoken.push(utterance.clone());
        Ok(())
    }

    fn cancel(&mut self) {
        let mut log = self.log.lock().unwrap();
        log.cancels += 1;
        log.active = None;
    }

    fn voices(&self) -> Vec<Voice> {
        self.voices.lock().unwrap().clone()
    }

    fn name(&self) -> &str {
        "mock"
    }
}
