//! System speech engine backed by espeak-ng

use super::{EngineEvent, EngineEventKind, EventSender, SpeechEngine, Utterance, Voice};
use anyhow::{anyhow, Result};
use std::process::{Command, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

const PROGRAMS: &[&str] = &["espeak-ng", "espeak"];

/// espeak-ng speaking speed at rate 1.0
const BASE_WORDS_PER_MINUTE: f64 = 175.0;

#[derive(Debug)]
pub struct SystemEngine {
    program: Option<String>,
    voices: Vec<Voice>,
    events: EventSender,
    current: Option<oneshot::Sender<()>>,
}

impl SystemEngine {
    pub fn new(events: EventSender) -> Self {
        let program = PROGRAMS
            .iter()
            .find(|p| {
                Command::new(p)
                    .arg("--version")
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status()
                    .is_ok_and(|s| s.success())
            })
            .map(|p| p.to_string());

        let voices = match &program {
            Some(p) => {
                let voices = list_voices(p);
                info!("🔊 Using {} with {} voices", p, voices.len());
                voices
            }
            None => {
                warn!("⚠️ No system TTS command found (tried espeak-ng, espeak)");
                Vec::new()
            }
        };

        Self {
            program,
            voices,
            events,
            current: None,
        }
    }
}

/// Map a relative rate to espeak-ng's words per minute
pub fn words_per_minute(rate: f64) -> u32 {
    (BASE_WORDS_PER_MINUTE * rate).round().clamp(80.0, 450.0) as u32
}

fn list_voices(program: &str) -> Vec<Voice> {
    match Command::new(program).arg("--voices").output() {
        Ok(output) => parse_voice_list(&String::from_utf8_lossy(&output.stdout)),
        Err(e) => {
            warn!("Could not list voices from {}: {}", program, e);
            Vec::new()
        }
    }
}

/// Parse `espeak-ng --voices` output:
/// `Pty Language Age/Gender VoiceName File Other Languages`
pub fn parse_voice_list(listing: &str) -> Vec<Voice> {
    listing
        .lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            let name = cols.get(3)?;
            Some(Voice {
                id: name.to_string(),
                language: cols.get(1).map(|l| l.to_string()),
            })
        })
        .collect()
}

impl SpeechEngine for SystemEngine {
    fn speak(&mut self, utterance: &Utterance) -> Result<()> {
        self.cancel();

        let program = self
            .program
            .clone()
            .ok_or_else(|| anyhow!("No system TTS command found (tried espeak-ng, espeak)"))?;
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| anyhow!("System speech requires a tokio runtime"))?;
        let _guard = handle.enter();

        let mut cmd = tokio::process::Command::new(&program);
        cmd.arg("-s")
            .arg(words_per_minute(utterance.rate).to_string())
            .arg("--stdin")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(voice) = &utterance.voice {
            cmd.arg("-v").arg(&voice.id);
        }
        let mut child = cmd.spawn()?;
        debug!("System speaking: {}", utterance.text);

        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let events = self.events.clone();
        let id = utterance.id;
        let text = utterance.text.clone();
        let _ = events.send(EngineEvent::boundary(id, 0));

        handle.spawn(async move {
            if let Some(mut stdin) = child.stdin.take() {
                if let Err(e) = stdin.write_all(text.as_bytes()).await {
                    warn!("Failed to feed text to {}: {}", program, e);
                }
            }
            let cancelled = tokio::select! {
                status = child.wait() => {
                    let kind = match status {
                        Ok(s) if s.success() => EngineEventKind::End,
                        Ok(s) => EngineEventKind::Error(format!("{} exited with {}", program, s)),
                        Err(e) => EngineEventKind::Error(e.to_string()),
                    };
                    let _ = events.send(EngineEvent { utterance: id, kind });
                    false
                }
                _ = cancel_rx => true,
            };
            if cancelled {
                let _ = child.kill().await;
                debug!("Utterance {:?} cancelled", id);
            }
        });

        self.current = Some(cancel_tx);
        Ok(())
    }

    fn cancel(&mut self) {
        if let Some(tx) = self.current.take() {
            let _ = tx.send(());
        }
    }

    fn voices(&self) -> Vec<Voice> {
        self.voices.clone()
    }

    fn name(&self) -> &str {
        "system"
    }
}
