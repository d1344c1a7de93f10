use async_trait::async_trait;
use readaloud::dom::Document;
use readaloud::prefs::{LocalCache, MemoryBackend, PreferenceBackend, PreferenceStore, Preferences};
use readaloud::tts::{EngineEvent, PlaybackState};
use readaloud::{ClickOutcome, ReadAloud, ReadAloudResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

mod common;
use common::{MockEngine, TestContext, LESSON_PAGE};

const HIGHLIGHT: &str = "tts-highlight";

fn quiet() -> Preferences {
    Preferences {
        announce_enabled: false,
        ..Preferences::default()
    }
}

fn lesson() -> Document {
    Document::parse(LESSON_PAGE).unwrap()
}

#[test]
fn test_page_text_skips_controls_and_ignored_regions() {
    let ctx = TestContext::new();
    let engine = MockEngine::new();
    let reader = ctx.reader(&engine);
    let doc = lesson();

    let text = reader.page_text(&doc);
    assert!(text.contains("Rhythm basics"));
    assert!(text.contains("A quarter note lasts one beat in common time."));
    assert!(text.contains("Two eighth notes Two eighth notes beamed fill the same beat."));
    assert!(!text.contains("Play"));
    assert!(!text.contains("Sidebar"));
}

#[test]
fn test_navigation_announces_once_per_route() {
    let ctx = TestContext::new();
    let engine = MockEngine::new();
    let mut reader = ctx.reader(&engine);
    let mut doc = lesson();
    let route = "/Lessons/Rhythm/Lesson1-Rhythmic-Values";

    let announcement = reader.navigate(&mut doc, route).unwrap();
    assert_eq!(
        announcement.rendered_phrase,
        "You are on the Lesson1 Rhythmic Values page"
    );
    // Re-render of the same route
    assert!(reader.navigate(&mut doc, route).is_none());
    assert!(reader.navigate(&mut doc, route).is_none());

    assert_eq!(
        engine.spoken_texts(),
        vec!["You are on the Lesson1 Rhythmic Values page".to_string()]
    );
    assert_eq!(reader.route(), Some(route));

    reader.navigate(&mut doc, "/SheetMusicTools/MusicLibrary");
    assert!(engine.was_spoken("You are on the Music Library page"));
}

#[test]
fn test_navigation_without_announcements() {
    let ctx = TestContext::new();
    ctx.seed(&quiet());
    let engine = MockEngine::new();
    let mut reader = ctx.reader(&engine);
    let mut doc = lesson();

    assert!(reader.navigate(&mut doc, "/Lessons").is_none());
    assert!(engine.spoken_texts().is_empty());
}

#[test]
fn test_route_change_stops_page_reading() {
    let ctx = TestContext::new();
    ctx.seed(&quiet());
    let engine = MockEngine::new();
    let mut reader = ctx.reader(&engine);
    let mut doc = lesson();

    reader.navigate(&mut doc, "/Lessons");
    reader.speak_current_view(&mut doc).unwrap();
    assert!(reader.is_speaking());

    // Same route re-render keeps reading
    reader.navigate(&mut doc, "/Lessons");
    assert!(reader.is_speaking());

    reader.navigate(&mut doc, "/Profile");
    assert_eq!(reader.state(), PlaybackState::Idle);
    assert!(doc.elements_with_class(HIGHLIGHT).is_empty());
}

#[test]
fn test_click_reads_element_and_highlights_it() {
    let ctx = TestContext::new();
    let engine = MockEngine::new();
    let mut reader = ctx.reader(&engine);
    let mut doc = lesson();
    reader.attach(&mut doc);

    let p = doc.elements_by_tag("p")[0];
    match reader.click(&mut doc, p) {
        ClickOutcome::Spoken { element, .. } => assert_eq!(element, p),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(
        engine.last().unwrap().text,
        "A quarter note lasts one beat in common time."
    );
    assert!(doc.element(p).unwrap().has_class(HIGHLIGHT));

    let input = doc.elements_by_tag("input")[0];
    assert!(matches!(
        reader.click(&mut doc, input),
        ClickOutcome::Spoken { .. }
    ));
    assert_eq!(engine.last().unwrap().text, "Your answer");
    assert!(!doc.element(p).unwrap().has_class(HIGHLIGHT));
    assert_eq!(doc.elements_with_class(HIGHLIGHT), vec![input]);
    assert!(!engine.overlapped());
}

#[test]
fn test_click_on_empty_alt_image_is_silent() {
    let ctx = TestContext::new();
    let engine = MockEngine::new();
    let mut reader = ctx.reader(&engine);
    let mut doc = lesson();
    reader.attach(&mut doc);

    let empty_img = doc.elements_by_tag("img")[1];
    assert_eq!(reader.click(&mut doc, empty_img), ClickOutcome::EmptyContent);
    assert!(engine.spoken_texts().is_empty());
    assert!(doc.elements_with_class(HIGHLIGHT).is_empty());
    assert_eq!(reader.state(), PlaybackState::Idle);
}

#[test]
fn test_click_in_ignored_regions() {
    let ctx = TestContext::new();
    let engine = MockEngine::new();
    let mut reader = ctx.reader(&engine);
    let mut doc = lesson();
    reader.attach(&mut doc);

    let play = doc.elements_by_tag("button")[0];
    let sidebar = doc.elements_by_tag("p")[2];
    assert_eq!(reader.click(&mut doc, play), ClickOutcome::IgnoredRegion);
    assert_eq!(reader.click(&mut doc, sidebar), ClickOutcome::IgnoredRegion);
    let body = doc.body();
    assert_eq!(reader.click(&mut doc, body), ClickOutcome::NotReadable);
    assert!(engine.spoken_texts().is_empty());
}

#[test]
fn test_click_before_attach_is_not_bound() {
    let ctx = TestContext::new();
    let engine = MockEngine::new();
    let mut reader = ctx.reader(&engine);
    let mut doc = lesson();

    let p = doc.elements_by_tag("p")[0];
    assert_eq!(reader.click(&mut doc, p), ClickOutcome::NotBound);
}

#[test]
fn test_rerender_does_not_duplicate_listeners() {
    let ctx = TestContext::new();
    ctx.seed(&quiet());
    let engine = MockEngine::new();
    let mut reader = ctx.reader(&engine);
    let mut doc = lesson();

    reader.navigate(&mut doc, "/Lessons");
    reader.navigate(&mut doc, "/Lessons");
    reader.content_changed(&mut doc);
    reader.attach(&mut doc);
    assert_eq!(doc.listener_count(), 1);

    let p = doc.elements_by_tag("p")[0];
    assert!(matches!(reader.click(&mut doc, p), ClickOutcome::Spoken { .. }));
    assert_eq!(engine.spoken_texts().len(), 1);
}

#[test]
fn test_click_to_speak_toggle() {
    let ctx = TestContext::new();
    let engine = MockEngine::new();
    let mut reader = ctx.reader(&engine);
    let mut doc = lesson();
    reader.attach(&mut doc);

    reader.set_click_to_speak_enabled(&mut doc, false);
    assert_eq!(engine.last().unwrap().text, "Click to speak off");
    assert_eq!(doc.listener_count(), 0);
    let p = doc.elements_by_tag("p")[0];
    assert_eq!(reader.click(&mut doc, p), ClickOutcome::Disabled);

    reader.set_click_to_speak_enabled(&mut doc, true);
    assert_eq!(doc.listener_count(), 1);
    assert!(matches!(reader.click(&mut doc, p), ClickOutcome::Spoken { .. }));
}

#[test]
fn test_space_hotkey_toggles_reading() {
    let ctx = TestContext::new();
    let engine = MockEngine::new();
    let mut reader = ctx.reader(&engine);
    let mut doc = lesson();
    reader.attach(&mut doc);

    assert!(reader.handle_key(&mut doc, " ", None));
    assert_eq!(reader.state(), PlaybackState::Speaking);
    let id = engine.last().unwrap().id;
    reader.handle_engine_event(&mut doc, EngineEvent::boundary(id, 7));
    assert_eq!(reader.current_index(), Some(1));

    assert!(reader.handle_key(&mut doc, "Space", None));
    assert_eq!(reader.state(), PlaybackState::Paused);

    assert!(reader.handle_key(&mut doc, " ", None));
    assert_eq!(reader.state(), PlaybackState::Speaking);
    assert!(engine.last().unwrap().text.starts_with("basics A quarter"));

    assert!(!reader.handle_key(&mut doc, "a", None));
    let input = doc.elements_by_tag("input")[0];
    assert!(!reader.handle_key(&mut doc, " ", Some(input)));
    assert_eq!(reader.state(), PlaybackState::Speaking);
    assert!(!engine.overlapped());
}

#[test]
fn test_settings_are_confirmed_aloud() {
    let ctx = TestContext::new();
    let engine = MockEngine::new();
    let mut reader = ctx.reader(&engine);
    let mut doc = lesson();

    assert!(reader.set_rate(&mut doc, 1.75));
    assert!(engine.was_spoken("Speed: 1.75"));
    assert!(reader.set_voice(&mut doc, "Voice 2"));
    assert!(engine.was_spoken("Voice: Voice 2"));
    reader.set_announce_enabled(&mut doc, false);
    assert!(engine.was_spoken("Announce Page off"));
    reader.set_highlight_enabled(&mut doc, true);
    assert!(engine.was_spoken("Highlight on"));

    let before = engine.spoken_texts().len();
    assert!(!reader.set_rate(&mut doc, 0.0));
    assert!(!reader.set_rate(&mut doc, f64::NAN));
    assert!(!reader.set_voice(&mut doc, "Nobody"));
    assert_eq!(engine.spoken_texts().len(), before);
    assert_eq!(reader.preferences().rate, 1.75);
    assert_eq!(reader.preferences().voice_id, "Voice 2");
}

#[test]
fn test_turning_highlight_off_clears_marks() {
    let ctx = TestContext::new();
    let engine = MockEngine::new();
    let mut reader = ctx.reader(&engine);
    let mut doc = lesson();
    reader.attach(&mut doc);

    let p = doc.elements_by_tag("p")[0];
    reader.click(&mut doc, p);
    assert!(doc.element(p).unwrap().has_class(HIGHLIGHT));

    reader.set_highlight_enabled(&mut doc, false);
    assert!(doc.elements_with_class(HIGHLIGHT).is_empty());

    reader.click(&mut doc, p);
    assert!(doc.elements_with_class(HIGHLIGHT).is_empty());
}

#[test]
fn test_voice_menu_labels() {
    let ctx = TestContext::new();
    let engine = MockEngine::with_voices(&["alto", "bass", "tenor", "soprano"]);
    let mut reader = ctx.reader(&engine);
    let mut doc = lesson();

    let labels: Vec<String> = reader.voice_menu().into_iter().map(|(l, _)| l).collect();
    assert_eq!(labels, ["Voice 1", "Voice 2", "Voice 3"]);

    assert!(reader.set_voice(&mut doc, "bass"));
    assert!(engine.was_spoken("Voice: Voice 2"));
    assert!(reader.set_voice(&mut doc, "soprano"));
    assert!(engine.was_spoken("Voice: soprano"));
}

#[test]
fn test_unavailable_engine_does_not_break_clicks() {
    let ctx = TestContext::new();
    let engine = MockEngine::unavailable();
    let mut reader = ctx.reader(&engine);
    let mut doc = lesson();
    reader.attach(&mut doc);

    let p = doc.elements_by_tag("p")[0];
    assert_eq!(reader.click(&mut doc, p), ClickOutcome::EngineUnavailable);
    assert_eq!(reader.state(), PlaybackState::Idle);
    assert!(doc.elements_with_class(HIGHLIGHT).is_empty());
    assert!(reader.speak_current_view(&mut doc).is_err());

    // Voices appearing later are picked up
    engine.voices.lock().unwrap().push(readaloud::tts::Voice::new("late"));
    assert_eq!(reader.refresh_voices().len(), 1);
    assert!(matches!(reader.click(&mut doc, p), ClickOutcome::Spoken { .. }));
}

#[test]
fn test_content_changed_reindexes() {
    let ctx = TestContext::new();
    let engine = MockEngine::new();
    let mut reader = ctx.reader(&engine);
    let mut doc = Document::parse("<div id=\"lesson\"><p>Loading</p></div>").unwrap();
    reader.attach(&mut doc);
    assert_eq!(reader.word_units(&doc).len(), 1);

    let div = doc.elements_by_tag("div")[0];
    let p = doc.append_element(div, "p");
    doc.append_text(p, "Dotted notes add half");
    reader.content_changed(&mut doc);

    let units = reader.word_units(&doc);
    assert_eq!(units.len(), 5);
    assert_eq!(units[4].text, "half");
    reader.speak_from(&mut doc, 1).unwrap();
    assert_eq!(engine.last().unwrap().text, "Dotted notes add half");
}

#[test]
fn test_resume_after_content_change_reads_fresh_units() {
    let ctx = TestContext::new();
    ctx.seed(&quiet());
    let engine = MockEngine::new();
    let mut reader = ctx.reader(&engine);
    let mut doc = Document::parse("<p>one two three four</p>").unwrap();
    reader.attach(&mut doc);

    reader.speak_current_view(&mut doc).unwrap();
    let first = engine.last().unwrap().id;
    reader.handle_engine_event(&mut doc, EngineEvent::boundary(first, 8));
    assert_eq!(reader.current_index(), Some(2));
    assert!(reader.pause());

    // The page re-renders while paused
    let old = doc.elements_by_tag("p")[0];
    doc.remove(old);
    let body = doc.body();
    let fresh = doc.append_element(body, "p");
    doc.append_text(fresh, "alpha beta gamma delta epsilon");
    reader.content_changed(&mut doc);

    let resumed = reader.resume(&mut doc).unwrap().expect("paused session resumes");
    let utterance = engine.last().unwrap();
    assert_eq!(utterance.id, resumed);
    assert_eq!(utterance.text, "gamma delta epsilon");
    assert_eq!(reader.state(), PlaybackState::Speaking);

    reader.handle_engine_event(&mut doc, EngineEvent::boundary(resumed, 0));
    assert_eq!(reader.current_index(), Some(2));
    let anchor = doc.highlight().cloned().expect("word highlighted");
    assert!(doc.is_attached(anchor.node));
    assert!(doc.element(fresh).unwrap().has_class(HIGHLIGHT));
}

#[test]
fn test_resume_after_content_shrinks_starts_at_last_word() {
    let ctx = TestContext::new();
    ctx.seed(&quiet());
    let engine = MockEngine::new();
    let mut reader = ctx.reader(&engine);
    let mut doc = Document::parse("<p>one two three four</p>").unwrap();
    reader.attach(&mut doc);

    reader.speak_current_view(&mut doc).unwrap();
    let first = engine.last().unwrap().id;
    reader.handle_engine_event(&mut doc, EngineEvent::boundary(first, 14));
    assert!(reader.pause());

    let old = doc.elements_by_tag("p")[0];
    doc.remove(old);
    let body = doc.body();
    let fresh = doc.append_element(body, "p");
    doc.append_text(fresh, "short text");
    reader.content_changed(&mut doc);

    reader.resume(&mut doc).unwrap();
    assert_eq!(engine.last().unwrap().text, "text");
}

/// Backend whose first save is slower than the ones after it
#[derive(Debug, Default)]
struct SlowFirstBackend {
    inner: MemoryBackend,
    saves: AtomicUsize,
}

#[async_trait]
impl PreferenceBackend for SlowFirstBackend {
    async fn load(&self, user_id: &str) -> ReadAloudResult<Option<Preferences>> {
        self.inner.load(user_id).await
    }

    async fn save(&self, user_id: &str, prefs: &Preferences) -> ReadAloudResult<()> {
        if self.saves.fetch_add(1, Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        self.inner.save(user_id, prefs).await
    }

    fn name(&self) -> &str {
        "slow-first"
    }
}

#[tokio::test]
async fn test_later_setting_wins_over_slow_earlier_save() {
    let ctx = TestContext::new();
    let backend = Arc::new(SlowFirstBackend::default());
    let store = PreferenceStore::new(LocalCache::new(ctx.cache_path()), backend.clone());
    let engine = MockEngine::new();
    let mut reader = ReadAloud::new(engine.boxed(), store, &ctx.config);
    let mut doc = lesson();

    reader.sign_in("student-3").await;
    reader.set_rate(&mut doc, 1.75);
    reader.set_voice(&mut doc, "Voice 2");
    reader.flush().await;

    let record = backend.inner.record("student-3").unwrap();
    assert_eq!(record.rate, 1.75);
    assert_eq!(record.voice_id, "Voice 2");
    assert_eq!(backend.saves.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_preferences_persist_and_restore() {
    let ctx = TestContext::new();
    let engine = MockEngine::new();
    let mut doc = lesson();

    {
        let mut reader = ctx.reader(&engine);
        reader.sign_in("student-1").await;
        reader.set_rate(&mut doc, 1.75);
        reader.set_voice(&mut doc, "Voice 2");
        reader.flush().await;
    }

    let record = ctx.backend.record("student-1").unwrap();
    assert_eq!(record.rate, 1.75);
    assert_eq!(record.voice_id, "Voice 2");

    // A fresh session starts from the local cache before sign-in
    let reader = ctx.reader(&engine);
    assert_eq!(reader.preferences().rate, 1.75);
    assert_eq!(reader.preferences().voice_id, "Voice 2");

    reader_speaks_with(&ctx, &engine).await;
}

async fn reader_speaks_with(ctx: &TestContext, engine: &MockEngine) {
    let mut reader = ctx.reader(engine);
    let mut doc = lesson();
    reader.sign_in("student-1").await;
    reader.speak_current_view(&mut doc).unwrap();
    let utterance = engine.last().unwrap();
    assert_eq!(utterance.rate, 1.75);
    assert_eq!(utterance.voice.unwrap().id, "Voice 2");
}

#[tokio::test]
async fn test_sign_in_prefers_durable_record() {
    let ctx = TestContext::new();
    ctx.seed(&Preferences {
        rate: 0.5,
        ..Preferences::default()
    });
    ctx.backend
        .save(
            "student-2",
            &Preferences {
                rate: 2.0,
                click_to_speak_enabled: false,
                ..Preferences::default()
            },
        )
        .await
        .unwrap();

    let engine = MockEngine::new();
    let mut reader = ctx.reader(&engine);
    assert_eq!(reader.preferences().rate, 0.5);

    reader.sign_in("student-2").await;
    assert_eq!(reader.user(), Some("student-2"));
    assert_eq!(reader.preferences().rate, 2.0);
    assert!(!reader.preferences().click_to_speak_enabled);

    reader.sign_out();
    assert!(reader.user().is_none());
}
