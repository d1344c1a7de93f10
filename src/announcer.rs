//! Navigation Announcer
//!
//! Turns a route into "You are on the ... page" and suppresses repeats when
//! a route re-renders without changing.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

lazy_static! {
    static ref CAPITAL: Regex = Regex::new(r"([A-Z])").expect("static regex");
    static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("static regex");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub route_key: String,
    pub rendered_phrase: String,
}

/// Human-readable page name from the last path segment
///
/// `/SheetMusicTools/MusicLibrary` becomes `Music Library`,
/// `/Lessons/Rhythm/Lesson1-Rhythmic-Values` becomes `Lesson1 Rhythmic Values`,
/// and `/` becomes `Home`.
pub fn page_name(route: &str) -> String {
    let path = route.split(['?', '#']).next().unwrap_or("");
    let Some(segment) = path.split('/').filter(|s| !s.trim().is_empty()).last() else {
        return "Home".to_string();
    };
    let segment = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());

    let spaced = CAPITAL.replace_all(&segment, " $1").replace('-', " ");
    let name = WHITESPACE.replace_all(spaced.trim(), " ").into_owned();
    if name.is_empty() {
        "Home".to_string()
    } else {
        name
    }
}

pub fn announcement_for(route: &str) -> Announcement {
    Announcement {
        route_key: route.to_string(),
        rendered_phrase: format!("You are on the {} page", page_name(route)),
    }
}

#[derive(Debug, Default)]
pub struct NavigationAnnouncer {
    last: Option<Announcement>,
}

impl NavigationAnnouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The announcement to speak for this render, if any
    pub fn on_route_change(&mut self, route: &str, announce_enabled: bool) -> Option<Announcement> {
        if !announce_enabled {
            return None;
        }
        let announcement = announcement_for(route);
        if self
            .last
            .as_ref()
            .is_some_and(|last| last.rendered_phrase == announcement.rendered_phrase)
        {
            debug!("Skipping repeated announcement for {}", route);
            return None;
        }
        self.last = Some(announcement.clone());
        Some(announcement)
    }

    pub fn last(&self) -> Option<&Announcement> {
        self.last.as_ref()
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}
