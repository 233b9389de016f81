//! Per-attempt working memory: credentials, memorized facts and the loop guard.

use crate::config::LoopGuardConfig;
use pagerun_core::credentials::UnknownPlaceholder;
use pagerun_core::{ActionCommand, Credentials, ScrollDirection};
use std::collections::{BTreeMap, VecDeque};

const SCROLL_WINDOW: usize = 6;

/// State private to one attempt. Dropped when the attempt ends.
#[derive(Debug)]
pub struct WorkingMemory {
    credentials: Credentials,
    facts: Vec<String>,
    loop_guard: LoopGuard,
}

impl WorkingMemory {
    pub fn new(credentials: Credentials, loop_guard: LoopGuardConfig) -> Self {
        Self {
            credentials,
            facts: Vec::new(),
            loop_guard: LoopGuard::new(loop_guard),
        }
    }

    /// Placeholder names the model may use.
    pub fn credential_names(&self) -> Vec<String> {
        self.credentials.names().map(str::to_string).collect()
    }

    /// Substitute `{{name}}` placeholders right before text reaches the page.
    pub fn resolve(&self, text: &str) -> Result<String, UnknownPlaceholder> {
        self.credentials.substitute(text)
    }

    /// Mask credential values in text that is about to be recorded or logged.
    pub fn redact(&self, text: &str) -> String {
        self.credentials.redact(text)
    }

    pub fn remember(&mut self, fact: impl Into<String>) {
        self.facts.push(fact.into());
    }

    pub fn facts(&self) -> &[String] {
        &self.facts
    }

    pub fn loop_guard(&self) -> &LoopGuard {
        &self.loop_guard
    }

    pub fn loop_guard_mut(&mut self) -> &mut LoopGuard {
        &mut self.loop_guard
    }
}

/// Outcome of recording an action with the loop guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopCheck {
    Clear,
    Detected(String),
}

/// Counts clicks and typing per screen region on the current page.
#[derive(Debug)]
pub struct LoopGuard {
    config: LoopGuardConfig,
    url: Option<String>,
    clicks: BTreeMap<(i64, i64), u32>,
    types: BTreeMap<(i64, i64), u32>,
    scrolls: VecDeque<ScrollDirection>,
}

impl LoopGuard {
    pub fn new(config: LoopGuardConfig) -> Self {
        Self {
            config,
            url: None,
            clicks: BTreeMap::new(),
            types: BTreeMap::new(),
            scrolls: VecDeque::new(),
        }
    }

    /// Note the current page; counters reset when the URL changes.
    pub fn observe_url(&mut self, url: &str) {
        if self.url.as_deref() != Some(url) {
            self.clicks.clear();
            self.types.clear();
            self.scrolls.clear();
            self.url = Some(url.to_string());
        }
    }

    /// Count an executed action and report whether the agent is looping.
    pub fn record(&mut self, command: &ActionCommand) -> LoopCheck {
        if !self.config.enabled {
            return LoopCheck::Clear;
        }

        match command {
            ActionCommand::Click { point } => {
                *self.clicks.entry(point.bucket(self.config.bucket_px)).or_default() += 1;
            }
            ActionCommand::TypeText {
                point: Some(point), ..
            } => {
                *self.types.entry(point.bucket(self.config.bucket_px)).or_default() += 1;
            }
            ActionCommand::Scroll { direction, .. } => {
                self.scrolls.push_back(*direction);
                if self.scrolls.len() > SCROLL_WINDOW {
                    self.scrolls.pop_front();
                }
            }
            _ => {}
        }

        let max_clicks = self.clicks.values().copied().max().unwrap_or(0);
        let max_types = self.types.values().copied().max().unwrap_or(0);
        if max_clicks >= self.config.max_clicks {
            LoopCheck::Detected(format!(
                "clicked the same region {} times without progress",
                max_clicks
            ))
        } else if max_types >= self.config.max_types {
            LoopCheck::Detected(format!(
                "typed into the same field {} times without progress",
                max_types
            ))
        } else {
            LoopCheck::Clear
        }
    }

    /// Hints for the next decision request.
    pub fn warnings(&self) -> Vec<String> {
        if !self.config.enabled {
            return Vec::new();
        }
        let size = i64::from(self.config.bucket_px.max(1));
        let mut warnings = Vec::new();

        for (label, counts) in [("Clicked", &self.clicks), ("Typed", &self.types)] {
            for ((bx, by), count) in counts {
                if *count < self.config.warn_after {
                    continue;
                }
                let mut note = format!(
                    "{} near ({},{}) {} times; avoid repeating unless the page visibly changed.",
                    label,
                    bx * size,
                    by * size,
                    count
                );
                if *count > self.config.warn_after {
                    note.push_str(" Change approach or terminate with failure.");
                }
                warnings.push(note);
            }
        }

        let ups = self.scrolls.iter().filter(|d| **d == ScrollDirection::Up).count();
        let downs = self.scrolls.iter().filter(|d| **d == ScrollDirection::Down).count();
        if self.scrolls.len() >= 4 && ups > 0 && downs > 0 {
            warnings.push(
                "Scrolling up and down repeatedly; act on what is visible instead.".to_string(),
            );
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagerun_core::Point;

    fn click(x: f64, y: f64) -> ActionCommand {
        ActionCommand::Click {
            point: Point::new(x, y),
        }
    }

    fn type_at(x: f64, y: f64) -> ActionCommand {
        ActionCommand::TypeText {
            text: "{{username}}".into(),
            point: Some(Point::new(x, y)),
            press_enter: false,
            clear_existing: true,
        }
    }

    #[test]
    fn test_clicks_in_same_bucket_trip_guard() {
        let mut guard = LoopGuard::new(LoopGuardConfig::default());
        guard.observe_url("https://a.test/login");

        assert_eq!(guard.record(&click(100.0, 100.0)), LoopCheck::Clear);
        assert!(guard.warnings().is_empty());
        assert_eq!(guard.record(&click(104.0, 96.0)), LoopCheck::Clear);
        assert_eq!(guard.warnings().len(), 1);
        assert_eq!(guard.record(&click(101.0, 99.0)), LoopCheck::Clear);
        assert!(matches!(guard.record(&click(99.0, 101.0)), LoopCheck::Detected(_)));
    }

    #[test]
    fn test_typing_limit() {
        let mut guard = LoopGuard::new(LoopGuardConfig::default());
        guard.observe_url("https://a.test");
        guard.record(&type_at(10.0, 10.0));
        guard.record(&type_at(10.0, 10.0));
        assert!(matches!(guard.record(&type_at(10.0, 10.0)), LoopCheck::Detected(_)));
    }

    #[test]
    fn test_url_change_resets_counters() {
        let mut guard = LoopGuard::new(LoopGuardConfig::default());
        guard.observe_url("https://a.test/1");
        for _ in 0..3 {
            guard.record(&click(5.0, 5.0));
        }
        guard.observe_url("https://a.test/2");
        assert!(guard.warnings().is_empty());
        assert_eq!(guard.record(&click(5.0, 5.0)), LoopCheck::Clear);
    }

    #[test]
    fn test_disabled_guard_never_trips() {
        let config = LoopGuardConfig {
            enabled: false,
            ..LoopGuardConfig::default()
        };
        let mut guard = LoopGuard::new(config);
        for _ in 0..10 {
            assert_eq!(guard.record(&click(5.0, 5.0)), LoopCheck::Clear);
        }
    }

    #[test]
    fn test_scroll_flapping_warning() {
        let mut guard = LoopGuard::new(LoopGuardConfig::default());
        for direction in [
            ScrollDirection::Down,
            ScrollDirection::Up,
            ScrollDirection::Down,
            ScrollDirection::Up,
        ] {
            guard.record(&ActionCommand::Scroll {
                direction,
                amount: 0,
            });
        }
        assert_eq!(guard.warnings().len(), 1);
    }

    #[test]
    fn test_memory_resolves_and_redacts() {
        let creds = Credentials::new().with("password", "hunter2");
        let memory = WorkingMemory::new(creds, LoopGuardConfig::default());
        assert_eq!(memory.credential_names(), vec!["password"]);
        assert_eq!(memory.resolve("{{password}}").unwrap(), "hunter2");
        assert_eq!(memory.redact("typed hunter2"), "typed ***");
        assert!(memory.resolve("{{otp}}").is_err());
    }
}
