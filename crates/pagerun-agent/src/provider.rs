//! Automation provider contract.
//!
//! A [`SessionFactory`] opens one isolated [`BrowserSession`] per attempt.
//! Sessions expose one operation per page-touching action, plus `capture`
//! for observations and `probe` for pre-flight target checks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pagerun_core::{
    HistoryDirection, ObservationId, ObservationRef, Point, ScrollDirection, SelectBy, Target,
};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by an automation provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("Failed to open session: {0}")]
    SessionOpen(String),

    #[error("Capture failed: {0}")]
    Capture(String),

    #[error("Action failed: {0}")]
    Action(String),

    #[error("Element not found: {0}")]
    NotFound(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Session is closed")]
    Closed,
}

/// Browser viewport size in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1440,
            height: 900,
        }
    }
}

impl Viewport {
    pub fn contains(&self, point: Point) -> bool {
        point.x >= 0.0
            && point.y >= 0.0
            && point.x < f64::from(self.width)
            && point.y < f64::from(self.height)
    }
}

/// Page state captured at one instant.
#[derive(Clone)]
pub struct Observation {
    pub id: ObservationId,
    pub url: String,
    pub title: String,
    /// Visible text, possibly truncated by the provider.
    pub page_text: String,
    /// Set when `page_text` is only a prefix of the page's text.
    pub text_truncated: bool,
    /// Console errors logged since the previous capture.
    pub console_errors: Vec<String>,
    /// PNG bytes.
    pub screenshot: Vec<u8>,
    pub viewport: Viewport,
    pub captured_at: DateTime<Utc>,
}

impl Observation {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: ObservationId::generate(),
            url: url.into(),
            title: title.into(),
            page_text: String::new(),
            text_truncated: false,
            console_errors: Vec::new(),
            screenshot: Vec::new(),
            viewport: Viewport::default(),
            captured_at: Utc::now(),
        }
    }

    pub fn with_page_text(mut self, text: impl Into<String>) -> Self {
        self.page_text = text.into();
        self
    }

    /// Mark the page text as cut short.
    pub fn with_text_truncated(mut self, truncated: bool) -> Self {
        self.text_truncated = truncated;
        self
    }

    pub fn with_console_errors(mut self, errors: Vec<String>) -> Self {
        self.console_errors = errors;
        self
    }

    pub fn with_screenshot(mut self, png: Vec<u8>) -> Self {
        self.screenshot = png;
        self
    }

    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }

    /// Reference stored on the round record.
    pub fn to_ref(&self, screenshot_path: Option<PathBuf>) -> ObservationRef {
        ObservationRef {
            id: self.id.clone(),
            url: self.url.clone(),
            title: self.title.clone(),
            screenshot_path,
            console_errors: self.console_errors.clone(),
        }
    }
}

impl fmt::Debug for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observation")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("title", &self.title)
            .field("page_text_len", &self.page_text.len())
            .field("text_truncated", &self.text_truncated)
            .field("console_errors", &self.console_errors.len())
            .field("screenshot_bytes", &self.screenshot.len())
            .field("viewport", &self.viewport)
            .finish()
    }
}

/// Result of probing an action target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetState {
    pub exists: bool,
    pub visible: bool,
    pub enabled: bool,
    pub in_viewport: bool,
    /// Short description of the element (tag, role, label).
    pub description: Option<String>,
}

impl TargetState {
    /// An element that can be acted on.
    pub fn interactable(description: impl Into<String>) -> Self {
        Self {
            exists: true,
            visible: true,
            enabled: true,
            in_viewport: true,
            description: Some(description.into()),
        }
    }

    pub fn missing() -> Self {
        Self {
            exists: false,
            visible: false,
            enabled: false,
            in_viewport: false,
            description: None,
        }
    }

    pub fn is_interactable(&self) -> bool {
        self.exists && self.visible && self.enabled && self.in_viewport
    }

    /// Why the target cannot be acted on, if it cannot.
    pub fn mismatch(&self) -> Option<&'static str> {
        if !self.exists {
            Some("no element at target")
        } else if !self.in_viewport {
            Some("target is outside the viewport")
        } else if !self.visible {
            Some("target is not visible")
        } else if !self.enabled {
            Some("target is disabled")
        } else {
            None
        }
    }
}

/// What a provider reports after performing an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionReport {
    pub detail: String,
}

impl ActionReport {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

pub type ActionResult = Result<ActionReport, ProviderError>;

/// One isolated browser session, owned by a single attempt.
#[async_trait]
pub trait BrowserSession: Send {
    async fn navigate(&mut self, url: &str) -> ActionResult;

    async fn click(&mut self, point: Point) -> ActionResult;

    async fn double_click(&mut self, point: Point) -> ActionResult;

    async fn right_click(&mut self, point: Point) -> ActionResult;

    async fn hover(&mut self, point: Point) -> ActionResult;

    /// Type `text`, clicking `point` first when given.
    async fn type_text(
        &mut self,
        text: &str,
        point: Option<Point>,
        press_enter: bool,
        clear_existing: bool,
    ) -> ActionResult;

    async fn select_option(&mut self, point: Point, option: &SelectBy) -> ActionResult;

    async fn upload_file(&mut self, point: Point, files: &[String]) -> ActionResult;

    async fn drag_drop(&mut self, from: Point, to: Point) -> ActionResult;

    /// Scroll by `amount` pixels, or one page when `amount` is zero.
    async fn scroll(&mut self, direction: ScrollDirection, amount: u32) -> ActionResult;

    async fn key_press(&mut self, keys: &[String]) -> ActionResult;

    async fn wait_for_element(&mut self, selector: &str, timeout: Duration) -> ActionResult;

    async fn switch_frame(&mut self, selector: Option<&str>) -> ActionResult;

    async fn switch_tab(&mut self, index: usize) -> ActionResult;

    async fn history_navigate(&mut self, direction: HistoryDirection) -> ActionResult;

    async fn reload(&mut self) -> ActionResult;

    /// Capture screenshot plus URL, title and visible text.
    async fn capture(&mut self) -> Result<Observation, ProviderError>;

    /// Check whether `target` exists and can be acted on.
    async fn probe(&mut self, target: &Target) -> Result<TargetState, ProviderError>;

    /// Tear the session down. Must be safe to call once after any failure.
    async fn close(&mut self) -> Result<(), ProviderError>;
}

/// Opens fresh browser sessions.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn BrowserSession>, ProviderError>;
}
