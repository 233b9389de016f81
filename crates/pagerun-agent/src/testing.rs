//! Scripted fakes for the browser and the decision model.
//!
//! Compiled for this crate's tests and, behind the `testing` feature, for
//! tests in crates that drive the agent loop.

use crate::decision::{Decision, DecisionError, DecisionRequest, DecisionService};
use crate::provider::{
    ActionReport, ActionResult, BrowserSession, Observation, ProviderError, SessionFactory,
    TargetState,
};
use async_trait::async_trait;
use pagerun_core::{
    ActionCommand, HistoryDirection, Point, ScrollDirection, SelectBy, Target, TerminateStatus,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One scripted page state.
#[derive(Debug, Clone, PartialEq)]
pub struct FakePage {
    pub url: String,
    pub title: String,
    pub text: String,
    /// Report `text` as cut short.
    pub truncated: bool,
    pub console_errors: Vec<String>,
}

impl FakePage {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            text: String::new(),
            truncated: false,
            console_errors: Vec::new(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn truncated(mut self) -> Self {
        self.truncated = true;
        self
    }

    pub fn with_console_error(mut self, error: impl Into<String>) -> Self {
        self.console_errors.push(error.into());
        self
    }
}

#[derive(Debug, Default)]
struct BrowserState {
    pages: Vec<FakePage>,
    captures: usize,
    probes: VecDeque<TargetState>,
    actions: Vec<String>,
    typed: Vec<String>,
    action_error: Option<String>,
    capture_error: Option<String>,
    action_delay: Option<Duration>,
    element_waits: Vec<Duration>,
    closed: bool,
}

/// Inspection handle for a fake browser. Clones share state.
///
/// The n-th capture returns the n-th scripted page; the last page repeats.
#[derive(Debug, Clone, Default)]
pub struct FakeBrowser {
    state: Arc<Mutex<BrowserState>>,
}

impl FakeBrowser {
    pub fn new(pages: Vec<FakePage>) -> Self {
        Self {
            state: Arc::new(Mutex::new(BrowserState {
                pages,
                ..BrowserState::default()
            })),
        }
    }

    /// A session driving this browser.
    pub fn session(&self) -> FakeSession {
        FakeSession {
            state: self.state.clone(),
        }
    }

    /// Result for the next probe; unqueued probes report an interactable element.
    pub fn queue_probe(&self, state: TargetState) {
        lock(&self.state).probes.push_back(state);
    }

    pub fn fail_actions_with(&self, message: impl Into<String>) {
        lock(&self.state).action_error = Some(message.into());
    }

    pub fn fail_captures_with(&self, message: impl Into<String>) {
        lock(&self.state).capture_error = Some(message.into());
    }

    /// Make every page action take `delay`.
    pub fn delay_actions(&self, delay: Duration) {
        lock(&self.state).action_delay = Some(delay);
    }

    /// Names of the page actions performed, in order.
    pub fn actions(&self) -> Vec<String> {
        lock(&self.state).actions.clone()
    }

    /// Text typed into the page, after credential substitution.
    pub fn typed(&self) -> Vec<String> {
        lock(&self.state).typed.clone()
    }

    /// Timeouts passed to `wait_for_element`, in order.
    pub fn element_waits(&self) -> Vec<Duration> {
        lock(&self.state).element_waits.clone()
    }

    pub fn captures(&self) -> usize {
        lock(&self.state).captures
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }
}

/// Fake [`BrowserSession`] backed by a [`FakeBrowser`].
#[derive(Debug)]
pub struct FakeSession {
    state: Arc<Mutex<BrowserState>>,
}

impl FakeSession {
    async fn act(&mut self, name: &str) -> ActionResult {
        let delay = {
            let mut state = lock(&self.state);
            if state.closed {
                return Err(ProviderError::Closed);
            }
            state.actions.push(name.to_string());
            if let Some(message) = &state.action_error {
                return Err(ProviderError::Action(message.clone()));
            }
            state.action_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(ActionReport::new(format!("{} done", name)))
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn navigate(&mut self, _url: &str) -> ActionResult {
        self.act("navigate").await
    }

    async fn click(&mut self, _point: Point) -> ActionResult {
        self.act("click").await
    }

    async fn double_click(&mut self, _point: Point) -> ActionResult {
        self.act("double_click").await
    }

    async fn right_click(&mut self, _point: Point) -> ActionResult {
        self.act("right_click").await
    }

    async fn hover(&mut self, _point: Point) -> ActionResult {
        self.act("hover").await
    }

    async fn type_text(
        &mut self,
        text: &str,
        _point: Option<Point>,
        _press_enter: bool,
        _clear_existing: bool,
    ) -> ActionResult {
        let report = self.act("type_text").await?;
        lock(&self.state).typed.push(text.to_string());
        Ok(report)
    }

    async fn select_option(&mut self, _point: Point, _option: &SelectBy) -> ActionResult {
        self.act("select_option").await
    }

    async fn upload_file(&mut self, _point: Point, _files: &[String]) -> ActionResult {
        self.act("upload_file").await
    }

    async fn drag_drop(&mut self, _from: Point, _to: Point) -> ActionResult {
        self.act("drag_drop").await
    }

    async fn scroll(&mut self, _direction: ScrollDirection, _amount: u32) -> ActionResult {
        self.act("scroll").await
    }

    async fn key_press(&mut self, _keys: &[String]) -> ActionResult {
        self.act("key_press").await
    }

    async fn wait_for_element(&mut self, _selector: &str, timeout: Duration) -> ActionResult {
        lock(&self.state).element_waits.push(timeout);
        self.act("wait_for_element").await
    }

    async fn switch_frame(&mut self, _selector: Option<&str>) -> ActionResult {
        self.act("switch_frame").await
    }

    async fn switch_tab(&mut self, _index: usize) -> ActionResult {
        self.act("switch_tab").await
    }

    async fn history_navigate(&mut self, _direction: HistoryDirection) -> ActionResult {
        self.act("history_navigate").await
    }

    async fn reload(&mut self) -> ActionResult {
        self.act("reload").await
    }

    async fn capture(&mut self) -> Result<Observation, ProviderError> {
        let mut state = lock(&self.state);
        if let Some(message) = &state.capture_error {
            return Err(ProviderError::Capture(message.clone()));
        }
        let index = state.captures.min(state.pages.len().saturating_sub(1));
        state.captures += 1;
        let page = state
            .pages
            .get(index)
            .cloned()
            .unwrap_or_else(|| FakePage::new("about:blank", ""));
        Ok(Observation::new(page.url, page.title)
            .with_page_text(page.text)
            .with_text_truncated(page.truncated)
            .with_console_errors(page.console_errors)
            .with_screenshot(vec![0x89, b'P', b'N', b'G']))
    }

    async fn probe(&mut self, _target: &Target) -> Result<TargetState, ProviderError> {
        Ok(lock(&self.state)
            .probes
            .pop_front()
            .unwrap_or_else(|| TargetState::interactable("element")))
    }

    async fn close(&mut self) -> Result<(), ProviderError> {
        lock(&self.state).closed = true;
        Ok(())
    }
}

/// Opens a fresh [`FakeBrowser`] per session from the same page script.
#[derive(Debug, Default)]
pub struct FakeSessionFactory {
    pages: Vec<FakePage>,
    failures_left: Mutex<u32>,
    open_delay: Option<Duration>,
    browsers: Mutex<Vec<FakeBrowser>>,
}

impl FakeSessionFactory {
    pub fn new(pages: Vec<FakePage>) -> Self {
        Self {
            pages,
            ..Self::default()
        }
    }

    /// Fail the first `n` opens.
    pub fn fail_first(self, n: u32) -> Self {
        *lock(&self.failures_left) = n;
        self
    }

    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    /// Browsers behind every successfully opened session, in open order.
    pub fn browsers(&self) -> Vec<FakeBrowser> {
        lock(&self.browsers).clone()
    }
}

#[async_trait]
impl SessionFactory for FakeSessionFactory {
    async fn open(&self) -> Result<Box<dyn BrowserSession>, ProviderError> {
        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }
        {
            let mut failures = lock(&self.failures_left);
            if *failures > 0 {
                *failures -= 1;
                return Err(ProviderError::SessionOpen("browser failed to start".into()));
            }
        }
        let browser = FakeBrowser::new(self.pages.clone());
        let session = browser.session();
        lock(&self.browsers).push(browser);
        Ok(Box::new(session))
    }
}

/// Decision service that replays a script, then repeats a fallback.
#[derive(Debug, Default)]
pub struct ScriptedDecider {
    script: Mutex<VecDeque<Result<Decision, DecisionError>>>,
    fallback: Option<Decision>,
    delay: Option<Duration>,
    requests: Mutex<Vec<DecisionRequest>>,
}

impl ScriptedDecider {
    pub fn new(script: Vec<Result<Decision, DecisionError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    /// Always answer with `decision`.
    pub fn repeating(decision: Decision) -> Self {
        Self::new(Vec::new()).then_repeat(decision)
    }

    pub fn then_repeat(mut self, decision: Decision) -> Self {
        self.fallback = Some(decision);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<DecisionRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl DecisionService for ScriptedDecider {
    async fn decide(&self, request: &DecisionRequest) -> Result<Decision, DecisionError> {
        lock(&self.requests).push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = lock(&self.script).pop_front();
        match next {
            Some(answer) => answer,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| DecisionError::Unavailable("script exhausted".into())),
        }
    }
}

/// A decision whose raw response is the command's JSON.
pub fn decision(command: ActionCommand) -> Decision {
    let raw = serde_json::to_string(&command).unwrap_or_default();
    Decision::new(command, raw)
}

pub fn click(x: f64, y: f64) -> Decision {
    decision(ActionCommand::Click {
        point: Point::new(x, y),
    })
}

pub fn terminate_pass(reason: &str) -> Decision {
    decision(ActionCommand::Terminate {
        status: TerminateStatus::Success,
        reason: reason.to_string(),
    })
}

pub fn terminate_fail(reason: &str) -> Decision {
    decision(ActionCommand::Terminate {
        status: TerminateStatus::Failure,
        reason: reason.to_string(),
    })
}

pub fn malformed(raw: &str) -> DecisionError {
    DecisionError::Malformed {
        reason: "no tool call".into(),
        raw_response: raw.to_string(),
    }
}
