//! fantoccini-backed browser sessions.

use crate::config::WebDriverConfig;
use crate::scripts;
use async_trait::async_trait;
use fantoccini::actions::{
    InputSource, MouseActions, PointerAction, MOUSE_BUTTON_LEFT, MOUSE_BUTTON_RIGHT,
};
use fantoccini::error::CmdError;
use fantoccini::key::Key;
use fantoccini::{Client, ClientBuilder, Locator};
use pagerun_agent::{
    ActionReport, BrowserSession, Observation, ProviderError, SessionFactory, TargetState,
    Viewport,
};
use pagerun_core::{
    HistoryDirection, Point, ScrollDirection, SelectBy, Target, CONSOLE_ERRORS_PER_OBSERVATION,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

type ActionResult = Result<ActionReport, ProviderError>;

const POINTER: &str = "pagerun-pointer";
const MOVE_DURATION: Duration = Duration::from_millis(50);

/// Opens one WebDriver session per attempt.
pub struct WebDriverFactory {
    config: WebDriverConfig,
}

impl WebDriverFactory {
    pub fn new(config: WebDriverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WebDriverConfig {
        &self.config
    }
}

#[async_trait]
impl SessionFactory for WebDriverFactory {
    async fn open(&self) -> Result<Box<dyn BrowserSession>, ProviderError> {
        let mut builder =
            ClientBuilder::rustls().map_err(|e| ProviderError::SessionOpen(e.to_string()))?;
        builder.capabilities(self.config.capabilities());

        let client = builder
            .connect(&self.config.webdriver_url)
            .await
            .map_err(|e| {
                ProviderError::SessionOpen(format!(
                    "cannot connect to WebDriver at {}: {}",
                    self.config.webdriver_url, e
                ))
            })?;

        if let Err(e) = client
            .set_window_size(self.config.viewport_width, self.config.viewport_height)
            .await
        {
            warn!(error = %e, "Failed to resize browser window");
        }

        info!(
            webdriver_url = %self.config.webdriver_url,
            browser = ?self.config.browser,
            headless = self.config.headless,
            "Browser session opened"
        );

        Ok(Box::new(WebDriverSession::new(client, &self.config)))
    }
}

/// One live browser, driven through WebDriver.
pub struct WebDriverSession {
    client: Option<Client>,
    viewport: Viewport,
    page_text_limit: usize,
}

impl WebDriverSession {
    pub fn new(client: Client, config: &WebDriverConfig) -> Self {
        Self {
            client: Some(client),
            viewport: config.viewport(),
            page_text_limit: config.page_text_limit,
        }
    }

    fn client(&self) -> Result<&Client, ProviderError> {
        self.client.as_ref().ok_or(ProviderError::Closed)
    }

    async fn script(&self, script: &str, args: Vec<Value>) -> Result<Value, ProviderError> {
        self.client()?
            .execute(script, args)
            .await
            .map_err(action_error)
    }

    async fn pointer(&self, actions: MouseActions) -> Result<(), ProviderError> {
        let client = self.client()?;
        client.perform_actions(actions).await.map_err(action_error)?;
        if let Err(e) = client.release_actions().await {
            warn!(error = %e, "Failed to release pointer state");
        }
        Ok(())
    }

    async fn press(&self, point: Point, button: u64, count: usize) -> Result<(), ProviderError> {
        let mut actions = MouseActions::new(POINTER.to_string()).then(move_to(point));
        for _ in 0..count {
            actions = actions
                .then(PointerAction::Down { button })
                .then(PointerAction::Up { button });
        }
        self.pointer(actions).await
    }

    /// Start collecting console errors on the current document.
    async fn install_console_hook(&self) {
        if let Err(e) = self
            .script(scripts::CONSOLE_ERRORS, vec![json!(0), json!(false)])
            .await
        {
            debug!(error = %e, "Console hook not installed");
        }
    }

    /// Console errors since the previous capture. Scripts can be blocked on
    /// some pages; that yields no errors rather than a failed capture.
    async fn console_errors(&self) -> Vec<String> {
        let drained = self
            .script(
                scripts::CONSOLE_ERRORS,
                vec![json!(CONSOLE_ERRORS_PER_OBSERVATION), json!(true)],
            )
            .await;
        match drained {
            Ok(value) => parse_console_errors(value),
            Err(e) => {
                debug!(error = %e, "Console errors unavailable");
                Vec::new()
            }
        }
    }

    async fn send_to_focus(&self, keys: &str) -> Result<(), ProviderError> {
        let client = self.client()?;
        let element = match client.active_element().await {
            Ok(element) => element,
            Err(_) => client
                .find(Locator::Css("body"))
                .await
                .map_err(action_error)?,
        };
        element.send_keys(keys).await.map_err(action_error)
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn navigate(&mut self, url: &str) -> ActionResult {
        let client = self.client()?;
        client.goto(url).await.map_err(action_error)?;
        self.install_console_hook().await;
        let current = client.current_url().await.map_err(action_error)?;
        Ok(ActionReport::new(format!("navigated to {}", current)))
    }

    async fn click(&mut self, point: Point) -> ActionResult {
        self.press(point, MOUSE_BUTTON_LEFT, 1).await?;
        Ok(ActionReport::new(format!("clicked {}", point)))
    }

    async fn double_click(&mut self, point: Point) -> ActionResult {
        self.press(point, MOUSE_BUTTON_LEFT, 2).await?;
        Ok(ActionReport::new(format!("double-clicked {}", point)))
    }

    async fn right_click(&mut self, point: Point) -> ActionResult {
        self.press(point, MOUSE_BUTTON_RIGHT, 1).await?;
        Ok(ActionReport::new(format!("right-clicked {}", point)))
    }

    async fn hover(&mut self, point: Point) -> ActionResult {
        self.pointer(MouseActions::new(POINTER.to_string()).then(move_to(point)))
            .await?;
        Ok(ActionReport::new(format!("moved pointer to {}", point)))
    }

    async fn type_text(
        &mut self,
        text: &str,
        point: Option<Point>,
        press_enter: bool,
        clear_existing: bool,
    ) -> ActionResult {
        if let Some(point) = point {
            self.press(point, MOUSE_BUTTON_LEFT, 1).await?;
        }
        if clear_existing {
            self.script(scripts::CLEAR_AT_POINT, vec![Value::Null])
                .await?;
        }
        let mut keys = text.to_string();
        if press_enter {
            keys.push_str(&Key::Enter.to_string());
        }
        self.send_to_focus(&keys).await?;

        let mut detail = format!("typed {} characters", text.chars().count());
        if press_enter {
            detail.push_str(" and pressed Enter");
        }
        Ok(ActionReport::new(detail))
    }

    async fn select_option(&mut self, point: Point, option: &SelectBy) -> ActionResult {
        let (by, value) = match option {
            SelectBy::Value(value) => ("value", json!(value)),
            SelectBy::Label(label) => ("label", json!(label)),
            SelectBy::Index(index) => ("index", json!(index)),
        };
        let selected = self
            .script(
                scripts::SELECT_AT_POINT,
                vec![json!(point.x), json!(point.y), json!(by), value],
            )
            .await?;
        match selected.as_str() {
            Some(label) => Ok(ActionReport::new(format!("selected '{}'", label))),
            None => Err(ProviderError::NotFound(format!(
                "no matching <select> option at {}",
                point
            ))),
        }
    }

    async fn upload_file(&mut self, point: Point, files: &[String]) -> ActionResult {
        let marked = self
            .script(scripts::MARK_POINT, vec![json!(point.x), json!(point.y)])
            .await?;
        if marked != Value::Bool(true) {
            return Err(ProviderError::NotFound(format!("no element at {}", point)));
        }
        let input = self
            .client()?
            .find(Locator::Css(scripts::MARKED))
            .await
            .map_err(action_error)?;
        input
            .send_keys(&files.join("\n"))
            .await
            .map_err(action_error)?;
        Ok(ActionReport::new(format!("attached {} file(s)", files.len())))
    }

    async fn drag_drop(&mut self, from: Point, to: Point) -> ActionResult {
        let actions = MouseActions::new(POINTER.to_string())
            .then(move_to(from))
            .then(PointerAction::Down {
                button: MOUSE_BUTTON_LEFT,
            })
            .then(PointerAction::MoveTo {
                duration: Some(Duration::from_millis(300)),
                x: pixel(to.x),
                y: pixel(to.y),
            })
            .then(PointerAction::Up {
                button: MOUSE_BUTTON_LEFT,
            });
        self.pointer(actions).await?;
        Ok(ActionReport::new(format!("dragged {} to {}", from, to)))
    }

    async fn scroll(&mut self, direction: ScrollDirection, amount: u32) -> ActionResult {
        let (dx, dy) = scroll_delta(direction, amount, self.viewport);
        let offsets = self
            .script(scripts::SCROLL_BY, vec![json!(dx), json!(dy)])
            .await?;
        debug!(dx, dy, offsets = %offsets, "Scrolled");
        Ok(ActionReport::new(format!(
            "scrolled {:?} by {} px",
            direction,
            dx.abs().max(dy.abs())
        )))
    }

    async fn key_press(&mut self, keys: &[String]) -> ActionResult {
        if keys.is_empty() {
            return Err(ProviderError::Action("no keys given".to_string()));
        }
        self.send_to_focus(&key_sequence(keys)).await?;
        Ok(ActionReport::new(format!("pressed {}", keys.join("+"))))
    }

    async fn wait_for_element(&mut self, selector: &str, timeout: Duration) -> ActionResult {
        self.client()?
            .wait()
            .at_most(timeout)
            .for_element(Locator::Css(selector))
            .await
            .map_err(|e| match e {
                CmdError::WaitTimeout => ProviderError::NotFound(format!(
                    "'{}' did not appear within {:?}",
                    selector, timeout
                )),
                other => action_error(other),
            })?;
        Ok(ActionReport::new(format!("'{}' appeared", selector)))
    }

    async fn switch_frame(&mut self, selector: Option<&str>) -> ActionResult {
        let client = self.client()?;
        match selector {
            None => {
                client.enter_frame(None).await.map_err(action_error)?;
                Ok(ActionReport::new("switched to main document"))
            }
            Some(selector) => {
                let frame = client
                    .find(Locator::Css(selector))
                    .await
                    .map_err(action_error)?;
                frame.enter_frame().await.map_err(action_error)?;
                Ok(ActionReport::new(format!("entered frame '{}'", selector)))
            }
        }
    }

    async fn switch_tab(&mut self, index: usize) -> ActionResult {
        let client = self.client()?;
        let windows = client.windows().await.map_err(action_error)?;
        let count = windows.len();
        let handle = windows.into_iter().nth(index).ok_or_else(|| {
            ProviderError::NotFound(format!("tab {} (only {} open)", index, count))
        })?;
        client
            .switch_to_window(handle)
            .await
            .map_err(action_error)?;
        Ok(ActionReport::new(format!("switched to tab {}", index)))
    }

    async fn history_navigate(&mut self, direction: HistoryDirection) -> ActionResult {
        let client = self.client()?;
        match direction {
            HistoryDirection::Back => client.back().await,
            HistoryDirection::Forward => client.forward().await,
        }
        .map_err(action_error)?;
        Ok(ActionReport::new(format!("history {:?}", direction).to_lowercase()))
    }

    async fn reload(&mut self) -> ActionResult {
        self.client()?.refresh().await.map_err(action_error)?;
        Ok(ActionReport::new("reloaded"))
    }

    async fn capture(&mut self) -> Result<Observation, ProviderError> {
        let client = self.client()?;
        let screenshot = client.screenshot().await.map_err(capture_error)?;
        let url = client.current_url().await.map_err(capture_error)?;
        let title = client.title().await.map_err(capture_error)?;
        let text = client
            .execute(scripts::PAGE_TEXT, vec![json!(self.page_text_limit)])
            .await
            .map_err(capture_error)?;
        let text: PageText = serde_json::from_value(text).unwrap_or_default();
        let console_errors = self.console_errors().await;

        Ok(Observation::new(url.as_str(), title)
            .with_page_text(text.text)
            .with_text_truncated(text.truncated)
            .with_console_errors(console_errors)
            .with_screenshot(screenshot)
            .with_viewport(self.viewport))
    }

    async fn probe(&mut self, target: &Target) -> Result<TargetState, ProviderError> {
        let args = match target {
            Target::Point(point) => vec![json!(point.x), json!(point.y)],
            Target::Selector(selector) => vec![Value::Null, Value::Null, json!(selector)],
        };
        let report = self.script(scripts::PROBE, args).await?;
        parse_probe(report)
    }

    async fn close(&mut self) -> Result<(), ProviderError> {
        match self.client.take() {
            Some(client) => {
                client
                    .close()
                    .await
                    .map_err(|e| ProviderError::Action(format!("close failed: {}", e)))?;
                debug!("Browser session closed");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

fn move_to(point: Point) -> PointerAction {
    PointerAction::MoveTo {
        duration: Some(MOVE_DURATION),
        x: pixel(point.x),
        y: pixel(point.y),
    }
}

/// Viewport coordinate as the whole pixel WebDriver actions expect.
fn pixel(coordinate: f64) -> i64 {
    coordinate.round() as i64
}

fn action_error(e: CmdError) -> ProviderError {
    if e.is_no_such_element() || e.is_no_such_frame() || e.is_no_such_window() {
        ProviderError::NotFound(e.to_string())
    } else {
        ProviderError::Action(e.to_string())
    }
}

fn capture_error(e: CmdError) -> ProviderError {
    ProviderError::Capture(e.to_string())
}

/// Pixel deltas for a scroll; zero scrolls one viewport.
fn scroll_delta(direction: ScrollDirection, amount: u32, viewport: Viewport) -> (i64, i64) {
    let vertical = if amount == 0 {
        i64::from(viewport.height)
    } else {
        i64::from(amount)
    };
    let horizontal = if amount == 0 {
        i64::from(viewport.width)
    } else {
        i64::from(amount)
    };
    match direction {
        ScrollDirection::Up => (0, -vertical),
        ScrollDirection::Down => (0, vertical),
        ScrollDirection::Left => (-horizontal, 0),
        ScrollDirection::Right => (horizontal, 0),
    }
}

/// WebDriver key string for one named key.
fn webdriver_key(key: &str) -> String {
    match key.trim().to_ascii_lowercase().as_str() {
        "enter" => Key::Enter.to_string(),
        "return" => Key::Return.to_string(),
        "tab" => Key::Tab.to_string(),
        "escape" | "esc" => Key::Escape.to_string(),
        "backspace" => Key::Backspace.to_string(),
        "delete" | "del" => Key::Delete.to_string(),
        "space" => Key::Space.to_string(),
        "arrowup" | "up" => Key::Up.to_string(),
        "arrowdown" | "down" => Key::Down.to_string(),
        "arrowleft" | "left" => Key::Left.to_string(),
        "arrowright" | "right" => Key::Right.to_string(),
        "home" => Key::Home.to_string(),
        "end" => Key::End.to_string(),
        "pageup" => Key::PageUp.to_string(),
        "pagedown" => Key::PageDown.to_string(),
        "control" | "ctrl" => Key::Control.to_string(),
        "shift" => Key::Shift.to_string(),
        "alt" | "option" => Key::Alt.to_string(),
        "meta" | "cmd" | "command" | "super" => Key::Meta.to_string(),
        _ => key.to_string(),
    }
}

/// One send-keys payload for a chord; modifiers are released at the end.
fn key_sequence(keys: &[String]) -> String {
    let mut sequence: String = keys.iter().map(|key| webdriver_key(key)).collect();
    if keys.len() > 1 {
        sequence.push_str(&Key::Null.to_string());
    }
    sequence
}

#[derive(Debug, Default, Deserialize)]
struct PageText {
    #[serde(default)]
    text: String,
    #[serde(default)]
    truncated: bool,
}

fn parse_console_errors(value: Value) -> Vec<String> {
    match value {
        Value::Array(entries) => entries
            .into_iter()
            .filter_map(|entry| match entry {
                Value::String(text) => Some(text),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[derive(Debug, Deserialize)]
struct ProbeReport {
    exists: bool,
    #[serde(default)]
    visible: bool,
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    in_viewport: bool,
    #[serde(default)]
    description: Option<String>,
}

fn parse_probe(report: Value) -> Result<TargetState, ProviderError> {
    let report: ProbeReport = serde_json::from_value(report)
        .map_err(|e| ProviderError::Action(format!("unexpected probe result: {}", e)))?;
    Ok(TargetState {
        exists: report.exists,
        visible: report.visible,
        enabled: report.enabled,
        in_viewport: report.in_viewport,
        description: report.description,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_names_map_to_webdriver_codes() {
        assert_eq!(webdriver_key("Enter"), Key::Enter.to_string());
        assert_eq!(webdriver_key(" esc "), Key::Escape.to_string());
        assert_eq!(webdriver_key("a"), "a");
    }

    #[test]
    fn test_chord_releases_modifiers() {
        let chord = key_sequence(&["Control".to_string(), "a".to_string()]);
        assert!(chord.starts_with(&Key::Control.to_string()));
        assert!(chord.ends_with(&Key::Null.to_string()));

        let single = key_sequence(&["Tab".to_string()]);
        assert_eq!(single, Key::Tab.to_string());
    }

    #[test]
    fn test_pointer_coordinates_round_to_pixels() {
        assert_eq!(pixel(120.4), 120);
        assert_eq!(pixel(120.5), 121);
        assert!(matches!(
            move_to(Point::new(10.6, 20.2)),
            PointerAction::MoveTo { x: 11, y: 20, .. }
        ));
    }

    #[test]
    fn test_page_text_report() {
        let text: PageText =
            serde_json::from_value(json!({"text": "Welcome", "truncated": true})).unwrap();
        assert_eq!(text.text, "Welcome");
        assert!(text.truncated);

        let fallback: PageText = serde_json::from_value(json!("legacy")).unwrap_or_default();
        assert!(fallback.text.is_empty());
        assert!(!fallback.truncated);
    }

    #[test]
    fn test_parse_console_errors() {
        let errors = parse_console_errors(json!(["TypeError: x is undefined", null, 404]));
        assert_eq!(errors, vec!["TypeError: x is undefined".to_string(), "404".to_string()]);
        assert!(parse_console_errors(Value::Null).is_empty());
    }

    #[test]
    fn test_scroll_delta() {
        let viewport = Viewport::default();
        assert_eq!(scroll_delta(ScrollDirection::Down, 300, viewport), (0, 300));
        assert_eq!(scroll_delta(ScrollDirection::Up, 0, viewport), (0, -900));
        assert_eq!(scroll_delta(ScrollDirection::Left, 0, viewport), (-1440, 0));
    }

    #[test]
    fn test_parse_probe_report() {
        let state = parse_probe(json!({
            "exists": true,
            "visible": true,
            "enabled": false,
            "in_viewport": true,
            "description": "<button> Submit"
        }))
        .unwrap();
        assert_eq!(state.mismatch(), Some("target is disabled"));
        assert_eq!(state.description.as_deref(), Some("<button> Submit"));

        let missing = parse_probe(json!({"exists": false})).unwrap();
        assert_eq!(missing, TargetState::missing());

        assert!(parse_probe(json!("nope")).is_err());
    }
}
