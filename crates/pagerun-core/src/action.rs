//! The closed set of actions an agent may take on a page.

use crate::Verdict;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A viewport coordinate in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Nearest grid node on a `size`-pixel grid.
    pub fn bucket(&self, size: u32) -> (i64, i64) {
        let size = f64::from(size.max(1));
        ((self.x / size).round() as i64, (self.y / size).round() as i64)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1})", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryDirection {
    Back,
    Forward,
}

/// How a `<select>` option is chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectBy {
    Value(String),
    Label(String),
    Index(u32),
}

/// Outcome claimed by the model when it terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminateStatus {
    Success,
    Failure,
}

impl TerminateStatus {
    /// The verdict the model is asserting.
    pub fn asserted_verdict(&self) -> Verdict {
        match self {
            Self::Success => Verdict::Pass,
            Self::Failure => Verdict::Fail,
        }
    }
}

/// What a targeted action points at.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Point(Point),
    Selector(String),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Point(point) => write!(f, "{}", point),
            Self::Selector(selector) => write!(f, "'{}'", selector),
        }
    }
}

/// One resolved action. Exactly one variant per command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionCommand {
    Navigate {
        url: String,
    },
    Click {
        point: Point,
    },
    DoubleClick {
        point: Point,
    },
    RightClick {
        point: Point,
    },
    Hover {
        point: Point,
    },
    /// Type into the focused element, or click `point` first.
    TypeText {
        text: String,
        #[serde(default)]
        point: Option<Point>,
        #[serde(default)]
        press_enter: bool,
        #[serde(default)]
        clear_existing: bool,
    },
    SelectOption {
        point: Point,
        option: SelectBy,
    },
    UploadFile {
        point: Point,
        files: Vec<String>,
    },
    DragDrop {
        from: Point,
        to: Point,
    },
    Scroll {
        direction: ScrollDirection,
        /// Pixels; zero means one page.
        amount: u32,
    },
    KeyPress {
        keys: Vec<String>,
    },
    Wait {
        seconds: f64,
    },
    WaitForElement {
        selector: String,
        timeout_ms: u64,
    },
    /// Enter an iframe, or return to the top-level document when `selector` is `None`.
    SwitchFrame {
        selector: Option<String>,
    },
    SwitchTab {
        index: usize,
    },
    HistoryNavigate {
        direction: HistoryDirection,
    },
    Reload,
    /// Store a fact in working memory; never touches the page.
    MemorizeFact {
        fact: String,
    },
    Terminate {
        status: TerminateStatus,
        reason: String,
    },
}

impl ActionCommand {
    /// Canonical action name, as used on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Navigate { .. } => "navigate",
            Self::Click { .. } => "click",
            Self::DoubleClick { .. } => "double_click",
            Self::RightClick { .. } => "right_click",
            Self::Hover { .. } => "hover",
            Self::TypeText { .. } => "type_text",
            Self::SelectOption { .. } => "select_option",
            Self::UploadFile { .. } => "upload_file",
            Self::DragDrop { .. } => "drag_drop",
            Self::Scroll { .. } => "scroll",
            Self::KeyPress { .. } => "key_press",
            Self::Wait { .. } => "wait",
            Self::WaitForElement { .. } => "wait_for_element",
            Self::SwitchFrame { .. } => "switch_frame",
            Self::SwitchTab { .. } => "switch_tab",
            Self::HistoryNavigate { .. } => "history_navigate",
            Self::Reload => "reload",
            Self::MemorizeFact { .. } => "memorize_fact",
            Self::Terminate { .. } => "terminate",
        }
    }

    /// The element this action acts on, if it needs pre-flight validation.
    pub fn target(&self) -> Option<Target> {
        match self {
            Self::Click { point }
            | Self::DoubleClick { point }
            | Self::RightClick { point }
            | Self::Hover { point }
            | Self::SelectOption { point, .. }
            | Self::UploadFile { point, .. } => Some(Target::Point(*point)),
            Self::TypeText { point, .. } => point.map(Target::Point),
            Self::DragDrop { from, .. } => Some(Target::Point(*from)),
            Self::SwitchFrame {
                selector: Some(selector),
            } => Some(Target::Selector(selector.clone())),
            _ => None,
        }
    }

    pub fn is_terminate(&self) -> bool {
        matches!(self, Self::Terminate { .. })
    }

    /// One-line summary for round history and logs. Never contains secrets
    /// because typed text still holds `{{name}}` placeholders here.
    pub fn describe(&self) -> String {
        match self {
            Self::Navigate { url } => format!("navigate to {}", url),
            Self::Click { point } => format!("click at {}", point),
            Self::DoubleClick { point } => format!("double-click at {}", point),
            Self::RightClick { point } => format!("right-click at {}", point),
            Self::Hover { point } => format!("hover at {}", point),
            Self::TypeText {
                text,
                point,
                press_enter,
                ..
            } => {
                let mut out = format!("type '{}'", text);
                if let Some(point) = point {
                    out.push_str(&format!(" at {}", point));
                }
                if *press_enter {
                    out.push_str(" + Enter");
                }
                out
            }
            Self::SelectOption { point, option } => match option {
                SelectBy::Value(value) => format!("select value '{}' at {}", value, point),
                SelectBy::Label(label) => format!("select '{}' at {}", label, point),
                SelectBy::Index(index) => format!("select option #{} at {}", index, point),
            },
            Self::UploadFile { point, files } => {
                format!("upload {} file(s) at {}", files.len(), point)
            }
            Self::DragDrop { from, to } => format!("drag from {} to {}", from, to),
            Self::Scroll { direction, amount } => {
                let direction = match direction {
                    ScrollDirection::Up => "up",
                    ScrollDirection::Down => "down",
                    ScrollDirection::Left => "left",
                    ScrollDirection::Right => "right",
                };
                if *amount == 0 {
                    format!("scroll {} one page", direction)
                } else {
                    format!("scroll {} {}px", direction, amount)
                }
            }
            Self::KeyPress { keys } => format!("press {}", keys.join("+")),
            Self::Wait { seconds } => format!("wait {}s", seconds),
            Self::WaitForElement {
                selector,
                timeout_ms,
            } => format!("wait up to {}ms for '{}'", timeout_ms, selector),
            Self::SwitchFrame { selector: Some(s) } => format!("switch to frame '{}'", s),
            Self::SwitchFrame { selector: None } => "switch to top-level frame".to_string(),
            Self::SwitchTab { index } => format!("switch to tab {}", index),
            Self::HistoryNavigate {
                direction: HistoryDirection::Back,
            } => "go back".to_string(),
            Self::HistoryNavigate {
                direction: HistoryDirection::Forward,
            } => "go forward".to_string(),
            Self::Reload => "reload".to_string(),
            Self::MemorizeFact { fact } => format!("memorize '{}'", fact),
            Self::Terminate { status, reason } => {
                format!("terminate ({:?}): {}", status, reason)
            }
        }
    }
}

/// Turn a model-supplied address into a navigable URL.
///
/// Bare hosts get `https://`; text with spaces becomes a web search.
pub fn normalize_url(raw: &str) -> String {
    let raw = raw.trim();
    const SCHEMES: [&str; 4] = ["https://", "http://", "file://", "about:"];
    if SCHEMES.iter().any(|scheme| raw.starts_with(scheme)) {
        raw.to_string()
    } else if raw.contains(' ') {
        search_url(raw)
    } else {
        format!("https://{}", raw)
    }
}

/// Web search URL for a free-text query.
pub fn search_url(query: &str) -> String {
    let encoded: String = query
        .trim()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("+");
    format!("https://www.bing.com/search?q={}", encoded)
}
