//! Parsing model output into an [`ActionCommand`].
//!
//! The decision model answers with a tool call:
//!
//! ```text
//! <tool_call>{"name": "computer_use", "arguments": {"action": "left_click", "coordinate": [120, 48]}}</tool_call>
//! ```
//!
//! Action names are looked up in a fixed dispatch table that also accepts
//! the aliases models commonly emit. Anything outside the table is an error,
//! never a silent no-op.

use crate::action::{
    normalize_url, search_url, ActionCommand, HistoryDirection, Point, ScrollDirection, SelectBy,
    TerminateStatus,
};
use serde_json::{Map, Value};
use thiserror::Error;

const TOOL_NAME: &str = "computer_use";
const OPEN_TAG: &str = "<tool_call>";
const CLOSE_TAG: &str = "</tool_call>";
const DEFAULT_WAIT_SECS: f64 = 1.0;
const DEFAULT_ELEMENT_TIMEOUT_MS: u64 = 10_000;

/// Errors turning model output into an action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Response contains no tool call")]
    NoToolCall,

    #[error("Invalid tool call JSON: {0}")]
    InvalidJson(String),

    #[error("Unexpected tool: {0}")]
    UnknownTool(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Action '{action}' is missing field '{field}'")]
    MissingField { action: String, field: &'static str },

    #[error("Action '{action}' has invalid '{field}': {reason}")]
    InvalidField {
        action: String,
        field: &'static str,
        reason: String,
    },
}

type Args = Map<String, Value>;
type Builder = fn(&str, &Args) -> Result<ActionCommand, ParseError>;

/// Action names (canonical and alias) and their builders.
const DISPATCH: &[(&str, Builder)] = &[
    ("navigate", navigate),
    ("visit_url", navigate),
    ("goto", navigate),
    ("web_search", web_search),
    ("click", click),
    ("left_click", click),
    ("double_click", double_click),
    ("right_click", right_click),
    ("hover", hover),
    ("mouse_move", hover),
    ("type", type_text),
    ("type_text", type_text),
    ("input_text", type_text),
    ("select_option", select_option),
    ("upload_file", upload_file),
    ("file_upload", upload_file),
    ("drag_drop", drag_drop),
    ("drag_and_drop", drag_drop),
    ("scroll", scroll),
    ("key", key_press),
    ("keypress", key_press),
    ("key_press", key_press),
    ("wait", wait),
    ("wait_for_element", wait_for_element),
    ("switch_frame", switch_frame),
    ("switch_tab", switch_tab),
    ("history_back", history_back),
    ("history_forward", history_forward),
    ("history_navigate", history_navigate),
    ("reload", reload),
    ("memorize_fact", memorize_fact),
    ("pause_and_memorize_fact", memorize_fact),
    ("terminate", terminate),
];

/// Extract the action arguments from a raw model response.
///
/// Accepts a `<tool_call>` block (closing tag optional) or a bare JSON object.
pub fn parse_tool_call(response: &str) -> Result<Args, ParseError> {
    let body = match response.find(OPEN_TAG) {
        Some(start) => {
            let rest = &response[start + OPEN_TAG.len()..];
            match rest.find(CLOSE_TAG) {
                Some(end) => &rest[..end],
                None => rest,
            }
        }
        None => {
            let trimmed = response.trim();
            if !trimmed.starts_with('{') {
                return Err(ParseError::NoToolCall);
            }
            trimmed
        }
    };

    let value: Value =
        serde_json::from_str(body.trim()).map_err(|e| ParseError::InvalidJson(e.to_string()))?;
    let Value::Object(mut call) = value else {
        return Err(ParseError::InvalidJson("expected a JSON object".to_string()));
    };

    if call.contains_key("action") {
        return Ok(call);
    }

    match call.get("name").and_then(Value::as_str) {
        Some(TOOL_NAME) => match call.remove("arguments") {
            Some(Value::Object(args)) => Ok(args),
            Some(Value::String(raw)) => match serde_json::from_str(&raw) {
                Ok(Value::Object(args)) => Ok(args),
                _ => Err(ParseError::InvalidJson("arguments is not an object".to_string())),
            },
            _ => Err(ParseError::MissingField {
                action: TOOL_NAME.to_string(),
                field: "arguments",
            }),
        },
        Some(other) => Err(ParseError::UnknownTool(other.to_string())),
        None => Err(ParseError::NoToolCall),
    }
}

/// Resolve tool-call arguments into a command through the dispatch table.
pub fn parse_action(args: &Args) -> Result<ActionCommand, ParseError> {
    let name = args
        .get("action")
        .and_then(Value::as_str)
        .ok_or(ParseError::MissingField {
            action: String::new(),
            field: "action",
        })?;

    let builder = DISPATCH
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, builder)| *builder)
        .ok_or_else(|| ParseError::UnknownAction(name.to_string()))?;

    builder(name, args)
}

/// Parse a raw model response all the way to a command.
pub fn parse_response(response: &str) -> Result<ActionCommand, ParseError> {
    parse_action(&parse_tool_call(response)?)
}

// Field helpers

fn missing(action: &str, field: &'static str) -> ParseError {
    ParseError::MissingField {
        action: action.to_string(),
        field,
    }
}

fn invalid(action: &str, field: &'static str, reason: impl Into<String>) -> ParseError {
    ParseError::InvalidField {
        action: action.to_string(),
        field,
        reason: reason.into(),
    }
}

fn opt_point(action: &str, args: &Args, field: &'static str) -> Result<Option<Point>, ParseError> {
    let Some(value) = args.get(field) else {
        return Ok(None);
    };
    if value.is_null() {
        return Ok(None);
    }
    let coords = value
        .as_array()
        .filter(|items| items.len() == 2)
        .ok_or_else(|| invalid(action, field, "expected [x, y]"))?;
    match (coords[0].as_f64(), coords[1].as_f64()) {
        (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Ok(Some(Point::new(x, y))),
        _ => Err(invalid(action, field, "coordinates must be numbers")),
    }
}

fn point(action: &str, args: &Args, field: &'static str) -> Result<Point, ParseError> {
    opt_point(action, args, field)?.ok_or_else(|| missing(action, field))
}

fn opt_str<'a>(args: &'a Args, fields: &[&str]) -> Option<&'a str> {
    fields
        .iter()
        .find_map(|field| args.get(*field).and_then(Value::as_str))
}

fn required_str(action: &str, args: &Args, field: &'static str) -> Result<String, ParseError> {
    match opt_str(args, &[field]) {
        Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
        _ => Err(missing(action, field)),
    }
}

fn flag(args: &Args, fields: &[&str]) -> bool {
    fields
        .iter()
        .find_map(|field| args.get(*field).and_then(Value::as_bool))
        .unwrap_or(false)
}

/// A string or a list of strings.
fn string_list(action: &str, args: &Args, field: &'static str) -> Result<Vec<String>, ParseError> {
    match args.get(field) {
        Some(Value::String(item)) => Ok(vec![item.clone()]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| invalid(action, field, "expected strings"))
            })
            .collect(),
        Some(_) => Err(invalid(action, field, "expected a string or a list")),
        None => Err(missing(action, field)),
    }
}

// Builders

fn navigate(action: &str, args: &Args) -> Result<ActionCommand, ParseError> {
    let url = required_str(action, args, "url")?;
    Ok(ActionCommand::Navigate {
        url: normalize_url(&url),
    })
}

fn web_search(action: &str, args: &Args) -> Result<ActionCommand, ParseError> {
    let query = required_str(action, args, "query")?;
    Ok(ActionCommand::Navigate {
        url: search_url(&query),
    })
}

fn click(action: &str, args: &Args) -> Result<ActionCommand, ParseError> {
    Ok(ActionCommand::Click {
        point: point(action, args, "coordinate")?,
    })
}

fn double_click(action: &str, args: &Args) -> Result<ActionCommand, ParseError> {
    Ok(ActionCommand::DoubleClick {
        point: point(action, args, "coordinate")?,
    })
}

fn right_click(action: &str, args: &Args) -> Result<ActionCommand, ParseError> {
    Ok(ActionCommand::RightClick {
        point: point(action, args, "coordinate")?,
    })
}

fn hover(action: &str, args: &Args) -> Result<ActionCommand, ParseError> {
    Ok(ActionCommand::Hover {
        point: point(action, args, "coordinate")?,
    })
}

fn type_text(action: &str, args: &Args) -> Result<ActionCommand, ParseError> {
    let text = opt_str(args, &["text"]).ok_or_else(|| missing(action, "text"))?;
    Ok(ActionCommand::TypeText {
        text: text.to_string(),
        point: opt_point(action, args, "coordinate")?,
        press_enter: flag(args, &["press_enter"]),
        clear_existing: flag(args, &["delete_existing_text", "clear_existing"]),
    })
}

fn select_option(action: &str, args: &Args) -> Result<ActionCommand, ParseError> {
    let point = point(action, args, "coordinate")?;
    let option = if let Some(value) = opt_str(args, &["value"]) {
        SelectBy::Value(value.to_string())
    } else if let Some(label) = opt_str(args, &["label"]) {
        SelectBy::Label(label.to_string())
    } else if let Some(index) = args.get("index").and_then(Value::as_u64) {
        let index = u32::try_from(index).map_err(|_| invalid(action, "index", "out of range"))?;
        SelectBy::Index(index)
    } else {
        return Err(missing(action, "value"));
    };
    Ok(ActionCommand::SelectOption { point, option })
}

fn upload_file(action: &str, args: &Args) -> Result<ActionCommand, ParseError> {
    let files = string_list(action, args, "files")?;
    if files.is_empty() {
        return Err(invalid(action, "files", "no files given"));
    }
    Ok(ActionCommand::UploadFile {
        point: point(action, args, "coordinate")?,
        files,
    })
}

fn drag_drop(action: &str, args: &Args) -> Result<ActionCommand, ParseError> {
    Ok(ActionCommand::DragDrop {
        from: point(action, args, "start_coordinate")?,
        to: point(action, args, "end_coordinate")?,
    })
}

/// `pixels > 0` scrolls up one page, `pixels < 0` down; an explicit
/// `direction` wins over the sign.
fn scroll(action: &str, args: &Args) -> Result<ActionCommand, ParseError> {
    if let Some(direction) = opt_str(args, &["direction"]) {
        let direction = match direction.to_ascii_lowercase().as_str() {
            "up" => ScrollDirection::Up,
            "down" => ScrollDirection::Down,
            "left" => ScrollDirection::Left,
            "right" => ScrollDirection::Right,
            other => return Err(invalid(action, "direction", other)),
        };
        let amount = args
            .get("amount")
            .or_else(|| args.get("pixels"))
            .and_then(Value::as_f64)
            .map(|px| px.abs().min(f64::from(u32::MAX)) as u32)
            .unwrap_or(0);
        return Ok(ActionCommand::Scroll { direction, amount });
    }

    let pixels = args
        .get("pixels")
        .and_then(Value::as_f64)
        .ok_or_else(|| missing(action, "pixels"))?;
    let direction = if pixels > 0.0 {
        ScrollDirection::Up
    } else {
        ScrollDirection::Down
    };
    Ok(ActionCommand::Scroll {
        direction,
        amount: 0,
    })
}

fn key_press(action: &str, args: &Args) -> Result<ActionCommand, ParseError> {
    let keys = string_list(action, args, "keys")?;
    if keys.is_empty() {
        return Err(invalid(action, "keys", "no keys given"));
    }
    Ok(ActionCommand::KeyPress { keys })
}

fn wait(action: &str, args: &Args) -> Result<ActionCommand, ParseError> {
    let seconds = ["time", "duration", "seconds"]
        .iter()
        .find_map(|field| args.get(*field).and_then(Value::as_f64))
        .unwrap_or(DEFAULT_WAIT_SECS);
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(invalid(action, "time", "must be a non-negative number"));
    }
    Ok(ActionCommand::Wait { seconds })
}

fn wait_for_element(action: &str, args: &Args) -> Result<ActionCommand, ParseError> {
    Ok(ActionCommand::WaitForElement {
        selector: required_str(action, args, "selector")?,
        timeout_ms: args
            .get("timeout")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_ELEMENT_TIMEOUT_MS),
    })
}

fn switch_frame(_action: &str, args: &Args) -> Result<ActionCommand, ParseError> {
    let selector = opt_str(args, &["frame", "selector"])
        .map(str::trim)
        .filter(|s| !s.is_empty() && !matches!(*s, "main" | "top" | "parent"))
        .map(str::to_string);
    Ok(ActionCommand::SwitchFrame { selector })
}

fn switch_tab(action: &str, args: &Args) -> Result<ActionCommand, ParseError> {
    let index = args.get("index").and_then(Value::as_u64).unwrap_or(0);
    let index = usize::try_from(index).map_err(|_| invalid(action, "index", "out of range"))?;
    Ok(ActionCommand::SwitchTab { index })
}

fn history_back(_action: &str, _args: &Args) -> Result<ActionCommand, ParseError> {
    Ok(ActionCommand::HistoryNavigate {
        direction: HistoryDirection::Back,
    })
}

fn history_forward(_action: &str, _args: &Args) -> Result<ActionCommand, ParseError> {
    Ok(ActionCommand::HistoryNavigate {
        direction: HistoryDirection::Forward,
    })
}

fn history_navigate(action: &str, args: &Args) -> Result<ActionCommand, ParseError> {
    let direction = match opt_str(args, &["direction"]) {
        Some("back") | None => HistoryDirection::Back,
        Some("forward") => HistoryDirection::Forward,
        Some(other) => return Err(invalid(action, "direction", other)),
    };
    Ok(ActionCommand::HistoryNavigate { direction })
}

fn reload(_action: &str, _args: &Args) -> Result<ActionCommand, ParseError> {
    Ok(ActionCommand::Reload)
}

fn memorize_fact(action: &str, args: &Args) -> Result<ActionCommand, ParseError> {
    Ok(ActionCommand::MemorizeFact {
        fact: required_str(action, args, "fact")?,
    })
}

fn terminate(action: &str, args: &Args) -> Result<ActionCommand, ParseError> {
    let status = match opt_str(args, &["status", "verdict"])
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("success") | Some("pass") | Some("passed") | None => TerminateStatus::Success,
        Some("failure") | Some("fail") | Some("failed") => TerminateStatus::Failure,
        Some(other) => return Err(invalid(action, "status", other)),
    };
    let reason = opt_str(args, &["reason", "rationale"])
        .unwrap_or_default()
        .to_string();
    Ok(ActionCommand::Terminate { status, reason })
}
