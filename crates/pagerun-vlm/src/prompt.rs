//! Chat messages sent to the model.
//!
//! Each request carries a system prompt describing the tool, and one user
//! message with the task context plus the current screenshot. Earlier
//! screenshots are never resent; past rounds travel as text summaries.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use pagerun_agent::DecisionRequest;
use serde::Serialize;

/// One chat message in OpenAI wire format.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Messages for one decision.
pub fn build_messages(request: &DecisionRequest) -> Vec<ChatMessage> {
    let viewport = request.observation.viewport;
    let mut user = vec![ContentPart::Text {
        text: user_text(request),
    }];
    if !request.observation.screenshot.is_empty() {
        user.push(ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: png_data_url(&request.observation.screenshot),
            },
        });
    }

    vec![
        ChatMessage {
            role: "system",
            content: vec![ContentPart::Text {
                text: system_prompt(viewport.width, viewport.height),
            }],
        },
        ChatMessage {
            role: "user",
            content: user,
        },
    ]
}

/// `data:image/png;base64,...`
pub fn png_data_url(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}

/// Tool description and testing rules.
pub fn system_prompt(width: u32, height: u32) -> String {
    format!(
        r#"You are an end-to-end QA tester driving a real web browser through screenshots.

The screenshot is {width}x{height} pixels; coordinates are pixels in that image.

Testing rules:
- Only terminate with success when the page clearly satisfies every pass criterion.
- If a fail criterion is visible, or you are blocked, confused or on an error page, terminate with failure and name the problem.
- Never claim success for something you did not see.
- After a submit or navigation, judge the new page instead of restarting the flow.
- Avoid repeating the same click or scroll; if an approach does not work, change it or fail.
- Credentials are given as {{{{name}}}} placeholders. Type the placeholder exactly; it is filled in for you.

Actions (argument names in parentheses):
- visit_url (url): open a URL; bare hosts get https://, text with spaces is searched.
- web_search (query): search the web.
- left_click, double_click, right_click, mouse_move (coordinate [x, y]).
- type (text, optional coordinate, press_enter, delete_existing_text).
- key (keys: list such as ["Enter"], ["Escape"], ["Control", "a"]).
- scroll (pixels: positive scrolls up, negative down; or direction up|down|left|right).
- select_option (coordinate, value | label | index).
- upload_file (coordinate, files).
- drag_and_drop (start_coordinate, end_coordinate).
- wait (time in seconds), wait_for_element (selector, timeout in ms).
- switch_frame (selector, or "main"), switch_tab (index).
- history_back, history_forward, reload.
- pause_and_memorize_fact (fact): remember something for later rounds.
- terminate (status: success | failure, reason).

Think briefly, then answer with exactly one tool call:
<tool_call>
{{"name": "computer_use", "arguments": {{"action": "left_click", "coordinate": [100, 200]}}}}
</tool_call>"#
    )
}

/// Task context for the current round.
pub fn user_text(request: &DecisionRequest) -> String {
    let mut lines = vec![
        format!("Objective: {}", request.objective),
        format!("Current URL: {}", request.observation.url),
        format!("Page title: {}", request.observation.title),
        format!(
            "Round {} of {} ({} left after this one)",
            request.round,
            request.max_rounds,
            request.rounds_left()
        ),
    ];

    section(&mut lines, "Steps:", &request.steps);
    section(&mut lines, "PASS criteria:", &request.pass_criteria);
    section(&mut lines, "FAIL criteria:", &request.fail_criteria);

    if !request.credential_names.is_empty() {
        let placeholders: Vec<String> = request
            .credential_names
            .iter()
            .map(|name| format!("{{{{{}}}}}", name))
            .collect();
        lines.push(String::new());
        lines.push(format!("Credential placeholders: {}", placeholders.join(", ")));
    }
    if let Some(notes) = &request.notes {
        lines.push(String::new());
        lines.push(format!("Notes: {}", notes));
    }

    section(&mut lines, "Memorized facts:", &request.facts);
    section(&mut lines, "Recent actions:", &request.history);
    section(&mut lines, "Warnings:", &request.warnings);

    if !request.observation.page_text.is_empty() {
        lines.push(String::new());
        lines.push("Visible text (excerpt):".to_string());
        lines.push(excerpt(&request.observation.page_text, 2_000));
    }

    lines.join("\n")
}

fn section(lines: &mut Vec<String>, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    lines.push(String::new());
    lines.push(title.to_string());
    lines.extend(items.iter().map(|item| format!("- {}", item)));
}

fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}
