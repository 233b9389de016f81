//! Dispatching a validated command to the browser session.

use crate::config::WaitLimits;
use crate::error::AgentError;
use crate::memory::WorkingMemory;
use crate::provider::{ActionReport, BrowserSession, ProviderError};
use pagerun_core::{ActionCommand, TerminateStatus};
use std::time::Duration;
use tracing::debug;

/// What executing a command produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Executed {
    /// The page was acted on.
    Action(ActionReport),
    /// A fact to add to working memory.
    Fact(String),
    /// The model ended the attempt.
    Terminate {
        status: TerminateStatus,
        reason: String,
    },
}

/// Execute one command. Credential placeholders are substituted here and
/// nowhere earlier; errors are redacted before they leave this function.
/// Waits are capped by `limits`.
pub async fn execute(
    session: &mut dyn BrowserSession,
    command: &ActionCommand,
    memory: &WorkingMemory,
    limits: WaitLimits,
) -> Result<Executed, AgentError> {
    debug!(action = command.name(), "Executing action");

    let report = match command {
        ActionCommand::Navigate { url } => {
            let url = resolve(memory, url)?;
            session.navigate(&url).await
        }
        ActionCommand::Click { point } => session.click(*point).await,
        ActionCommand::DoubleClick { point } => session.double_click(*point).await,
        ActionCommand::RightClick { point } => session.right_click(*point).await,
        ActionCommand::Hover { point } => session.hover(*point).await,
        ActionCommand::TypeText {
            text,
            point,
            press_enter,
            clear_existing,
        } => {
            let text = resolve(memory, text)?;
            session
                .type_text(&text, *point, *press_enter, *clear_existing)
                .await
        }
        ActionCommand::SelectOption { point, option } => {
            session.select_option(*point, option).await
        }
        ActionCommand::UploadFile { point, files } => session.upload_file(*point, files).await,
        ActionCommand::DragDrop { from, to } => session.drag_drop(*from, *to).await,
        ActionCommand::Scroll { direction, amount } => session.scroll(*direction, *amount).await,
        ActionCommand::KeyPress { keys } => session.key_press(keys).await,
        ActionCommand::Wait { seconds } => {
            let duration = Duration::try_from_secs_f64(*seconds)
                .map_err(|e| AgentError::Execution(format!("invalid wait: {}", e)))?
                .min(limits.max_wait);
            tokio::time::sleep(duration).await;
            Ok(ActionReport::new(format!("waited {}s", duration.as_secs_f64())))
        }
        ActionCommand::WaitForElement {
            selector,
            timeout_ms,
        } => {
            let timeout = Duration::from_millis(*timeout_ms).min(limits.max_element_wait);
            session.wait_for_element(selector, timeout).await
        }
        ActionCommand::SwitchFrame { selector } => session.switch_frame(selector.as_deref()).await,
        ActionCommand::SwitchTab { index } => session.switch_tab(*index).await,
        ActionCommand::HistoryNavigate { direction } => session.history_navigate(*direction).await,
        ActionCommand::Reload => session.reload().await,
        ActionCommand::MemorizeFact { fact } => return Ok(Executed::Fact(fact.clone())),
        ActionCommand::Terminate { status, reason } => {
            return Ok(Executed::Terminate {
                status: *status,
                reason: reason.clone(),
            })
        }
    };

    report
        .map(Executed::Action)
        .map_err(|e: ProviderError| AgentError::Execution(memory.redact(&e.to_string())))
}

fn resolve(memory: &WorkingMemory, text: &str) -> Result<String, AgentError> {
    memory
        .resolve(text)
        .map_err(|e| AgentError::Execution(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoopGuardConfig;
    use crate::testing::{FakeBrowser, FakePage};
    use pagerun_core::{Credentials, Point};

    fn memory() -> WorkingMemory {
        WorkingMemory::new(
            Credentials::new().with("password", "hunter2"),
            LoopGuardConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_type_text_substitutes_credentials() {
        let browser = FakeBrowser::new(vec![FakePage::new("https://a.test", "A")]);
        let mut session = browser.session();
        let command = ActionCommand::TypeText {
            text: "{{password}}".into(),
            point: Some(Point::new(1.0, 1.0)),
            press_enter: false,
            clear_existing: false,
        };

        let executed = execute(&mut session, &command, &memory(), WaitLimits::default())
            .await.unwrap();
        assert!(matches!(executed, Executed::Action(_)));
        assert_eq!(browser.typed(), vec!["hunter2".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_placeholder_is_execution_error() {
        let browser = FakeBrowser::new(vec![FakePage::new("https://a.test", "A")]);
        let mut session = browser.session();
        let command = ActionCommand::TypeText {
            text: "{{otp}}".into(),
            point: None,
            press_enter: false,
            clear_existing: false,
        };

        let err = execute(&mut session, &command, &memory(), WaitLimits::default())
            .await.unwrap_err();
        assert!(matches!(err, AgentError::Execution(_)));
        assert!(browser.typed().is_empty());
    }

    #[tokio::test]
    async fn test_terminate_and_fact_do_not_touch_page() {
        let browser = FakeBrowser::new(vec![FakePage::new("https://a.test", "A")]);
        let mut session = browser.session();

        let fact = ActionCommand::MemorizeFact {
            fact: "total is $12".into(),
        };
        assert_eq!(
            execute(&mut session, &fact, &memory(), WaitLimits::default())
                .await
                .unwrap(),
            Executed::Fact("total is $12".into())
        );

        let terminate = ActionCommand::Terminate {
            status: TerminateStatus::Success,
            reason: "done".into(),
        };
        assert!(matches!(
            execute(&mut session, &terminate, &memory(), WaitLimits::default())
                .await
                .unwrap(),
            Executed::Terminate { .. }
        ));
        assert!(browser.actions().is_empty());
    }

    #[tokio::test]
    async fn test_provider_failure_is_redacted() {
        let browser = FakeBrowser::new(vec![FakePage::new("https://a.test", "A")]);
        browser.fail_actions_with("rejected value hunter2");
        let mut session = browser.session();
        let command = ActionCommand::Click {
            point: Point::new(1.0, 1.0),
        };

        let err = execute(&mut session, &command, &memory(), WaitLimits::default())
            .await.unwrap_err();
        assert!(!err.to_string().contains("hunter2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_sleeps() {
        let browser = FakeBrowser::new(vec![FakePage::new("https://a.test", "A")]);
        let mut session = browser.session();
        let started = tokio::time::Instant::now();

        execute(
            &mut session,
            &ActionCommand::Wait { seconds: 2.5 },
            &memory(),
            WaitLimits::default(),
        )
        .await
        .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(2500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_waits_are_capped() {
        let browser = FakeBrowser::new(vec![FakePage::new("https://a.test", "A")]);
        let mut session = browser.session();
        let limits = WaitLimits {
            max_wait: Duration::from_secs(5),
            max_element_wait: Duration::from_secs(8),
        };
        let started = tokio::time::Instant::now();

        let executed = execute(
            &mut session,
            &ActionCommand::Wait { seconds: 1e6 },
            &memory(),
            limits,
        )
        .await
        .unwrap();
        assert!(started.elapsed() < Duration::from_secs(6));
        assert_eq!(
            executed,
            Executed::Action(ActionReport::new("waited 5s"))
        );

        let wait_for = ActionCommand::WaitForElement {
            selector: "#done".into(),
            timeout_ms: 86_400_000,
        };
        execute(&mut session, &wait_for, &memory(), limits)
            .await
            .unwrap();
        assert_eq!(browser.element_waits(), vec![Duration::from_secs(8)]);
    }
}
