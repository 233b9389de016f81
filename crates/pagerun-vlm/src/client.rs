//! HTTP client for OpenAI-compatible chat completion endpoints.

use crate::config::VlmConfig;
use crate::error::VlmError;
use crate::prompt::{build_messages, ChatMessage};
use async_trait::async_trait;
use pagerun_agent::{Decision, DecisionError, DecisionRequest, DecisionService};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Stop sequences; the closing tag is cut and tolerated by the parser.
const STOP: [&str; 3] = ["</tool_call>", "<|im_end|>", "<|endoftext|>"];

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    stop: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Decision service backed by a vision-language model.
pub struct VlmClient {
    http: reqwest::Client,
    config: VlmConfig,
}

impl VlmClient {
    /// Create a new client.
    pub fn new(config: VlmConfig) -> Result<Self, VlmError> {
        if config.base_url.trim().is_empty() {
            return Err(VlmError::InvalidConfig("base_url is empty".to_string()));
        }
        if config.max_attempts == 0 {
            return Err(VlmError::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &VlmConfig {
        &self.config
    }

    /// Send `messages`, retrying transient failures with backoff.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String, VlmError> {
        let mut attempt = 1;
        loop {
            match self.complete_once(messages).await {
                Ok(content) => return Ok(content),
                Err(e) if e.is_retryable() && attempt < self.config.max_attempts => {
                    let delay = self.config.backoff(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Model call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn complete_once(&self, messages: &[ChatMessage]) -> Result<String, VlmError> {
        let url = self.config.endpoint();
        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            top_p: self.config.top_p,
            stop: &STOP,
        };
        debug!(url = %url, model = %self.config.model, "POST chat completion");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<response unavailable>".to_string());
            return Err(VlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatCompletionResponse = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(VlmError::EmptyResponse)
    }
}

#[async_trait]
impl DecisionService for VlmClient {
    async fn decide(&self, request: &DecisionRequest) -> Result<Decision, DecisionError> {
        let messages = build_messages(request);
        let content = self.complete(&messages).await?;
        debug!(
            task_id = %request.task_id,
            round = request.round,
            response_len = content.len(),
            "Model responded"
        );
        Decision::from_response(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagerun_agent::Observation;
    use pagerun_core::{ActionCommand, Point, TaskId};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response per connection, in order.
    async fn serve(responses: Vec<(u16, String)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                read_request(&mut socket).await;
                let response = format!(
                    "HTTP/1.1 {} Test\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });
        format!("http://{}/v1", addr)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(header_end) = text.find("\r\n\r\n") {
                let length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + length {
                    return;
                }
            }
        }
    }

    fn completion(content: &str) -> String {
        serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })
        .to_string()
    }

    fn config(base_url: String) -> VlmConfig {
        VlmConfig {
            backoff_base_ms: 1,
            backoff_max_ms: 5,
            ..VlmConfig::default().with_base_url(base_url)
        }
    }

    fn request() -> DecisionRequest {
        DecisionRequest {
            task_id: TaskId::new("t1"),
            objective: "Open the menu".into(),
            steps: Vec::new(),
            pass_criteria: vec!["menu visible".into()],
            fail_criteria: vec!["error shown".into()],
            notes: None,
            credential_names: Vec::new(),
            facts: Vec::new(),
            history: Vec::new(),
            warnings: Vec::new(),
            round: 1,
            max_rounds: 3,
            observation: Arc::new(Observation::new("https://a.test", "A").with_screenshot(vec![1])),
        }
    }

    #[tokio::test]
    async fn test_decide_parses_tool_call() {
        let base_url = serve(vec![(
            200,
            completion(
                "Menu icon top left.\n<tool_call>{\"name\": \"computer_use\", \"arguments\": {\"action\": \"left_click\", \"coordinate\": [12, 30]}}",
            ),
        )])
        .await;
        let client = VlmClient::new(config(base_url)).unwrap();

        let decision = client.decide(&request()).await.unwrap();
        assert_eq!(
            decision.command,
            ActionCommand::Click {
                point: Point::new(12.0, 30.0)
            }
        );
        assert_eq!(decision.rationale.as_deref(), Some("Menu icon top left."));
    }

    #[tokio::test]
    async fn test_retries_server_errors() {
        let base_url = serve(vec![
            (503, "{}".to_string()),
            (200, completion(r#"{"action": "reload"}"#)),
        ])
        .await;
        let client = VlmClient::new(config(base_url)).unwrap();

        let decision = client.decide(&request()).await.unwrap();
        assert_eq!(decision.command, ActionCommand::Reload);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let base_url = serve(vec![(401, "{\"error\": \"bad key\"}".to_string())]).await;
        let client = VlmClient::new(config(base_url)).unwrap();

        let err = client.decide(&request()).await.unwrap_err();
        assert!(matches!(err, DecisionError::Unavailable(ref msg) if msg.contains("401")));
    }

    #[tokio::test]
    async fn test_unparseable_answer_is_malformed() {
        let base_url = serve(vec![(200, completion("I am not sure what to do."))]).await;
        let client = VlmClient::new(config(base_url)).unwrap();

        let err = client.decide(&request()).await.unwrap_err();
        assert_eq!(err.raw_response(), Some("I am not sure what to do."));
    }

    #[test]
    fn test_request_body_shape() {
        let messages = build_messages(&request());
        let body = ChatCompletionRequest {
            model: "m",
            messages: &messages,
            temperature: 0.1,
            max_tokens: 768,
            top_p: None,
            stop: &STOP,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["stop"][0], "</tool_call>");
        assert!(json.get("top_p").is_none());
        assert_eq!(json["messages"][0]["role"], "system");
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let config = VlmConfig {
            max_attempts: 0,
            ..VlmConfig::default()
        };
        assert!(matches!(
            VlmClient::new(config),
            Err(VlmError::InvalidConfig(_))
        ));
    }
}
