//! Model endpoint configuration.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for an OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VlmConfig {
    /// API root, e.g. `http://localhost:1234/v1`.
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Sent only when set; local servers tend to want 0.85.
    pub top_p: Option<f32>,
    /// Per-request HTTP timeout (seconds).
    pub request_timeout_secs: u64,
    /// Calls per decision, including the first.
    pub max_attempts: u32,
    /// First backoff delay (ms); doubles per retry up to `backoff_max_ms`.
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for VlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:1234/v1".to_string(),
            api_key: "lm-studio".to_string(),
            model: "microsoft_fara-7b".to_string(),
            temperature: 0.1,
            max_tokens: 768,
            top_p: None,
            request_timeout_secs: 120,
            max_attempts: 3,
            backoff_base_ms: 2_000,
            backoff_max_ms: 10_000,
        }
    }
}

impl VlmConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Chat completions URL.
    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Delay before retry number `retry` (1-based), with up to 25% jitter.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        let base = self
            .backoff_base_ms
            .saturating_mul(1u64 << exponent)
            .min(self.backoff_max_ms);
        let jitter = if base >= 4 {
            rand::thread_rng().gen_range(0..=base / 4)
        } else {
            0
        };
        Duration::from_millis(base.saturating_add(jitter).min(self.backoff_max_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VlmConfig::default();
        assert_eq!(config.endpoint(), "http://localhost:1234/v1/chat/completions");
        assert_eq!(config.model, "microsoft_fara-7b");
        assert_eq!(config.max_tokens, 768);
    }

    #[test]
    fn test_endpoint_trims_slash() {
        let config = VlmConfig::default().with_base_url("https://api.test/v1/");
        assert_eq!(config.endpoint(), "https://api.test/v1/chat/completions");
    }

    #[test]
    fn test_backoff_grows_and_is_capped() {
        let config = VlmConfig::default();
        let first = config.backoff(1);
        assert!(first >= Duration::from_millis(2_000));
        assert!(first <= Duration::from_millis(2_500));
        let second = config.backoff(2);
        assert!(second >= Duration::from_millis(4_000));
        assert_eq!(config.backoff(10), Duration::from_millis(10_000));
    }

    #[test]
    fn test_partial_json() {
        let config: VlmConfig = serde_json::from_str(r#"{"model": "qwen2.5-vl"}"#).unwrap();
        assert_eq!(config.model, "qwen2.5-vl");
        assert_eq!(config.api_key, "lm-studio");
    }
}
