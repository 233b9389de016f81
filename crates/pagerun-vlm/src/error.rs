//! Error types for the model client.

use pagerun_agent::DecisionError;
use thiserror::Error;

/// Errors talking to the model endpoint.
#[derive(Debug, Error)]
pub enum VlmError {
    /// Transport failure or timeout.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response had no message content.
    #[error("empty response from model")]
    EmptyResponse,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl VlmError {
    /// Transport errors, rate limits, server errors and empty answers are
    /// worth another try; client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::EmptyResponse => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidConfig(_) => false,
        }
    }
}

impl From<VlmError> for DecisionError {
    fn from(e: VlmError) -> Self {
        DecisionError::Unavailable(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        let status = |status| VlmError::Status {
            status,
            body: String::new(),
        };
        assert!(status(429).is_retryable());
        assert!(status(503).is_retryable());
        assert!(!status(401).is_retryable());
        assert!(VlmError::EmptyResponse.is_retryable());
        assert!(!VlmError::InvalidConfig("x".into()).is_retryable());
    }

    #[test]
    fn test_into_decision_error() {
        let err: DecisionError = VlmError::EmptyResponse.into();
        assert_eq!(
            err,
            DecisionError::Unavailable("empty response from model".into())
        );
    }
}
