//! Vision-language decision service for pagerun.
//!
//! Talks to any OpenAI-compatible chat completions endpoint (LM Studio,
//! vLLM, hosted APIs) and turns each answer into one action.

pub mod client;
pub mod config;
pub mod error;
pub mod prompt;

pub use client::VlmClient;
pub use config::VlmConfig;
pub use error::VlmError;
pub use prompt::{build_messages, ChatMessage};
