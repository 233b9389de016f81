//! Application configuration.
//!
//! Precedence, lowest first: built-in defaults, the JSON config file,
//! `PAGERUN_*` environment variables, command-line flags.

use crate::cli::Args;
use crate::error::CliError;
use pagerun_agent::AgentConfig;
use pagerun_runner::RunnerConfig;
use pagerun_vlm::VlmConfig;
use pagerun_webdriver::{BrowserKind, WebDriverConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "pagerun.json";

pub const ENV_VLM_BASE_URL: &str = "PAGERUN_VLM_BASE_URL";
pub const ENV_VLM_API_KEY: &str = "PAGERUN_VLM_API_KEY";
pub const ENV_VLM_MODEL: &str = "PAGERUN_VLM_MODEL";
pub const ENV_WEBDRIVER_URL: &str = "PAGERUN_WEBDRIVER_URL";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub vlm: VlmConfig,
    pub webdriver: WebDriverConfig,
    pub runner: RunnerConfig,
}

impl AppConfig {
    /// Read `path`, or `pagerun.json` if it exists, else use defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, CliError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !fallback.is_file() {
                    return Ok(Self::default());
                }
                fallback
            }
        };
        let raw = std::fs::read_to_string(&path).map_err(|e| CliError::io(&path, e))?;
        serde_json::from_str(&raw).map_err(|e| CliError::json(&path, e))
    }

    /// Apply `PAGERUN_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(url) = non_empty(ENV_VLM_BASE_URL) {
            self.vlm.base_url = url;
        }
        if let Some(key) = non_empty(ENV_VLM_API_KEY) {
            self.vlm.api_key = key;
        }
        if let Some(model) = non_empty(ENV_VLM_MODEL) {
            self.vlm.model = model;
        }
        if let Some(url) = non_empty(ENV_WEBDRIVER_URL) {
            self.webdriver.webdriver_url = url;
        }
    }

    /// Apply command-line flags.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(parallel) = args.parallel {
            self.runner.parallel = parallel;
        }
        if args.include_skipped {
            self.runner.include_skipped = true;
        }
        if args.sort_by_priority {
            self.runner.sort_by_priority = true;
        }
        if let Some(rounds) = args.max_rounds {
            self.agent.max_rounds = rounds;
        }
        if let Some(dir) = &args.screenshots {
            self.agent.screenshot_dir = Some(dir.clone());
        }
        if let Some(url) = &args.vlm_url {
            self.vlm.base_url = url.clone();
        }
        if let Some(model) = &args.model {
            self.vlm.model = model.clone();
        }
        if let Some(url) = &args.webdriver_url {
            self.webdriver.webdriver_url = url.clone();
        }
        if let Some(browser) = args.browser {
            self.webdriver.browser = browser.into();
        }
        if args.headful {
            self.webdriver.headless = false;
        }
    }
}

impl From<crate::cli::Browser> for BrowserKind {
    fn from(browser: crate::cli::Browser) -> Self {
        match browser {
            crate::cli::Browser::Chrome => BrowserKind::Chrome,
            crate::cli::Browser::Firefox => BrowserKind::Firefox,
        }
    }
}
