//! WebDriver connection and browser settings.

use pagerun_agent::Viewport;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Browser driven through the WebDriver endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    #[default]
    Chrome,
    Firefox,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebDriverConfig {
    /// chromedriver / geckodriver / Selenium endpoint.
    pub webdriver_url: String,
    pub browser: BrowserKind,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Browser binary, when not on the driver's default path.
    pub binary: Option<String>,
    /// Characters of visible text captured per observation.
    pub page_text_limit: usize,
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:4444".to_string(),
            browser: BrowserKind::Chrome,
            headless: true,
            viewport_width: 1440,
            viewport_height: 900,
            binary: None,
            page_text_limit: 4_000,
        }
    }
}

impl WebDriverConfig {
    pub fn viewport(&self) -> Viewport {
        Viewport {
            width: self.viewport_width,
            height: self.viewport_height,
        }
    }

    /// Session capabilities for the configured browser.
    pub fn capabilities(&self) -> Map<String, Value> {
        let mut capabilities = Map::new();
        let binary = self
            .binary
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty());

        match self.browser {
            BrowserKind::Chrome => {
                let mut args = vec![format!(
                    "--window-size={},{}",
                    self.viewport_width, self.viewport_height
                )];
                if self.headless {
                    args.push("--headless=new".to_string());
                    args.push("--disable-gpu".to_string());
                }
                let mut options = Map::new();
                options.insert("args".to_string(), json!(args));
                if let Some(binary) = binary {
                    options.insert("binary".to_string(), json!(binary));
                }
                capabilities.insert("browserName".to_string(), json!("chrome"));
                capabilities.insert("goog:chromeOptions".to_string(), Value::Object(options));
            }
            BrowserKind::Firefox => {
                let mut args = vec![
                    format!("--width={}", self.viewport_width),
                    format!("--height={}", self.viewport_height),
                ];
                if self.headless {
                    args.push("-headless".to_string());
                }
                let mut options = Map::new();
                options.insert("args".to_string(), json!(args));
                if let Some(binary) = binary {
                    options.insert("binary".to_string(), json!(binary));
                }
                capabilities.insert("browserName".to_string(), json!("firefox"));
                capabilities.insert("moz:firefoxOptions".to_string(), Value::Object(options));
            }
        }
        capabilities
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chrome_headless_capabilities() {
        let caps = WebDriverConfig::default().capabilities();
        assert_eq!(caps["browserName"], "chrome");
        let args = caps["goog:chromeOptions"]["args"].as_array().unwrap();
        assert!(args.contains(&json!("--headless=new")));
        assert!(args.contains(&json!("--window-size=1440,900")));
        assert!(caps["goog:chromeOptions"].get("binary").is_none());
    }

    #[test]
    fn test_firefox_headed_with_binary() {
        let config = WebDriverConfig {
            browser: BrowserKind::Firefox,
            headless: false,
            binary: Some("/opt/firefox/firefox".into()),
            ..WebDriverConfig::default()
        };
        let caps = config.capabilities();
        let options = &caps["moz:firefoxOptions"];
        assert_eq!(options["binary"], "/opt/firefox/firefox");
        assert!(!options["args"].as_array().unwrap().contains(&json!("-headless")));
    }

    #[test]
    fn test_browser_kind_wire_format() {
        let config: WebDriverConfig = serde_json::from_str(r#"{"browser": "firefox"}"#).unwrap();
        assert_eq!(config.browser, BrowserKind::Firefox);
        assert_eq!(config.viewport(), Viewport::default());
    }
}
