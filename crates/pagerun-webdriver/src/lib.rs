//! WebDriver automation provider for pagerun.
//!
//! Drives Chrome or Firefox through a running chromedriver, geckodriver or
//! Selenium endpoint. Every attempt gets its own browser session.

pub mod config;
mod scripts;
pub mod session;

pub use config::{BrowserKind, WebDriverConfig};
pub use session::{WebDriverFactory, WebDriverSession};
