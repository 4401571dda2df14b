//! Browser automation over the W3C WebDriver protocol
//!
//! ```text
//! BrowserSession::launch(&RunConfig)
//!   ├── ChromeDriverService::start()   chromedriver child on a free port
//!   ├── POST /session                  capabilities from ChromeOptions
//!   ├── goto / find_element / wait_for_visible / browser_logs ...
//!   └── quit()                         DELETE /session, stop chromedriver
//! ```

pub mod driver;
pub mod options;
pub mod session;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::HarnessResult;

pub use driver::ChromeDriverService;
pub use options::ChromeOptions;
pub use session::{BrowserSession, Element};

/// Live browser state the failure hook can capture, plus release.
pub trait BrowserHandle {
    fn screenshot_png(&self) -> HarnessResult<Vec<u8>>;

    fn page_source(&self) -> HarnessResult<String>;

    fn current_url(&self) -> HarnessResult<String>;

    fn title(&self) -> HarnessResult<String>;

    /// Console entries collected since the last call.
    fn browser_logs(&self) -> HarnessResult<Vec<LogEntry>>;

    /// Terminate the browser. Calling it twice is a no-op.
    fn quit(&mut self) -> HarnessResult<()>;
}

/// Element locator. Ids and xpaths are what page objects typically use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Id(String),
    XPath(String),
    Css(String),
}

impl Locator {
    pub fn id(id: impl Into<String>) -> Self {
        Locator::Id(id.into())
    }

    pub fn xpath(xpath: impl Into<String>) -> Self {
        Locator::XPath(xpath.into())
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    /// WebDriver `using` strategy and `value` for this locator.
    pub fn strategy(&self) -> (&'static str, String) {
        match self {
            Locator::Id(id) => (
                "css selector",
                format!("[id=\"{}\"]", id.replace('\\', "\\\\").replace('"', "\\\"")),
            ),
            Locator::XPath(xpath) => ("xpath", xpath.clone()),
            Locator::Css(selector) => ("css selector", selector.clone()),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Id(id) => write!(f, "id={}", id),
            Locator::XPath(xpath) => write!(f, "xpath={}", xpath),
            Locator::Css(selector) => write!(f, "css={}", selector),
        }
    }
}

/// One browser console entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: String,
    pub message: String,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// WebDriver key codes for `Element::send_keys`.
pub mod keys {
    pub const RETURN: &str = "\u{E006}";
    pub const ENTER: &str = "\u{E007}";
    pub const TAB: &str = "\u{E004}";
    pub const ESCAPE: &str = "\u{E00C}";
    pub const BACKSPACE: &str = "\u{E003}";
}
