//! Chrome launch arguments and WebDriver capabilities

use serde_json::{json, Value};

use crate::config::{BrowserKind, RunConfig};

/// Chrome launch configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChromeOptions {
    pub headless: bool,
    /// Extra arguments appended after the defaults
    pub extra_args: Vec<String>,
}

impl ChromeOptions {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            headless: config.headless,
            extra_args: Vec::new(),
        }
    }

    /// Sandboxing and `/dev/shm` usage are always disabled so the browser can
    /// start in containers; `--headless=new` is added on request.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
        ];
        if self.headless {
            args.push("--headless=new".to_string());
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }

    /// New-session capabilities, with browser console logging enabled.
    pub fn capabilities(&self) -> Value {
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": BrowserKind::Chrome.as_str(),
                    "goog:chromeOptions": {
                        "args": self.args(),
                    },
                    "goog:loggingPrefs": {
                        "browser": "ALL",
                    },
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_args() {
        let options = ChromeOptions {
            headless: true,
            extra_args: vec![],
        };
        let args = options.args();
        assert!(args.contains(&"--headless=new".to_string()));
        assert!(args.contains(&"--no-sandbox".to_string()));
        assert!(args.contains(&"--disable-dev-shm-usage".to_string()));
    }

    #[test]
    fn test_headed_args_omit_headless() {
        let options = ChromeOptions::from_config(&RunConfig::default());
        assert!(!options.args().iter().any(|a| a.starts_with("--headless")));
    }

    #[test]
    fn test_capabilities_enable_console_logs() {
        let caps = ChromeOptions {
            headless: true,
            extra_args: vec!["--window-size=1280,720".into()],
        }
        .capabilities();
        let always = &caps["capabilities"]["alwaysMatch"];
        assert_eq!(always["browserName"], "chrome");
        assert_eq!(always["goog:loggingPrefs"]["browser"], "ALL");
        assert_eq!(always["goog:chromeOptions"]["args"][3], "--window-size=1280,720");
    }
}
