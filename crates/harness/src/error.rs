//! Error types for the harness

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Unsupported browser: {0} (only chrome is supported)")]
    UnsupportedBrowser(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("WebDriver binary not found: {binary}. Install chromedriver or set CHROMEDRIVER")]
    DriverNotFound { binary: String },

    #[error("WebDriver failed to start: {0}")]
    DriverStartup(String),

    #[error("Browser crashed or could not be launched: {0}")]
    BrowserCrashed(String),

    #[error("WebDriver error: {error} - {message}")]
    WebDriver { error: String, message: String },

    #[error("Not found within {timeout_ms} ms: {locator}")]
    WaitTimeout { locator: String, timeout_ms: u64 },

    #[error("No test is currently running")]
    NoActiveTest,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HarnessError {
    /// Configuration errors are fatal at resource acquisition and never swallowed.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            HarnessError::UnsupportedBrowser(_)
                | HarnessError::InvalidConfig(_)
                | HarnessError::DriverNotFound { .. }
                | HarnessError::DriverStartup(_)
                | HarnessError::BrowserCrashed(_)
        )
    }

    /// True for the WebDriver "no such element" error and for expired waits.
    pub fn is_not_found(&self) -> bool {
        match self {
            HarnessError::WebDriver { error, .. } => error == "no such element",
            HarnessError::WaitTimeout { .. } => true,
            _ => false,
        }
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_classification() {
        assert!(HarnessError::UnsupportedBrowser("firefox".into()).is_configuration());
        assert!(HarnessError::DriverNotFound { binary: "chromedriver".into() }.is_configuration());
        assert!(!HarnessError::NoActiveTest.is_configuration());
    }

    #[test]
    fn test_wait_timeout_is_not_found() {
        let err = HarnessError::WaitTimeout {
            locator: "id=login-input".into(),
            timeout_ms: 500,
        };
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Not found within 500 ms: id=login-input");
    }
}
