//! Run configuration resolved from command-line options, environment
//! variables and defaults, in that priority order.
//!
//! | Setting | CLI option | Environment | Default |
//! |---------|------------|-------------|---------|
//! | Base URL | `--base-url` | `BASE_URL` | `http://localhost:9000` |
//! | Headless | `--headless` | `HEADLESS=true` | `false` |
//! | Browser | `--browser` | `BROWSER` | `chrome` |
//! | API user | `--api-user` | `API_USER` | `admin` |
//! | API password | `--api-pass` | `API_PASS` | `Mypassword1?` |
//! | Results dir | `--results-dir` | `ALLURE_RESULTS_DIR` | `allure-results` |
//! | Driver binary | `--chromedriver` | `CHROMEDRIVER` | `chromedriver` |

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};

pub const DEFAULT_BASE_URL: &str = "http://localhost:9000";
pub const DEFAULT_API_USER: &str = "admin";
pub const DEFAULT_API_PASS: &str = "Mypassword1?";
pub const DEFAULT_RESULTS_DIR: &str = "allure-results";
pub const DEFAULT_DRIVER_BINARY: &str = "chromedriver";

pub const ENV_BASE_URL: &str = "BASE_URL";
pub const ENV_HEADLESS: &str = "HEADLESS";
pub const ENV_BROWSER: &str = "BROWSER";
pub const ENV_API_USER: &str = "API_USER";
pub const ENV_API_PASS: &str = "API_PASS";
pub const ENV_RESULTS_DIR: &str = "ALLURE_RESULTS_DIR";
pub const ENV_DRIVER_BINARY: &str = "CHROMEDRIVER";
pub const ENV_IMAGE_TAG: &str = "IMAGE_TAG";
pub const ENV_TARGET_URL: &str = "SONARQUBE_URL";
pub const ENV_TARGET_USERNAME: &str = "SONARQUBE_USERNAME";

/// Variables copied into [`RunConfig::extra_env`] when set.
pub const EXTRA_ENV_KEYS: &[&str] = &[
    ENV_BASE_URL,
    ENV_API_USER,
    ENV_IMAGE_TAG,
    ENV_TARGET_URL,
    ENV_TARGET_USERNAME,
    ENV_HEADLESS,
];

/// Snapshot of the [`EXTRA_ENV_KEYS`] that are set and non-empty
pub fn capture_extra_env(env: &dyn EnvSource) -> BTreeMap<String, String> {
    EXTRA_ENV_KEYS
        .iter()
        .filter_map(|key| env.non_empty(key).map(|value| (key.to_string(), value)))
        .collect()
}

/// Source of environment variables.
pub trait EnvSource: Send + Sync {
    fn var(&self, key: &str) -> Option<String>;

    /// Like [`EnvSource::var`] but treats empty values as unset.
    fn non_empty(&self, key: &str) -> Option<String> {
        self.var(key).filter(|value| !value.is_empty())
    }
}

/// The process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

impl EnvSource for BTreeMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Command-line options understood by harness binaries.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "evidence-harness")]
#[command(about = "Run instrumented API and UI tests")]
pub struct CliOptions {
    /// Base URL of the application under test (overrides BASE_URL)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Run browsers in headless mode
    #[arg(long)]
    pub headless: bool,

    /// Browser to use (chrome)
    #[arg(long)]
    pub browser: Option<String>,

    /// Username for basic authentication
    #[arg(long)]
    pub api_user: Option<String>,

    /// Password for basic authentication
    #[arg(long)]
    pub api_pass: Option<String>,

    /// Directory that receives report results
    #[arg(long)]
    pub results_dir: Option<PathBuf>,

    /// Path to the chromedriver binary
    #[arg(long)]
    pub chromedriver: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    #[default]
    Chrome,
}

impl BrowserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserKind::Chrome => "chrome",
        }
    }
}

impl FromStr for BrowserKind {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chrome" => Ok(BrowserKind::Chrome),
            _ => Err(HarnessError::UnsupportedBrowser(s.to_string())),
        }
    }
}

impl fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Basic-auth credentials for the application under test.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Configuration shared read-only by every component for a whole run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub base_url: String,
    pub credentials: Option<Credentials>,
    pub browser: BrowserKind,
    pub headless: bool,
    /// Allow-listed environment variables that were set at resolution time
    pub extra_env: BTreeMap<String, String>,
    pub results_dir: PathBuf,
    pub driver_binary: PathBuf,
    pub verbose: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            credentials: Some(Credentials::new(DEFAULT_API_USER, DEFAULT_API_PASS)),
            browser: BrowserKind::Chrome,
            headless: false,
            extra_env: BTreeMap::new(),
            results_dir: PathBuf::from(DEFAULT_RESULTS_DIR),
            driver_binary: PathBuf::from(DEFAULT_DRIVER_BINARY),
            verbose: false,
        }
    }
}

impl RunConfig {
    /// Resolve from CLI options and the process environment.
    pub fn from_cli(cli: &CliOptions) -> HarnessResult<Self> {
        Self::resolve(cli, &ProcessEnv)
    }

    /// Resolve each setting as CLI option, then environment, then default.
    ///
    /// An unsupported browser is a fatal configuration error.
    pub fn resolve(cli: &CliOptions, env: &dyn EnvSource) -> HarnessResult<Self> {
        let base_url = cli
            .base_url
            .clone()
            .filter(|url| !url.is_empty())
            .or_else(|| env.non_empty(ENV_BASE_URL))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(HarnessError::InvalidConfig(format!(
                "base URL must start with http:// or https://, got '{}'",
                base_url
            )));
        }

        let headless = cli.headless
            || env
                .var(ENV_HEADLESS)
                .map(|value| value.eq_ignore_ascii_case("true"))
                .unwrap_or(false);

        let browser = match cli.browser.clone().or_else(|| env.non_empty(ENV_BROWSER)) {
            Some(requested) => requested.parse::<BrowserKind>()?,
            None => BrowserKind::default(),
        };

        let username = cli
            .api_user
            .clone()
            .or_else(|| env.non_empty(ENV_API_USER))
            .unwrap_or_else(|| DEFAULT_API_USER.to_string());
        let password = cli
            .api_pass
            .clone()
            .or_else(|| env.var(ENV_API_PASS))
            .unwrap_or_else(|| DEFAULT_API_PASS.to_string());

        let results_dir = cli
            .results_dir
            .clone()
            .or_else(|| env.non_empty(ENV_RESULTS_DIR).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_RESULTS_DIR));

        let driver_binary = cli
            .chromedriver
            .clone()
            .or_else(|| env.non_empty(ENV_DRIVER_BINARY).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DRIVER_BINARY));

        Ok(Self {
            base_url,
            credentials: Some(Credentials::new(username, password)),
            browser,
            headless,
            extra_env: capture_extra_env(env),
            results_dir,
            driver_binary,
            verbose: cli.verbose,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let config = RunConfig::resolve(&CliOptions::default(), &env(&[])).unwrap();
        assert_eq!(config.base_url, "http://localhost:9000");
        assert!(!config.headless);
        assert_eq!(config.browser, BrowserKind::Chrome);
        assert_eq!(config.credentials, Some(Credentials::new("admin", "Mypassword1?")));
        assert_eq!(config.results_dir, PathBuf::from("allure-results"));
        assert!(config.extra_env.is_empty());
    }

    #[test]
    fn test_cli_option_beats_environment() {
        let cli = CliOptions {
            base_url: Some("http://cli:9000".into()),
            ..Default::default()
        };
        let config = RunConfig::resolve(&cli, &env(&[("BASE_URL", "http://env:9000")])).unwrap();
        assert_eq!(config.base_url, "http://cli:9000");
    }

    #[test]
    fn test_environment_beats_default() {
        let config = RunConfig::resolve(
            &CliOptions::default(),
            &env(&[("BASE_URL", "http://sonar:9000"), ("HEADLESS", "TRUE")]),
        )
        .unwrap();
        assert_eq!(config.base_url, "http://sonar:9000");
        assert!(config.headless);
        assert_eq!(config.extra_env.get("BASE_URL").map(String::as_str), Some("http://sonar:9000"));
    }

    #[test]
    fn test_unsupported_browser_is_fatal() {
        let cli = CliOptions {
            browser: Some("firefox".into()),
            ..Default::default()
        };
        let err = RunConfig::resolve(&cli, &env(&[])).unwrap_err();
        assert!(matches!(err, HarnessError::UnsupportedBrowser(ref b) if b == "firefox"));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_browser_name_is_case_insensitive() {
        let config = RunConfig::resolve(&CliOptions::default(), &env(&[("BROWSER", "Chrome")])).unwrap();
        assert_eq!(config.browser, BrowserKind::Chrome);
    }

    #[test]
    fn test_rejects_base_url_without_scheme() {
        let cli = CliOptions {
            base_url: Some("localhost:9000".into()),
            ..Default::default()
        };
        assert!(matches!(
            RunConfig::resolve(&cli, &env(&[])),
            Err(HarnessError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let rendered = format!("{:?}", Credentials::new("admin", "secret"));
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn test_cli_parses_flags() {
        let cli = CliOptions::parse_from(["harness", "--base-url", "http://x:1", "--headless"]);
        assert_eq!(cli.base_url.as_deref(), Some("http://x:1"));
        assert!(cli.headless);
    }
}
