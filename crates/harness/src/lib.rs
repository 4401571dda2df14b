//! Evidence harness
//!
//! Instruments test execution against a web application:
//! - wraps HTTP API calls and records every request/response as evidence
//! - drives Chrome over WebDriver, one browser per UI test
//! - captures screenshots, page source and console logs when a test fails
//! - writes an Allure results directory with an environment manifest
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  RunConfig::resolve(cli, env)    CLI > environment > default │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Runner::new(RunContext)         environment.properties      │
//! │    ├── run_api(name, body)                                   │
//! │    │     └── ApiContext -> HttpSession -> InteractionRecord  │
//! │    ├── run_ui(name, body)                                    │
//! │    │     └── UiContext -> BrowserSession (chromedriver)      │
//! │    └── finish() -> SuiteSummary                              │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Reporter -> ReportSink                                      │
//! │    ├── AllureResultsWriter   <uuid>-result.json, attachments │
//! │    └── MemorySink            in-process                      │
//! ├──────────────────────────────────────────────────────────────┤
//! │  failure hook   last_api_response_<status> | screenshot ...  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod browser;
pub mod config;
pub mod context;
pub mod environment;
pub mod error;
pub mod failure;
pub mod http;
pub mod labels;
pub mod nonfatal;
pub mod record;
pub mod report;
pub mod runner;
pub mod telemetry;

pub use browser::{BrowserHandle, BrowserSession, Element, Locator};
pub use config::{BrowserKind, CliOptions, Credentials, EnvSource, RunConfig};
pub use context::{RunContext, SuiteKind};
pub use error::{HarnessError, HarnessResult};
pub use http::{ApiResponse, HttpSession, RequestOptions};
pub use record::InteractionRecord;
pub use report::{AllureResultsWriter, ContentType, MemorySink, ReportSink, Reporter};
pub use runner::{ApiContext, Phase, Runner, Status, SuiteSummary, TestOutcome, UiContext};
