//! Per-test lifecycle: setup, call, failure capture, teardown
//!
//! ```text
//! Runner::new(ctx)            environment.properties, once
//!   run_api(name, body)       run-scoped HttpSession, created on first use
//!   run_ui(name, body)        fresh browser per test, quit before returning
//!     start_test -> labels -> body -> failure hook -> release -> stop_test
//!   finish()                  close the HTTP session, SuiteSummary
//! ```

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::browser::{BrowserHandle, BrowserSession};
use crate::config::{Credentials, RunConfig};
use crate::context::RunContext;
use crate::environment::write_environment;
use crate::error::{HarnessError, HarnessResult};
use crate::failure::{capture_api_failure, capture_ui_failure, failure_text};
use crate::http::{HttpSession, RequestOptions};
use crate::labels::publish_labels;
use crate::nonfatal::{catch_panic, nonfatal};
use crate::report::{Reporter, TestInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Setup,
    Call,
    Teardown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Passed,
    Failed,
    Errored,
}

/// Result of one phase of a test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub phase: Phase,
    pub status: Status,
    pub error_text: Option<String>,
}

impl TestOutcome {
    pub fn passed() -> Self {
        Self {
            phase: Phase::Call,
            status: Status::Passed,
            error_text: None,
        }
    }

    pub fn failed(error_text: impl Into<String>) -> Self {
        Self {
            phase: Phase::Call,
            status: Status::Failed,
            error_text: Some(error_text.into()),
        }
    }

    pub fn errored(phase: Phase, error_text: impl Into<String>) -> Self {
        Self {
            phase,
            status: Status::Errored,
            error_text: Some(error_text.into()),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.status != Status::Passed
    }

    /// Only call-phase failures get forensic capture.
    pub fn triggers_capture(&self) -> bool {
        self.phase == Phase::Call && self.is_failure()
    }

    /// A panic is an assertion failure; a returned error means the body broke.
    fn from_call(result: Result<anyhow::Result<()>, String>) -> Self {
        match result {
            Ok(Ok(())) => Self::passed(),
            Ok(Err(e)) => Self::errored(Phase::Call, format!("{:#}", e)),
            Err(panicked) => Self::failed(panicked),
        }
    }
}

/// Result of running a single test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub suite: String,
    pub duration_ms: u64,
    pub outcome: TestOutcome,
}

/// Result of running all tests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

impl SuiteSummary {
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.errored == 0
    }
}

/// What an API test body can reach
pub struct ApiContext<'a> {
    http: &'a mut HttpSession,
    config: &'a RunConfig,
    reporter: &'a Reporter,
}

impl<'a> ApiContext<'a> {
    pub fn http(&mut self) -> &mut HttpSession {
        &mut *self.http
    }

    pub fn config(&self) -> &RunConfig {
        self.config
    }

    pub fn reporter(&self) -> &Reporter {
        self.reporter
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.config.credentials.as_ref()
    }

    /// Request options carrying the configured basic auth, if any
    pub fn authenticated(&self) -> RequestOptions {
        RequestOptions::new().auth(self.credentials())
    }
}

/// What a UI test body can reach. The browser belongs to this test only.
pub struct UiContext<'a, B> {
    browser: &'a mut B,
    config: &'a RunConfig,
    reporter: &'a Reporter,
}

impl<'a, B: BrowserHandle> UiContext<'a, B> {
    pub fn browser(&self) -> &B {
        &*self.browser
    }

    pub fn browser_mut(&mut self) -> &mut B {
        &mut *self.browser
    }

    pub fn config(&self) -> &RunConfig {
        self.config
    }

    pub fn reporter(&self) -> &Reporter {
        self.reporter
    }
}

/// Drives tests one at a time against a [`RunContext`]
pub struct Runner {
    ctx: RunContext,
    http: Option<HttpSession>,
    results: Vec<TestResult>,
    started: Instant,
}

impl Runner {
    pub fn new(ctx: RunContext) -> Self {
        write_environment(&ctx);
        Self {
            ctx,
            http: None,
            results: Vec::new(),
            started: Instant::now(),
        }
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub fn results(&self) -> &[TestResult] {
        &self.results
    }

    fn test_info(&self, name: &str) -> TestInfo {
        let suite = self.ctx.suite().as_str();
        TestInfo {
            name: name.to_string(),
            full_name: format!("{}::{}", suite, name),
            suite: suite.to_string(),
        }
    }

    /// Run an API test through the run-scoped HTTP session
    pub fn run_api<F>(&mut self, name: &str, body: F) -> TestOutcome
    where
        F: FnOnce(&mut ApiContext<'_>) -> anyhow::Result<()>,
    {
        let start = Instant::now();
        debug!("Running test: {}", name);
        self.ctx.reporter().start_test(&self.test_info(name));

        let outcome = match ensure_http(&mut self.http, &self.ctx) {
            Err(e) => setup_failed(name, &e),
            Ok(http) => {
                http.reset_last_record();
                let extra_env = &self.ctx.config().extra_env;
                publish_labels(self.ctx.suite(), extra_env, self.ctx.reporter());

                let result = {
                    let mut api = ApiContext {
                        http: &mut *http,
                        config: self.ctx.config(),
                        reporter: self.ctx.reporter(),
                    };
                    catch_panic(|| body(&mut api))
                };
                let outcome = TestOutcome::from_call(result);

                if outcome.triggers_capture() {
                    capture_api_failure(self.ctx.reporter(), http.last_record());
                }
                outcome
            }
        };

        self.complete(name, start, outcome)
    }

    /// Run a UI test in a freshly launched Chrome
    pub fn run_ui<F>(&mut self, name: &str, body: F) -> TestOutcome
    where
        F: FnOnce(&mut UiContext<'_, BrowserSession>) -> anyhow::Result<()>,
    {
        self.run_ui_with(name, BrowserSession::launch, body)
    }

    /// Run a UI test with a browser produced by `launch`
    pub fn run_ui_with<B, L, F>(&mut self, name: &str, launch: L, body: F) -> TestOutcome
    where
        B: BrowserHandle,
        L: FnOnce(&RunConfig) -> HarnessResult<B>,
        F: FnOnce(&mut UiContext<'_, B>) -> anyhow::Result<()>,
    {
        let start = Instant::now();
        debug!("Running test: {}", name);
        self.ctx.reporter().start_test(&self.test_info(name));

        let launched = catch_panic(|| launch(self.ctx.config()))
            .unwrap_or_else(|panicked| Err(HarnessError::Internal(panicked)));

        let outcome = match launched {
            Err(e) => setup_failed(name, &e),
            Ok(mut browser) => {
                let extra_env = &self.ctx.config().extra_env;
                publish_labels(self.ctx.suite(), extra_env, self.ctx.reporter());

                let result = {
                    let mut ui = UiContext {
                        browser: &mut browser,
                        config: self.ctx.config(),
                        reporter: self.ctx.reporter(),
                    };
                    catch_panic(|| body(&mut ui))
                };
                let outcome = TestOutcome::from_call(result);

                if outcome.triggers_capture() {
                    capture_ui_failure(self.ctx.reporter(), &browser, failure_text(&outcome));
                }

                nonfatal("quit browser", || browser.quit());
                outcome
            }
        };

        self.complete(name, start, outcome)
    }

    fn complete(&mut self, name: &str, start: Instant, outcome: TestOutcome) -> TestOutcome {
        self.ctx.reporter().stop_test(&outcome);

        let duration_ms = start.elapsed().as_millis() as u64;
        if outcome.is_failure() {
            let reason = failure_text(&outcome);
            error!("✗ {} - {}", name, reason.lines().next().unwrap_or(reason));
        } else {
            info!("✓ {} ({} ms)", name, duration_ms);
        }

        self.results.push(TestResult {
            name: name.to_string(),
            suite: self.ctx.suite().as_str().to_string(),
            duration_ms,
            outcome: outcome.clone(),
        });
        outcome
    }

    fn close_http(&mut self) {
        if let Some(http) = self.http.take() {
            http.close();
        }
    }

    /// Close run-scoped resources and summarize
    pub fn finish(mut self) -> SuiteSummary {
        self.close_http();

        let results = std::mem::take(&mut self.results);
        let count = |status: Status| results.iter().filter(|r| r.outcome.status == status).count();
        let summary = SuiteSummary {
            total: results.len(),
            passed: count(Status::Passed),
            failed: count(Status::Failed),
            errored: count(Status::Errored),
            duration_ms: self.started.elapsed().as_millis() as u64,
            results,
        };

        info!(
            "Test Results: {} passed, {} failed, {} errored ({} ms)",
            summary.passed, summary.failed, summary.errored, summary.duration_ms
        );
        summary
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        self.close_http();
    }
}

fn ensure_http<'h>(
    slot: &'h mut Option<HttpSession>,
    ctx: &RunContext,
) -> HarnessResult<&'h mut HttpSession> {
    if slot.is_none() {
        *slot = Some(HttpSession::new(&ctx.config().base_url, ctx.reporter().clone())?);
    }
    slot.as_mut()
        .ok_or_else(|| HarnessError::Internal("HTTP session unavailable".into()))
}

fn setup_failed(name: &str, e: &HarnessError) -> TestOutcome {
    error!("Setup of {} failed: {}", name, e);
    TestOutcome::errored(Phase::Setup, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_only_for_call_failures() {
        assert!(!TestOutcome::passed().triggers_capture());
        assert!(TestOutcome::failed("assert").triggers_capture());
        assert!(TestOutcome::errored(Phase::Call, "io").triggers_capture());
        assert!(!TestOutcome::errored(Phase::Setup, "no driver").triggers_capture());
        assert!(!TestOutcome::errored(Phase::Teardown, "quit").triggers_capture());
    }

    #[test]
    fn test_outcome_from_call() {
        assert_eq!(TestOutcome::from_call(Ok(Ok(()))), TestOutcome::passed());

        let errored = TestOutcome::from_call(Ok(Err(anyhow::anyhow!("inner").context("outer"))));
        assert_eq!(errored.status, Status::Errored);
        assert_eq!(errored.error_text.as_deref(), Some("outer: inner"));

        let panicked = TestOutcome::from_call(Err("expected 200\n    at src/lib.rs:1:1".into()));
        assert_eq!(panicked.status, Status::Failed);
        assert_eq!(panicked.error_text.as_deref(), Some("expected 200\n    at src/lib.rs:1:1"));
    }
}
