//! Forensic evidence attached when a test's call phase does not pass
//!
//! Every capture step runs under [`nonfatal`], so a broken browser or sink
//! loses that one artifact and nothing else.

use tracing::debug;

use crate::browser::BrowserHandle;
use crate::nonfatal::nonfatal;
use crate::record::{InteractionRecord, ResponsePayload};
use crate::report::Reporter;
use crate::runner::TestOutcome;

pub const SCREENSHOT: &str = "screenshot";
pub const PAGE_SOURCE: &str = "page_source";
pub const PAGE_INFO: &str = "page_info";
pub const BROWSER_LOGS: &str = "browser_logs";
pub const TRACEBACK: &str = "traceback";

/// Attachment name for the last API response, e.g. `last_api_response_404`
pub fn last_response_name(record: &InteractionRecord) -> String {
    format!("last_api_response_{}", record.status_label())
}

/// Attach the most recent API response, if any. Returns whether one was
/// attached.
pub fn capture_api_failure(reporter: &Reporter, record: Option<&InteractionRecord>) -> bool {
    let Some(record) = record else {
        debug!("No API interaction to attach");
        return false;
    };

    let name = last_response_name(record);
    match &record.response {
        ResponsePayload::ResponseBody(body) => reporter.attach_json(&name, body),
        ResponsePayload::ResponseText(text) => reporter.attach_text(&name, text.as_str()),
    }
    true
}

/// Capture browser state, then the failure text. Returns the names of the
/// artifacts that were captured.
pub fn capture_ui_failure<B>(reporter: &Reporter, browser: &B, error_text: &str) -> Vec<&'static str>
where
    B: BrowserHandle + ?Sized,
{
    let mut captured = Vec::new();

    if let Some(png) = nonfatal("capture screenshot", || browser.screenshot_png()) {
        reporter.attach_png(SCREENSHOT, png);
        captured.push(SCREENSHOT);
    }

    if let Some(html) = nonfatal("capture page source", || browser.page_source()) {
        reporter.attach_html(PAGE_SOURCE, html);
        captured.push(PAGE_SOURCE);
    }

    let info = nonfatal("capture page info", || {
        let url = browser.current_url()?;
        let title = browser.title()?;
        Ok::<_, crate::error::HarnessError>(format!("URL: {}\nTitle: {}", url, title))
    });
    if let Some(info) = info {
        reporter.attach_text(PAGE_INFO, info);
        captured.push(PAGE_INFO);
    }

    if let Some(logs) = nonfatal("capture browser logs", || browser.browser_logs()) {
        if !logs.is_empty() {
            reporter.attach_json(BROWSER_LOGS, &logs);
            captured.push(BROWSER_LOGS);
        }
    }

    reporter.attach_text(TRACEBACK, error_text);
    captured.push(TRACEBACK);

    captured
}

pub(crate) fn failure_text(outcome: &TestOutcome) -> &str {
    outcome.error_text.as_deref().unwrap_or("test failed")
}
