//! Report attachment sink
//!
//! A [`ReportSink`] owns the report entry of the currently running test and
//! persists named, typed attachments, labels and parameters against it.
//! Callers never talk to a sink directly; they go through [`Reporter`], which
//! applies the non-fatal policy to every call.

pub mod allure;
pub mod memory;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::HarnessResult;
use crate::nonfatal::nonfatal;
use crate::runner::TestOutcome;

pub use allure::AllureResultsWriter;
pub use memory::{MemorySink, RecordedTest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContentType {
    Json,
    Text,
    Html,
    Png,
}

impl ContentType {
    pub fn mime(&self) -> &'static str {
        match self {
            ContentType::Json => "application/json",
            ContentType::Text => "text/plain",
            ContentType::Html => "text/html",
            ContentType::Png => "image/png",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ContentType::Json => "json",
            ContentType::Text => "txt",
            ContentType::Html => "html",
            ContentType::Png => "png",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentBody {
    Text(String),
    Binary(Vec<u8>),
}

impl AttachmentBody {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            AttachmentBody::Text(text) => text.as_bytes(),
            AttachmentBody::Binary(bytes) => bytes,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttachmentBody::Text(text) => Some(text),
            AttachmentBody::Binary(_) => None,
        }
    }
}

impl From<String> for AttachmentBody {
    fn from(text: String) -> Self {
        AttachmentBody::Text(text)
    }
}

impl From<&str> for AttachmentBody {
    fn from(text: &str) -> Self {
        AttachmentBody::Text(text.to_string())
    }
}

impl From<Vec<u8>> for AttachmentBody {
    fn from(bytes: Vec<u8>) -> Self {
        AttachmentBody::Binary(bytes)
    }
}

/// A named, typed piece of evidence. Write-once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub content_type: ContentType,
    pub payload: AttachmentBody,
}

/// Identity of a test entry opened in a sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestInfo {
    pub name: String,
    pub full_name: String,
    /// Suite label, e.g. `api` or `ui`
    pub suite: String,
}

/// Storage for report entries. Implementations only need to track one
/// running test at a time.
pub trait ReportSink: Send + Sync {
    fn start_test(&self, info: &TestInfo) -> HarnessResult<()>;

    fn attach(&self, attachment: Attachment) -> HarnessResult<()>;

    fn label(&self, name: &str, value: &str) -> HarnessResult<()>;

    fn parameter(&self, name: &str, value: &str) -> HarnessResult<()>;

    fn stop_test(&self, outcome: &TestOutcome) -> HarnessResult<()>;
}

/// Cloneable, infallible front for a [`ReportSink`].
#[derive(Clone)]
pub struct Reporter {
    sink: Arc<dyn ReportSink>,
}

impl Reporter {
    pub fn new(sink: Arc<dyn ReportSink>) -> Self {
        Self { sink }
    }

    pub fn attach(&self, name: &str, payload: impl Into<AttachmentBody>, content_type: ContentType) {
        let attachment = Attachment {
            name: name.to_string(),
            content_type,
            payload: payload.into(),
        };
        nonfatal("attach", || self.sink.attach(attachment));
    }

    /// Pretty-print `value` as JSON and attach it.
    pub fn attach_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) {
        if let Some(json) = nonfatal("serialize attachment", || serde_json::to_string_pretty(value)) {
            self.attach(name, json, ContentType::Json);
        }
    }

    pub fn attach_text(&self, name: &str, text: impl Into<String>) {
        self.attach(name, AttachmentBody::Text(text.into()), ContentType::Text);
    }

    pub fn attach_html(&self, name: &str, html: impl Into<String>) {
        self.attach(name, AttachmentBody::Text(html.into()), ContentType::Html);
    }

    pub fn attach_png(&self, name: &str, png: Vec<u8>) {
        self.attach(name, AttachmentBody::Binary(png), ContentType::Png);
    }

    pub fn label(&self, name: &str, value: &str) {
        nonfatal("label", || self.sink.label(name, value));
    }

    pub fn parameter(&self, name: &str, value: &str) {
        nonfatal("parameter", || self.sink.parameter(name, value));
    }

    pub(crate) fn start_test(&self, info: &TestInfo) {
        nonfatal("start test", || self.sink.start_test(info));
    }

    pub(crate) fn stop_test(&self, outcome: &TestOutcome) {
        nonfatal("stop test", || self.sink.stop_test(outcome));
    }
}

impl fmt::Debug for Reporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporter").finish_non_exhaustive()
    }
}
