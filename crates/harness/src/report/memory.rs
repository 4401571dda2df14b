//! In-process sink that keeps every report entry in memory

use parking_lot::Mutex;

use super::{Attachment, ReportSink, TestInfo};
use crate::error::{HarnessError, HarnessResult};
use crate::runner::TestOutcome;

#[derive(Debug, Clone)]
pub struct RecordedTest {
    pub info: TestInfo,
    pub attachments: Vec<Attachment>,
    pub labels: Vec<(String, String)>,
    pub parameters: Vec<(String, String)>,
    pub outcome: Option<TestOutcome>,
}

impl RecordedTest {
    pub fn attachment(&self, name: &str) -> Option<&Attachment> {
        self.attachments.iter().find(|a| a.name == name)
    }

    pub fn attachment_names(&self) -> Vec<&str> {
        self.attachments.iter().map(|a| a.name.as_str()).collect()
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Default)]
struct State {
    current: Option<RecordedTest>,
    finished: Vec<RecordedTest>,
}

#[derive(Debug, Default)]
pub struct MemorySink {
    state: Mutex<State>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the running test entry, if any.
    pub fn current(&self) -> Option<RecordedTest> {
        self.state.lock().current.clone()
    }

    /// Finished test entries in completion order.
    pub fn tests(&self) -> Vec<RecordedTest> {
        self.state.lock().finished.clone()
    }

    pub fn test(&self, name: &str) -> Option<RecordedTest> {
        self.state
            .lock()
            .finished
            .iter()
            .find(|t| t.info.name == name)
            .cloned()
    }

    fn with_current<F>(&self, f: F) -> HarnessResult<()>
    where
        F: FnOnce(&mut RecordedTest),
    {
        let mut state = self.state.lock();
        let current = state.current.as_mut().ok_or(HarnessError::NoActiveTest)?;
        f(current);
        Ok(())
    }
}

impl ReportSink for MemorySink {
    fn start_test(&self, info: &TestInfo) -> HarnessResult<()> {
        let mut state = self.state.lock();
        if let Some(unfinished) = state.current.take() {
            state.finished.push(unfinished);
        }
        state.current = Some(RecordedTest {
            info: info.clone(),
            attachments: Vec::new(),
            labels: Vec::new(),
            parameters: Vec::new(),
            outcome: None,
        });
        Ok(())
    }

    fn attach(&self, attachment: Attachment) -> HarnessResult<()> {
        self.with_current(|test| test.attachments.push(attachment))
    }

    fn label(&self, name: &str, value: &str) -> HarnessResult<()> {
        self.with_current(|test| test.labels.push((name.to_string(), value.to_string())))
    }

    fn parameter(&self, name: &str, value: &str) -> HarnessResult<()> {
        self.with_current(|test| test.parameters.push((name.to_string(), value.to_string())))
    }

    fn stop_test(&self, outcome: &TestOutcome) -> HarnessResult<()> {
        let mut state = self.state.lock();
        let mut test = state.current.take().ok_or(HarnessError::NoActiveTest)?;
        test.outcome = Some(outcome.clone());
        state.finished.push(test);
        Ok(())
    }
}
