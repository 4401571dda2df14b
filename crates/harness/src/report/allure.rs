//! Allure 2 results directory writer
//!
//! Each finished test becomes `<uuid>-result.json`; each attachment is written
//! immediately as `<uuid>-attachment.<ext>` and referenced from the result.

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use super::{Attachment, ReportSink, TestInfo};
use crate::error::{HarnessError, HarnessResult};
use crate::runner::{Status, TestOutcome};

#[derive(Debug, Clone, Serialize)]
struct NameValue {
    name: String,
    value: String,
}

#[derive(Debug, Clone, Serialize)]
struct AttachmentRef {
    name: String,
    source: String,
    #[serde(rename = "type")]
    mime: String,
}

#[derive(Debug, Clone, Default, Serialize)]
struct StatusDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct AllureResult {
    uuid: String,
    history_id: String,
    name: String,
    full_name: String,
    status: String,
    status_details: StatusDetails,
    stage: String,
    start: i64,
    stop: i64,
    labels: Vec<NameValue>,
    parameters: Vec<NameValue>,
    attachments: Vec<AttachmentRef>,
}

fn allure_status(status: Status) -> &'static str {
    match status {
        Status::Passed => "passed",
        Status::Failed => "failed",
        Status::Errored => "broken",
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub struct AllureResultsWriter {
    dir: PathBuf,
    current: Mutex<Option<AllureResult>>,
}

impl AllureResultsWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            current: Mutex::new(None),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ReportSink for AllureResultsWriter {
    fn start_test(&self, info: &TestInfo) -> HarnessResult<()> {
        fs::create_dir_all(&self.dir)?;

        let result = AllureResult {
            uuid: Uuid::new_v4().to_string(),
            history_id: info.full_name.clone(),
            name: info.name.clone(),
            full_name: info.full_name.clone(),
            status: allure_status(Status::Passed).to_string(),
            status_details: StatusDetails::default(),
            stage: "running".to_string(),
            start: now_millis(),
            stop: 0,
            labels: vec![
                NameValue { name: "suite".into(), value: info.suite.clone() },
                NameValue { name: "framework".into(), value: "evidence-harness".into() },
                NameValue { name: "language".into(), value: "rust".into() },
            ],
            parameters: Vec::new(),
            attachments: Vec::new(),
        };

        *self.current.lock() = Some(result);
        Ok(())
    }

    fn attach(&self, attachment: Attachment) -> HarnessResult<()> {
        let mut current = self.current.lock();
        let result = current.as_mut().ok_or(HarnessError::NoActiveTest)?;

        let source = format!(
            "{}-attachment.{}",
            Uuid::new_v4(),
            attachment.content_type.extension()
        );
        fs::write(self.dir.join(&source), attachment.payload.as_bytes())?;
        debug!("Attached '{}' as {}", attachment.name, source);

        result.attachments.push(AttachmentRef {
            name: attachment.name,
            source,
            mime: attachment.content_type.mime().to_string(),
        });
        Ok(())
    }

    fn label(&self, name: &str, value: &str) -> HarnessResult<()> {
        let mut current = self.current.lock();
        let result = current.as_mut().ok_or(HarnessError::NoActiveTest)?;
        result.labels.push(NameValue { name: name.into(), value: value.into() });
        Ok(())
    }

    fn parameter(&self, name: &str, value: &str) -> HarnessResult<()> {
        let mut current = self.current.lock();
        let result = current.as_mut().ok_or(HarnessError::NoActiveTest)?;
        result.parameters.push(NameValue { name: name.into(), value: value.into() });
        Ok(())
    }

    fn stop_test(&self, outcome: &TestOutcome) -> HarnessResult<()> {
        let mut result = self.current.lock().take().ok_or(HarnessError::NoActiveTest)?;

        result.status = allure_status(outcome.status).to_string();
        result.stage = "finished".to_string();
        result.stop = now_millis();
        if let Some(text) = &outcome.error_text {
            result.status_details = StatusDetails {
                message: text.lines().next().map(str::to_string),
                trace: Some(text.clone()),
            };
        }

        let path = self.dir.join(format!("{}-result.json", result.uuid));
        fs::write(&path, serde_json::to_string_pretty(&result)?)?;
        debug!("Result written to: {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{AttachmentBody, ContentType};
    use crate::runner::Phase;

    fn read_results(dir: &Path) -> Vec<serde_json::Value> {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(|entry| {
                let path = entry.unwrap().path();
                let name = path.file_name()?.to_string_lossy().to_string();
                name.ends_with("-result.json")
                    .then(|| serde_json::from_str::<serde_json::Value>(&fs::read_to_string(&path).unwrap()).unwrap())
            })
            .collect()
    }

    #[test]
    fn test_writes_result_and_attachment_files() {
        let dir = tempfile::tempdir().unwrap();
        let writer = AllureResultsWriter::new(dir.path());

        writer
            .start_test(&TestInfo {
                name: "health".into(),
                full_name: "api::health".into(),
                suite: "api".into(),
            })
            .unwrap();
        writer.label("image_tag", "v1.2").unwrap();
        writer
            .attach(Attachment {
                name: "screenshot".into(),
                content_type: ContentType::Png,
                payload: AttachmentBody::Binary(vec![0x89, b'P', b'N', b'G']),
            })
            .unwrap();
        writer
            .stop_test(&TestOutcome {
                phase: Phase::Call,
                status: Status::Failed,
                error_text: Some("assertion failed\nat line 3".into()),
            })
            .unwrap();

        let results = read_results(dir.path());
        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert_eq!(result["status"], "failed");
        assert_eq!(result["stage"], "finished");
        assert_eq!(result["statusDetails"]["message"], "assertion failed");

        let attachment = &result["attachments"][0];
        assert_eq!(attachment["type"], "image/png");
        let source = attachment["source"].as_str().unwrap();
        assert!(source.ends_with("-attachment.png"));
        assert_eq!(fs::read(dir.path().join(source)).unwrap(), vec![0x89, b'P', b'N', b'G']);

        let labels = result["labels"].as_array().unwrap();
        assert!(labels.iter().any(|l| l["name"] == "image_tag" && l["value"] == "v1.2"));
    }

    #[test]
    fn test_errored_maps_to_broken() {
        assert_eq!(allure_status(Status::Errored), "broken");
    }

    #[test]
    fn test_stop_without_start_fails() {
        let dir = tempfile::tempdir().unwrap();
        let writer = AllureResultsWriter::new(dir.path());
        assert!(matches!(
            writer.stop_test(&TestOutcome::passed()),
            Err(HarnessError::NoActiveTest)
        ));
    }
}
