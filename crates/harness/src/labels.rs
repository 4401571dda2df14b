//! Per-test labels and parameters derived from environment variables

use crate::config::{EnvSource, ENV_BASE_URL, ENV_IMAGE_TAG, ENV_TARGET_URL};
use crate::context::SuiteKind;
use crate::report::Reporter;

/// Maps one environment variable to a report parameter and label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelSource {
    pub variable: &'static str,
    pub parameter: &'static str,
    pub label: &'static str,
}

const API_SOURCES: &[LabelSource] = &[
    LabelSource {
        variable: ENV_BASE_URL,
        parameter: "base_url",
        label: "base_url",
    },
    LabelSource {
        variable: ENV_IMAGE_TAG,
        parameter: "image_tag",
        label: "image_tag",
    },
];

const UI_SOURCES: &[LabelSource] = &[
    LabelSource {
        variable: ENV_BASE_URL,
        parameter: "base_url",
        label: "base_url",
    },
    LabelSource {
        variable: ENV_IMAGE_TAG,
        parameter: "image_tag",
        label: "image_tag",
    },
    LabelSource {
        variable: ENV_TARGET_URL,
        parameter: "sonarqube_url",
        label: "sonarqube",
    },
];

pub fn sources(suite: SuiteKind) -> &'static [LabelSource] {
    match suite {
        SuiteKind::Api => API_SOURCES,
        SuiteKind::Ui => UI_SOURCES,
    }
}

/// Publish a parameter and label for every set variable in `env`, usually
/// the run's [`extra_env`](crate::RunConfig::extra_env) snapshot. Returns how
/// many sources were published.
pub fn publish_labels(suite: SuiteKind, env: &dyn EnvSource, reporter: &Reporter) -> usize {
    let mut published = 0;
    for source in sources(suite) {
        let Some(value) = env.non_empty(source.variable) else {
            continue;
        };
        reporter.parameter(source.parameter, &value);
        reporter.label(source.label, &value);
        published += 1;
    }
    published
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use crate::report::{MemorySink, TestInfo};

    fn open_test(sink: &Arc<MemorySink>) -> Reporter {
        let reporter = Reporter::new(sink.clone());
        reporter.start_test(&TestInfo {
            name: "labels".into(),
            full_name: "labels".into(),
            suite: "ui".into(),
        });
        reporter
    }

    #[test]
    fn test_ui_labels() {
        let sink = Arc::new(MemorySink::new());
        let reporter = open_test(&sink);
        let env: HashMap<String, String> = [
            ("BASE_URL", "http://sonar:9000"),
            ("SONARQUBE_URL", "http://sq"),
            ("IMAGE_TAG", ""),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        assert_eq!(publish_labels(SuiteKind::Ui, &env, &reporter), 2);

        let test = sink.current().unwrap();
        assert_eq!(test.parameter("base_url"), Some("http://sonar:9000"));
        assert_eq!(test.label("base_url"), Some("http://sonar:9000"));
        assert_eq!(test.parameter("sonarqube_url"), Some("http://sq"));
        assert_eq!(test.label("sonarqube"), Some("http://sq"));
        assert_eq!(test.label("image_tag"), None);
    }

    #[test]
    fn test_api_ignores_ui_only_sources() {
        let sink = Arc::new(MemorySink::new());
        let reporter = open_test(&sink);
        let env: HashMap<String, String> =
            HashMap::from([("SONARQUBE_URL".to_string(), "http://sq".to_string())]);

        assert_eq!(publish_labels(SuiteKind::Api, &env, &reporter), 0);
        assert!(sink.current().unwrap().labels.is_empty());
    }

    #[test]
    fn test_labels_from_configured_snapshot() {
        let sink = Arc::new(MemorySink::new());
        let reporter = open_test(&sink);
        let mut config = crate::RunConfig::default();
        config.extra_env.insert("IMAGE_TAG".to_string(), "10.4".to_string());

        assert_eq!(publish_labels(SuiteKind::Api, &config.extra_env, &reporter), 1);
        assert_eq!(sink.current().unwrap().label("image_tag"), Some("10.4"));
    }
}
