//! Run-wide context created once at process start

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::{capture_extra_env, EnvSource, ProcessEnv, RunConfig};
use crate::report::{AllureResultsWriter, ReportSink, Reporter};

/// Which kind of suite a run drives; selects manifest keys and labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuiteKind {
    Api,
    Ui,
}

impl SuiteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuiteKind::Api => "api",
            SuiteKind::Ui => "ui",
        }
    }
}

impl fmt::Display for SuiteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved configuration, environment and report sink for one run.
pub struct RunContext {
    config: RunConfig,
    suite: SuiteKind,
    env: Arc<dyn EnvSource>,
    reporter: Reporter,
    environment_written: AtomicBool,
}

impl RunContext {
    /// Allow-listed variables from `env` fill in whatever `config.extra_env`
    /// does not already hold. Manifest and labels read that snapshot.
    pub fn new(
        mut config: RunConfig,
        suite: SuiteKind,
        env: Arc<dyn EnvSource>,
        sink: Arc<dyn ReportSink>,
    ) -> Self {
        for (key, value) in capture_extra_env(env.as_ref()) {
            config.extra_env.entry(key).or_insert(value);
        }
        Self {
            config,
            suite,
            env,
            reporter: Reporter::new(sink),
            environment_written: AtomicBool::new(false),
        }
    }

    /// Context reporting into an Allure results directory at
    /// `config.results_dir`, reading the process environment.
    pub fn allure(config: RunConfig, suite: SuiteKind) -> Self {
        let sink = Arc::new(AllureResultsWriter::new(config.results_dir.clone()));
        Self::new(config, suite, Arc::new(ProcessEnv), sink)
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn suite(&self) -> SuiteKind {
        self.suite
    }

    pub fn env(&self) -> &dyn EnvSource {
        self.env.as_ref()
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    pub fn results_dir(&self) -> &Path {
        &self.config.results_dir
    }

    /// True exactly once per context: the caller owns the manifest write.
    pub(crate) fn claim_environment_write(&self) -> bool {
        !self.environment_written.swap(true, Ordering::SeqCst)
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("config", &self.config)
            .field("suite", &self.suite)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::MemorySink;
    use std::collections::HashMap;

    #[test]
    fn test_environment_write_is_claimed_once() {
        let ctx = RunContext::new(
            RunConfig::default(),
            SuiteKind::Api,
            Arc::new(HashMap::<String, String>::new()),
            Arc::new(MemorySink::new()),
        );
        assert!(ctx.claim_environment_write());
        assert!(!ctx.claim_environment_write());
    }

    #[test]
    fn test_extra_env_snapshot_keeps_preset_values() {
        let mut config = RunConfig::default();
        config
            .extra_env
            .insert("IMAGE_TAG".to_string(), "from-cli".to_string());
        let env: HashMap<String, String> = [
            ("IMAGE_TAG", "from-env"),
            ("BASE_URL", "http://sonar:9000"),
            ("API_PASS", "secret"),
            ("HEADLESS", ""),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let ctx = RunContext::new(config, SuiteKind::Ui, Arc::new(env), Arc::new(MemorySink::new()));

        let extra = &ctx.config().extra_env;
        assert_eq!(extra.get("IMAGE_TAG").map(String::as_str), Some("from-cli"));
        assert_eq!(extra.get("BASE_URL").map(String::as_str), Some("http://sonar:9000"));
        assert!(!extra.contains_key("API_PASS"));
        assert!(!extra.contains_key("HEADLESS"));
    }
}
