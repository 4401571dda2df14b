//! Environment descriptor: the `environment.properties` manifest read by
//! the report tool

use std::fs;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::config::{
    EnvSource, ENV_API_USER, ENV_BASE_URL, ENV_HEADLESS, ENV_IMAGE_TAG, ENV_TARGET_URL,
    ENV_TARGET_USERNAME,
};
use crate::context::{RunContext, SuiteKind};
use crate::error::HarnessResult;
use crate::nonfatal::nonfatal;

pub const ENVIRONMENT_FILE: &str = "environment.properties";

/// Runtime version captured by the build script
pub const RUSTC_VERSION: &str = env!("HARNESS_RUSTC_VERSION");

const API_ALLOW_LIST: &[&str] = &[ENV_BASE_URL, ENV_API_USER, ENV_IMAGE_TAG];

const UI_ALLOW_LIST: &[&str] = &[
    ENV_BASE_URL,
    ENV_TARGET_URL,
    ENV_TARGET_USERNAME,
    ENV_IMAGE_TAG,
    ENV_HEADLESS,
];

fn framework(suite: SuiteKind) -> &'static str {
    match suite {
        SuiteKind::Api => "Reqwest+evidence-harness",
        SuiteKind::Ui => "WebDriver+evidence-harness",
    }
}

/// `GIT_BRANCH`, else `GITHUB_HEAD_REF`, else the last segment of
/// `GITHUB_REF`, else `local`
pub fn git_branch(env: &dyn EnvSource) -> String {
    env.non_empty("GIT_BRANCH")
        .or_else(|| env.non_empty("GITHUB_HEAD_REF"))
        .or_else(|| {
            env.non_empty("GITHUB_REF")
                .and_then(|r| r.rsplit('/').next().map(str::to_string))
                .filter(|b| !b.is_empty())
        })
        .unwrap_or_else(|| "local".to_string())
}

/// Ordered manifest entries for a suite. Allow-listed values come from
/// `captured`; branch and CI detection read `env`.
pub fn entries(
    suite: SuiteKind,
    env: &dyn EnvSource,
    captured: &dyn EnvSource,
) -> Vec<(String, String)> {
    let ci = env.non_empty("CI").unwrap_or_else(|| "false".to_string());
    let rust_version = env
        .non_empty("RUST_VERSION")
        .unwrap_or_else(|| RUSTC_VERSION.to_string());

    let platform = if ci.eq_ignore_ascii_case("true") { "CI" } else { "Local" };

    let mut entries = vec![
        ("Test.Framework".to_string(), framework(suite).to_string()),
        ("GIT_BRANCH".to_string(), git_branch(env)),
        ("CI".to_string(), ci),
        ("RUST_VERSION".to_string(), rust_version),
    ];

    if suite == SuiteKind::Ui {
        entries.push(("CI.Platform".to_string(), platform.to_string()));
        entries.push(("Test.Types".to_string(), "UI Automation".to_string()));
        entries.push(("Tooling".to_string(), "Allure Report".to_string()));
    }

    let allow_list = match suite {
        SuiteKind::Api => API_ALLOW_LIST,
        SuiteKind::Ui => UI_ALLOW_LIST,
    };
    for key in allow_list {
        if let Some(value) = captured.non_empty(key) {
            entries.push((key.to_string(), value));
        }
    }

    entries
}

/// Render entries as `key=value` lines
pub fn render(entries: &[(String, String)]) -> String {
    entries
        .iter()
        .map(|(key, value)| {
            format!("{}={}\n", key, value.replace('\r', "\\r").replace('\n', "\\n"))
        })
        .collect()
}

fn write_manifest(ctx: &RunContext) -> HarnessResult<PathBuf> {
    fs::create_dir_all(ctx.results_dir())?;
    let path = ctx.results_dir().join(ENVIRONMENT_FILE);
    fs::write(&path, render(&entries(ctx.suite(), ctx.env(), &ctx.config().extra_env)))?;
    Ok(path)
}

/// Write the manifest unless it was already written for this run.
///
/// Returns the path when this call wrote it. Failures are logged and
/// swallowed.
pub fn write_environment(ctx: &RunContext) -> Option<PathBuf> {
    if !ctx.claim_environment_write() {
        debug!("Environment descriptor already written for this run");
        return None;
    }

    let written = nonfatal("write environment descriptor", || write_manifest(ctx));
    match &written {
        Some(path) => debug!("Environment descriptor written to {}", path.display()),
        None => warn!("Continuing without an environment descriptor"),
    }
    written
}
