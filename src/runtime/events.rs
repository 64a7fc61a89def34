//! Runner lifecycle payloads. The host hands back loosely shaped JSON; every
//! payload is decoded into an explicit type here and all fallback rules are
//! applied once, at this boundary.

use crate::ingest::message::{ErrorBody, Status};
use crate::reporter::keys::{SpecKey, TitlePath};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::path::PathBuf;

pub const HOOK_BEFORE_RUN: &str = "before:run";
pub const HOOK_AFTER_SPEC: &str = "after:spec";
pub const HOOK_AFTER_RUN: &str = "after:run";
pub const HOOK_AFTER_SCREENSHOT: &str = "after:screenshot";
pub const HOOKS: [&str; 4] = [
    HOOK_BEFORE_RUN,
    HOOK_AFTER_SPEC,
    HOOK_AFTER_RUN,
    HOOK_AFTER_SCREENSHOT,
];

/// Lifecycle transitions the dispatcher reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum RunnerEvent {
    RunStart,
    SpecFinish {
        spec: SpecInfo,
        results: SpecResults,
    },
    RunFinish(RunResults),
    ScreenshotCaptured(ScreenshotDetails),
}

impl RunnerEvent {
    /// Decodes the positional arguments of a host hook into an event.
    pub fn from_hook(hook: &str, args: Vec<Value>) -> Result<Self> {
        let mut args = args.into_iter();
        match hook {
            HOOK_BEFORE_RUN => Ok(RunnerEvent::RunStart),
            HOOK_AFTER_SPEC => {
                let spec = decode_or_default(args.next()).context("invalid after:spec spec")?;
                let results =
                    decode_or_default(args.next()).context("invalid after:spec results")?;
                Ok(RunnerEvent::SpecFinish { spec, results })
            }
            HOOK_AFTER_RUN => Ok(RunnerEvent::RunFinish(RunResults::from_value(
                args.next().unwrap_or(Value::Null),
            ))),
            HOOK_AFTER_SCREENSHOT => {
                let details =
                    decode_or_default(args.next()).context("invalid after:screenshot details")?;
                Ok(RunnerEvent::ScreenshotCaptured(details))
            }
            other => bail!("unknown lifecycle hook {other}"),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RunnerEvent::RunStart => HOOK_BEFORE_RUN,
            RunnerEvent::SpecFinish { .. } => HOOK_AFTER_SPEC,
            RunnerEvent::RunFinish(_) => HOOK_AFTER_RUN,
            RunnerEvent::ScreenshotCaptured(_) => HOOK_AFTER_SCREENSHOT,
        }
    }
}

/// Identity of a spec file as reported by the runner. Any field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SpecInfo {
    pub relative: Option<String>,
    pub name: Option<String>,
    pub absolute: Option<String>,
}

impl SpecInfo {
    pub fn key(&self) -> SpecKey {
        SpecKey::derive(
            self.relative.as_deref(),
            self.name.as_deref(),
            self.absolute.as_deref(),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SpecResults {
    #[serde(deserialize_with = "null_as_default")]
    pub tests: Vec<TestResult>,
    #[serde(deserialize_with = "null_as_default")]
    pub stats: SpecStats,
    pub browser_name: Option<String>,
    pub video: Option<PathBuf>,
}

impl SpecResults {
    /// Suite status: failed on any failure, skipped when nothing ran, passed otherwise.
    pub fn suite_status(&self) -> Status {
        if self.stats.failures > 0 {
            Status::Failed
        } else if self.stats.tests == 0 {
            Status::Skipped
        } else {
            Status::Passed
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SpecStats {
    #[serde(deserialize_with = "lenient_count")]
    pub tests: u64,
    #[serde(deserialize_with = "lenient_count")]
    pub failures: u64,
    #[serde(deserialize_with = "lenient_millis")]
    pub wall_clock_duration: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TestResult {
    pub title: TitlePath,
    pub state: Option<String>,
    pub display_error: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub attempts: Vec<TestAttempt>,
}

/// A test result with every fallback applied, ready to be reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedCase {
    pub title: String,
    pub full_title: String,
    pub status: Status,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
}

impl NormalizedCase {
    pub fn error_body(&self) -> Option<ErrorBody> {
        self.error.as_ref().map(|message| ErrorBody {
            message: message.clone(),
        })
    }
}

impl TestResult {
    pub fn normalize(&self) -> NormalizedCase {
        let error = self
            .display_error
            .as_ref()
            .filter(|message| !message.is_empty())
            .cloned();
        // Durations of failing attempts are unreliable and omitted.
        let duration_ms = if error.is_some() {
            None
        } else {
            self.attempts
                .first()
                .and_then(|attempt| attempt.wall_clock_duration)
        };

        NormalizedCase {
            title: self.title.title().to_owned(),
            full_title: self.title.full_title(),
            status: Status::from_runner_state(self.state.as_deref()),
            duration_ms,
            error,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TestAttempt {
    #[serde(deserialize_with = "lenient_millis")]
    pub wall_clock_duration: Option<u64>,
}

/// Aggregate results of the whole run, forwarded verbatim as opaque stats.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResults {
    pub total_failed: u64,
    pub raw: Value,
}

impl RunResults {
    pub fn from_value(raw: Value) -> Self {
        let total_failed = raw.get("totalFailed").map(count_from_value).unwrap_or(0);
        Self { total_failed, raw }
    }

    pub fn status(&self) -> Status {
        if self.total_failed > 0 {
            Status::Failed
        } else {
            Status::Passed
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScreenshotDetails {
    pub path: Option<PathBuf>,
    pub spec_name: Option<String>,
    /// Cypress reports `testFailure` as a boolean; only an object carries a title path.
    #[serde(deserialize_with = "object_or_none")]
    pub test_failure: Option<TestFailure>,
}

impl ScreenshotDetails {
    pub fn spec_key(&self) -> SpecKey {
        SpecKey::derive(self.spec_name.as_deref(), None, None)
    }

    /// Full title of the failed test the screenshot belongs to, if any.
    pub fn full_title(&self) -> Option<String> {
        self.test_failure
            .as_ref()
            .and_then(|failure| failure.title_path.as_ref())
            .map(TitlePath::full_title)
            .filter(|title| !title.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TestFailure {
    pub title_path: Option<TitlePath>,
}

fn decode_or_default<T: Default + serde::de::DeserializeOwned>(value: Option<Value>) -> Result<T> {
    match value {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => Ok(serde_json::from_value(value)?),
    }
}

fn object_or_none<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(value @ Value::Object(_)) => serde_json::from_value(value).ok(),
        _ => None,
    })
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_count<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?
        .as_ref()
        .map(count_from_value)
        .unwrap_or(0))
}

fn lenient_millis<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?
        .as_ref()
        .and_then(millis_from_value))
}

fn count_from_value(value: &Value) -> u64 {
    millis_from_value(value).unwrap_or(0)
}

/// Accepts integer or fractional JSON numbers; negatives and non-numbers are dropped.
fn millis_from_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64().or_else(|| {
            number
                .as_f64()
                .filter(|n| n.is_finite() && *n >= 0.0)
                .map(|n| n.round() as u64)
        }),
        _ => None,
    }
}
