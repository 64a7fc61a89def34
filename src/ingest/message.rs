//! Wire shapes for the ingestion protocol. Every message is a JSON object
//! discriminated by its `type` field and POSTed to the configured portal URL.

use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Status enumeration shared by runs, suites, and cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Passed,
    Failed,
    Skipped,
    Running,
}

impl Status {
    /// Maps the runner's native test state onto the three terminal statuses.
    pub fn from_runner_state(state: Option<&str>) -> Self {
        match state {
            Some("passed") => Status::Passed,
            Some("pending") => Status::Skipped,
            _ => Status::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Passed => "passed",
            Status::Failed => "failed",
            Status::Skipped => "skipped",
            Status::Running => "running",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discriminator of a protocol message, used for logging and outcome reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    RunStart,
    SuiteStart,
    CaseStart,
    CaseFinish,
    SuiteFinish,
    RunFinish,
    Artifact,
    Log,
    CaseUpdate,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::RunStart => "run:start",
            MessageKind::SuiteStart => "suite:start",
            MessageKind::CaseStart => "case:start",
            MessageKind::CaseFinish => "case:finish",
            MessageKind::SuiteFinish => "suite:finish",
            MessageKind::RunFinish => "run:finish",
            MessageKind::Artifact => "artifact",
            MessageKind::Log => "log",
            MessageKind::CaseUpdate => "case:update",
        }
    }

    /// Name of the id field the server returns for start messages.
    pub(crate) fn issued_id_field(&self) -> Option<&'static str> {
        match self {
            MessageKind::RunStart => Some("run_id"),
            MessageKind::SuiteStart => Some("suite_id"),
            MessageKind::CaseStart => Some("case_id"),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStart {
    pub provider: String,
    pub project_id: String,
    pub environment: String,
    pub ci_job_id: String,
    pub git_branch: String,
    pub git_commit_sha: String,
    pub git_commit_msg: String,
    pub git_actor: String,
    pub parallel_total: u32,
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuiteStart {
    pub run_id: String,
    pub name: String,
    pub file_path: String,
    pub shard_index: u32,
    pub status: Status,
}

impl SuiteStart {
    /// A suite is named after its spec key, which doubles as its file path.
    pub fn for_spec(run_id: &str, spec_key: &str, shard_index: u32) -> Self {
        Self {
            run_id: run_id.to_owned(),
            name: spec_key.to_owned(),
            file_path: spec_key.to_owned(),
            shard_index,
            status: Status::Running,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CaseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseStart {
    pub suite_id: String,
    pub title: String,
    pub full_title: String,
    pub status: Status,
    pub meta: CaseMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactBody {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,
    pub storage_path: String,
}

pub const ARTIFACT_SCREENSHOT: &str = "screenshot";
pub const ARTIFACT_VIDEO: &str = "video";

/// One protocol message. Serializes with a `type` discriminator followed by the
/// variant's fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Message {
    #[serde(rename = "run:start")]
    RunStart { run: RunStart },
    #[serde(rename = "suite:start")]
    SuiteStart { suite: SuiteStart },
    #[serde(rename = "case:start")]
    CaseStart { test: CaseStart },
    #[serde(rename = "case:finish")]
    CaseFinish {
        case_id: String,
        status: Status,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<ErrorBody>,
    },
    #[serde(rename = "suite:finish")]
    SuiteFinish {
        suite_id: String,
        status: Status,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
    },
    #[serde(rename = "run:finish")]
    RunFinish {
        run_id: String,
        status: Status,
        stats: Value,
    },
    #[serde(rename = "artifact")]
    Artifact {
        case_id: String,
        artifact: ArtifactBody,
    },
    #[serde(rename = "log")]
    Log {
        case_id: String,
        level: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    #[serde(rename = "case:update")]
    CaseUpdate { case_id: String, patch: Value },
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::RunStart { .. } => MessageKind::RunStart,
            Message::SuiteStart { .. } => MessageKind::SuiteStart,
            Message::CaseStart { .. } => MessageKind::CaseStart,
            Message::CaseFinish { .. } => MessageKind::CaseFinish,
            Message::SuiteFinish { .. } => MessageKind::SuiteFinish,
            Message::RunFinish { .. } => MessageKind::RunFinish,
            Message::Artifact { .. } => MessageKind::Artifact,
            Message::Log { .. } => MessageKind::Log,
            Message::CaseUpdate { .. } => MessageKind::CaseUpdate,
        }
    }

    pub fn artifact(case_id: &str, artifact_type: &str, storage_path: String) -> Self {
        Message::Artifact {
            case_id: case_id.to_owned(),
            artifact: ArtifactBody {
                artifact_type: Some(artifact_type.to_owned()),
                storage_path,
            },
        }
    }
}

/// Extracts a server-issued id from a decoded response body.
///
/// Numeric ids are accepted and rendered as strings. Missing, null, or empty
/// ids yield `None`.
pub fn issued_id(response: &Value, field: &str) -> Option<String> {
    match response.get(field)? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}
