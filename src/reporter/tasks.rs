//! Ad-hoc tasks invoked from inside a running test. Each one resolves a case id
//! through the correlation store and sends one message about that case.

use crate::ingest::message::{ArtifactBody, Message, MessageKind};
use crate::reporter::keys::SpecKey;
use crate::reporter::store::CorrelationStore;
use crate::runtime::hooks::{HookOutcome, SkipReason};
use crate::runtime::isolation::Courier;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

pub const TASK_CASE_UPDATE: &str = "quollabore:caseUpdate";
pub const TASK_LOG: &str = "quollabore:log";
pub const TASK_ARTIFACT: &str = "quollabore:artifact";
pub const TASKS: [&str; 3] = [TASK_CASE_UPDATE, TASK_LOG, TASK_ARTIFACT];

const DEFAULT_LOG_LEVEL: &str = "info";

/// Identity of the case a task refers to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CaseRef {
    pub spec_rel: Option<String>,
    pub full_title: Option<String>,
}

impl CaseRef {
    pub fn new(spec_rel: impl Into<String>, full_title: impl Into<String>) -> Self {
        Self {
            spec_rel: Some(spec_rel.into()),
            full_title: Some(full_title.into()),
        }
    }

    fn spec_key(&self) -> SpecKey {
        SpecKey::derive(self.spec_rel.as_deref(), None, None)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CaseUpdateTask {
    #[serde(flatten)]
    pub case: CaseRef,
    pub patch: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LogTask {
    #[serde(flatten)]
    pub case: CaseRef,
    pub level: Option<String>,
    pub message: Option<String>,
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ArtifactTask {
    #[serde(flatten)]
    pub case: CaseRef,
    #[serde(rename = "type")]
    pub artifact_type: Option<String>,
    pub local_path: Option<PathBuf>,
}

/// A decoded task invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskRequest {
    CaseUpdate(CaseUpdateTask),
    Log(LogTask),
    Artifact(ArtifactTask),
}

impl TaskRequest {
    /// Decodes a host task by name. A null payload decodes to an empty request,
    /// which later resolves to no case.
    pub fn from_task(name: &str, payload: Value) -> Result<Self> {
        let payload = if payload.is_null() {
            Value::Object(Default::default())
        } else {
            payload
        };
        match name {
            TASK_CASE_UPDATE => Ok(TaskRequest::CaseUpdate(
                serde_json::from_value(payload).context("invalid caseUpdate payload")?,
            )),
            TASK_LOG => Ok(TaskRequest::Log(
                serde_json::from_value(payload).context("invalid log payload")?,
            )),
            TASK_ARTIFACT => Ok(TaskRequest::Artifact(
                serde_json::from_value(payload).context("invalid artifact payload")?,
            )),
            other => bail!("unknown task {other}"),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TaskRequest::CaseUpdate(_) => TASK_CASE_UPDATE,
            TaskRequest::Log(_) => TASK_LOG,
            TaskRequest::Artifact(_) => TASK_ARTIFACT,
        }
    }
}

pub struct TaskHandler {
    store: Arc<CorrelationStore>,
    courier: Courier,
}

impl TaskHandler {
    pub(crate) fn new(store: Arc<CorrelationStore>, courier: Courier) -> Self {
        Self { store, courier }
    }

    pub async fn handle(&self, request: &TaskRequest) -> HookOutcome {
        match request {
            TaskRequest::CaseUpdate(task) => self.case_update(task).await,
            TaskRequest::Log(task) => self.log(task).await,
            TaskRequest::Artifact(task) => self.artifact(task).await,
        }
    }

    /// Sends a partial patch for a case; a missing patch is sent as `{}`.
    pub async fn case_update(&self, task: &CaseUpdateTask) -> HookOutcome {
        let Some(case_id) = self.resolve(&task.case) else {
            return self.courier.skip(SkipReason::UnresolvedCase);
        };
        let message = Message::CaseUpdate {
            case_id,
            patch: task
                .patch
                .clone()
                .unwrap_or_else(|| Value::Object(Default::default())),
        };
        self.send(&message).await
    }

    pub async fn log(&self, task: &LogTask) -> HookOutcome {
        let Some(case_id) = self.resolve(&task.case) else {
            return self.courier.skip(SkipReason::UnresolvedCase);
        };
        let message = Message::Log {
            case_id,
            level: task
                .level
                .clone()
                .filter(|level| !level.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_owned()),
            message: task.message.clone(),
            data: task.data.clone().filter(|data| !data.is_null()),
        };
        self.send(&message).await
    }

    /// Uploads a local file and attaches it to the case. Nothing is uploaded
    /// for an unresolved case.
    pub async fn artifact(&self, task: &ArtifactTask) -> HookOutcome {
        let Some(case_id) = self.resolve(&task.case) else {
            return self.courier.skip(SkipReason::UnresolvedCase);
        };
        let Some(local_path) = task
            .local_path
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
        else {
            return self.courier.skip(SkipReason::MissingArtifactPath);
        };
        let Some(storage_path) = self.courier.upload(local_path).await else {
            return HookOutcome::Failed(MessageKind::Artifact);
        };

        let message = Message::Artifact {
            case_id,
            artifact: ArtifactBody {
                artifact_type: task.artifact_type.clone(),
                storage_path,
            },
        };
        self.send(&message).await
    }

    fn resolve(&self, case: &CaseRef) -> Option<String> {
        let full_title = case.full_title.as_deref().filter(|title| !title.is_empty())?;
        let spec_key = case.spec_key();
        let case_id = self.store.case_id(&spec_key, full_title);
        if case_id.is_none() {
            tracing::debug!(spec = %spec_key, full_title, "task refers to an unknown case");
        }
        case_id
    }

    async fn send(&self, message: &Message) -> HookOutcome {
        match self.courier.deliver(message).await {
            Some(_) => HookOutcome::Reported,
            None => HookOutcome::Failed(message.kind()),
        }
    }
}
