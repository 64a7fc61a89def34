use crate::ingest::{ArtifactStorage, IngestClient, LocalPathStorage, ReportTransport};
use crate::reporter::dispatcher::{EventDispatcher, RunPhase};
use crate::reporter::store::CorrelationStore;
use crate::reporter::tasks::{TaskHandler, TaskRequest, TASKS};
use crate::runtime::config::ReporterConfig;
use crate::runtime::events::{RunnerEvent, HOOKS};
use crate::runtime::hooks::{HookOutcome, SkipReason};
use crate::runtime::isolation::{isolate, Courier};
use crate::runtime::telemetry::{Telemetry, TelemetrySnapshot};
use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;

/// Host-facing entry point: one instance per test-run process, created when the
/// plugin registers its hooks.
///
/// Every method here is infallible from the host's point of view; reporting
/// failures come back as [`HookOutcome`] values and log lines.
pub struct Reporter {
    dispatcher: EventDispatcher,
    tasks: TaskHandler,
    store: Arc<CorrelationStore>,
    telemetry: Arc<Telemetry>,
}

impl Reporter {
    /// Builds a reporter that posts to the configured portal and addresses
    /// artifacts by their local path.
    pub fn new(config: ReporterConfig) -> Result<Self> {
        let client = IngestClient::from_config(&config)?;
        Ok(Self::with_collaborators(
            config,
            Arc::new(client),
            Arc::new(LocalPathStorage),
        ))
    }

    /// Resolves configuration from the process environment. Missing credentials
    /// fail here, before any hook runs.
    pub fn from_env() -> Result<Self> {
        Self::new(ReporterConfig::from_env()?)
    }

    pub fn with_collaborators(
        config: ReporterConfig,
        transport: Arc<dyn ReportTransport>,
        storage: Arc<dyn ArtifactStorage>,
    ) -> Self {
        let store = Arc::new(CorrelationStore::new());
        let telemetry = Arc::new(Telemetry::default());
        let courier = Courier::new(transport, storage, telemetry.clone());

        tracing::debug!(
            portal = config.portal_url(),
            project = config.project_id(),
            ci = ?config.ci_provider(),
            shard = config.shard_index(),
            parallel_total = config.parallel_total(),
            "reporter configured"
        );

        Self {
            dispatcher: EventDispatcher::new(Arc::new(config), store.clone(), courier.clone()),
            tasks: TaskHandler::new(store.clone(), courier),
            store,
            telemetry,
        }
    }

    pub async fn handle_event(&self, event: RunnerEvent) -> HookOutcome {
        isolate(event.name(), self.dispatcher.dispatch(&event)).await
    }

    /// Handles a host lifecycle hook given its name and positional arguments.
    pub async fn handle_hook(&self, hook: &str, args: Vec<Value>) -> HookOutcome {
        match RunnerEvent::from_hook(hook, args) {
            Ok(event) => self.handle_event(event).await,
            Err(err) => self.reject(hook, HOOKS.contains(&hook), err),
        }
    }

    /// Runs an ad-hoc task and returns its outcome.
    pub async fn run_task(&self, name: &str, payload: Value) -> HookOutcome {
        match TaskRequest::from_task(name, payload) {
            Ok(request) => isolate(request.name(), self.tasks.handle(&request)).await,
            Err(err) => self.reject(name, TASKS.contains(&name), err),
        }
    }

    /// Runs an ad-hoc task and returns the host reply: `true` when the message
    /// was sent, `null` otherwise.
    pub async fn handle_task(&self, name: &str, payload: Value) -> Value {
        self.run_task(name, payload).await.task_reply()
    }

    fn reject(&self, entry: &str, known: bool, err: anyhow::Error) -> HookOutcome {
        let reason = if known {
            SkipReason::MalformedPayload
        } else {
            SkipReason::UnknownHook
        };
        tracing::warn!(entry, error = %format!("{err:#}"), "ignoring host call");
        self.telemetry.record_skipped();
        HookOutcome::Skipped(reason)
    }

    pub fn phase(&self) -> RunPhase {
        self.dispatcher.phase()
    }

    pub fn store(&self) -> &Arc<CorrelationStore> {
        &self.store
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.telemetry.snapshot()
    }
}
