//! Event dispatcher: binds runner lifecycle events to the ordered sequence of
//! protocol messages and feeds server-issued ids into the correlation store.

use crate::ingest::message::{
    CaseMeta, CaseStart, Message, MessageKind, Status, SuiteStart, ARTIFACT_SCREENSHOT,
    ARTIFACT_VIDEO,
};
use crate::reporter::keys::SpecKey;
use crate::reporter::store::CorrelationStore;
use crate::runtime::config::ReporterConfig;
use crate::runtime::events::{RunResults, RunnerEvent, ScreenshotDetails, SpecInfo, SpecResults};
use crate::runtime::hooks::{HookOutcome, SkipReason};
use crate::runtime::isolation::Courier;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Mutex as AsyncMutex;

/// Lifecycle of the single run owned by this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Unstarted,
    Starting,
    Started,
    Finished,
}

pub struct EventDispatcher {
    config: Arc<ReporterConfig>,
    store: Arc<CorrelationStore>,
    courier: Courier,
    phase: Mutex<RunPhase>,
    /// Serializes spec-finish handling so each spec key gets one suite:start.
    spec_gate: AsyncMutex<()>,
}

impl EventDispatcher {
    pub(crate) fn new(
        config: Arc<ReporterConfig>,
        store: Arc<CorrelationStore>,
        courier: Courier,
    ) -> Self {
        Self {
            config,
            store,
            courier,
            phase: Mutex::new(RunPhase::Unstarted),
            spec_gate: AsyncMutex::new(()),
        }
    }

    pub fn phase(&self) -> RunPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: RunPhase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
    }

    pub fn store(&self) -> &Arc<CorrelationStore> {
        &self.store
    }

    pub async fn dispatch(&self, event: &RunnerEvent) -> HookOutcome {
        match event {
            RunnerEvent::RunStart => self.run_start().await,
            RunnerEvent::SpecFinish { spec, results } => self.spec_finish(spec, results).await,
            RunnerEvent::RunFinish(results) => self.run_finish(results).await,
            RunnerEvent::ScreenshotCaptured(details) => self.screenshot_captured(details).await,
        }
    }

    /// Opens the run. A failed start leaves the run without an id, which turns
    /// every later event into a no-op.
    pub async fn run_start(&self) -> HookOutcome {
        {
            let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
            if *phase != RunPhase::Unstarted {
                drop(phase);
                return self.courier.skip(SkipReason::RunAlreadyStarted);
            }
            *phase = RunPhase::Starting;
        }

        let message = Message::RunStart {
            run: self.config.run_start(),
        };
        match self.courier.deliver_for_id(&message).await {
            Some(run_id) => {
                tracing::info!(run_id = %run_id, "run started");
                self.store.set_run_id(run_id);
                self.set_phase(RunPhase::Started);
                HookOutcome::Reported
            }
            None => {
                self.set_phase(RunPhase::Unstarted);
                HookOutcome::Failed(MessageKind::RunStart)
            }
        }
    }

    /// Reports one finished spec: its suite, every case in runner order, the
    /// suite result, and the recording if one exists.
    pub async fn spec_finish(&self, spec: &SpecInfo, results: &SpecResults) -> HookOutcome {
        let Some(run_id) = self.store.run_id() else {
            return self.courier.skip(SkipReason::RunNotStarted);
        };
        if self.phase() == RunPhase::Finished {
            return self.courier.skip(SkipReason::RunFinished);
        }
        let _gate = self.spec_gate.lock().await;
        let spec_key = spec.key();

        let suite_id = match self.store.suite_id(&spec_key) {
            Some(suite_id) => suite_id,
            None => {
                let message = Message::SuiteStart {
                    suite: SuiteStart::for_spec(&run_id, spec_key.as_str(), self.config.shard_index()),
                };
                let Some(suite_id) = self.courier.deliver_for_id(&message).await else {
                    tracing::error!(spec = %spec_key, "suite could not be opened; skipping spec");
                    return HookOutcome::Failed(MessageKind::SuiteStart);
                };
                self.store.set_suite_id(&spec_key, suite_id.clone());
                suite_id
            }
        };

        let mut failed = Vec::new();
        for test in &results.tests {
            let case = test.normalize();
            let start = Message::CaseStart {
                test: CaseStart {
                    suite_id: suite_id.clone(),
                    title: case.title.clone(),
                    full_title: case.full_title.clone(),
                    status: Status::Running,
                    meta: CaseMeta {
                        browser: results.browser_name.clone(),
                    },
                },
            };
            let Some(case_id) = self.courier.deliver_for_id(&start).await else {
                tracing::warn!(spec = %spec_key, full_title = %case.full_title, "case not created; skipping its result");
                failed.push(MessageKind::CaseStart);
                continue;
            };
            self.store
                .set_case_id(&spec_key, &case.full_title, case_id.clone());

            let finish = Message::CaseFinish {
                case_id,
                status: case.status,
                duration_ms: case.duration_ms,
                error: case.error_body(),
            };
            if self.courier.deliver(&finish).await.is_none() {
                failed.push(MessageKind::CaseFinish);
            }
        }

        let finish = Message::SuiteFinish {
            suite_id,
            status: results.suite_status(),
            duration_ms: results.stats.wall_clock_duration,
        };
        if self.courier.deliver(&finish).await.is_none() {
            failed.push(MessageKind::SuiteFinish);
        }

        if let Some(video) = results.video.as_deref() {
            if let Err(kind) = self.attach_video(&spec_key, results, video).await {
                failed.push(kind);
            }
        }

        tracing::debug!(
            spec = %spec_key,
            tests = results.tests.len(),
            failed = failed.len(),
            "spec reported"
        );
        HookOutcome::from_failures(failed)
    }

    /// Attaches the spec recording to the last reported test.
    async fn attach_video(
        &self,
        spec_key: &SpecKey,
        results: &SpecResults,
        video: &Path,
    ) -> Result<(), MessageKind> {
        let storage_path = self
            .courier
            .upload(video)
            .await
            .ok_or(MessageKind::Artifact)?;
        let Some(last) = results.tests.last() else {
            return Ok(());
        };
        let full_title = last.title.full_title();
        let Some(case_id) = self.store.case_id(spec_key, &full_title) else {
            tracing::debug!(spec = %spec_key, full_title = %full_title, "no case to attach video to");
            return Ok(());
        };

        let message = Message::artifact(&case_id, ARTIFACT_VIDEO, storage_path);
        self.courier
            .deliver(&message)
            .await
            .map(|_| ())
            .ok_or(MessageKind::Artifact)
    }

    /// Closes the run with the aggregate results attached as opaque stats.
    pub async fn run_finish(&self, results: &RunResults) -> HookOutcome {
        let Some(run_id) = self.store.run_id() else {
            return self.courier.skip(SkipReason::RunNotStarted);
        };
        {
            let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
            if *phase == RunPhase::Finished {
                drop(phase);
                return self.courier.skip(SkipReason::RunFinished);
            }
            *phase = RunPhase::Finished;
        }

        let message = Message::RunFinish {
            run_id,
            status: results.status(),
            stats: results.raw.clone(),
        };
        let outcome = match self.courier.deliver(&message).await {
            Some(_) => HookOutcome::Reported,
            None => HookOutcome::Failed(MessageKind::RunFinish),
        };
        self.courier.telemetry().log_summary();
        outcome
    }

    /// Attaches a failure screenshot to the case it was captured for.
    pub async fn screenshot_captured(&self, details: &ScreenshotDetails) -> HookOutcome {
        let Some(local_path) = details.path.as_deref() else {
            return self.courier.skip(SkipReason::MissingArtifactPath);
        };
        let Some(full_title) = details.full_title() else {
            return self.courier.skip(SkipReason::MissingTitle);
        };

        let Some(storage_path) = self.courier.upload(local_path).await else {
            return HookOutcome::Failed(MessageKind::Artifact);
        };
        let Some(case_id) = self.store.case_id(&details.spec_key(), &full_title) else {
            return self.courier.skip(SkipReason::UnresolvedCase);
        };

        let message = Message::artifact(&case_id, ARTIFACT_SCREENSHOT, storage_path);
        match self.courier.deliver(&message).await {
            Some(_) => HookOutcome::Reported,
            None => HookOutcome::Failed(MessageKind::Artifact),
        }
    }
}
