//! Failure isolation shared by the dispatcher and the task handler. Nothing
//! that goes wrong while reporting may reach the host runner: transport and
//! upload errors become logged no-ops, panics become [`HookOutcome::Aborted`].

use crate::ingest::client::ReportTransport;
use crate::ingest::message::{issued_id, Message};
use crate::ingest::storage::ArtifactStorage;
use crate::runtime::hooks::{HookOutcome, SkipReason};
use crate::runtime::telemetry::Telemetry;
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;

/// Runs one externally invoked entry point, containing any panic it raises.
pub async fn isolate<F>(entry: &str, future: F) -> HookOutcome
where
    F: Future<Output = HookOutcome>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(payload) => {
            tracing::error!(
                entry,
                panic = panic_message(payload.as_ref()),
                "reporting handler panicked; continuing without it"
            );
            HookOutcome::Aborted
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Sends messages and uploads artifacts, turning every failure into a logged
/// `None`.
#[derive(Clone)]
pub(crate) struct Courier {
    transport: Arc<dyn ReportTransport>,
    storage: Arc<dyn ArtifactStorage>,
    telemetry: Arc<Telemetry>,
}

impl Courier {
    pub(crate) fn new(
        transport: Arc<dyn ReportTransport>,
        storage: Arc<dyn ArtifactStorage>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            transport,
            storage,
            telemetry,
        }
    }

    pub(crate) async fn deliver(&self, message: &Message) -> Option<Value> {
        let kind = message.kind();
        match self.transport.send(message).await {
            Ok(response) => {
                self.telemetry.record_sent();
                tracing::debug!(kind = %kind, "protocol message delivered");
                Some(response)
            }
            Err(err) => {
                self.telemetry.record_failed();
                tracing::error!(kind = %kind, error = %err, "protocol message failed");
                None
            }
        }
    }

    /// Delivers a start message and extracts the id the server issued for it.
    pub(crate) async fn deliver_for_id(&self, message: &Message) -> Option<String> {
        let kind = message.kind();
        let field = kind.issued_id_field()?;
        let response = self.deliver(message).await?;
        let id = issued_id(&response, field);
        if id.is_none() {
            tracing::error!(kind = %kind, field, "response did not carry an id");
        }
        id
    }

    /// Uploads a local artifact; `None` when the upload failed or produced no path.
    pub(crate) async fn upload(&self, local_path: &Path) -> Option<String> {
        match self.storage.upload(local_path).await {
            Ok(storage_path) if !storage_path.is_empty() => {
                self.telemetry.record_upload();
                Some(storage_path)
            }
            Ok(_) => {
                self.telemetry.record_upload_failure();
                tracing::warn!(path = %local_path.display(), "artifact upload returned no storage path");
                None
            }
            Err(err) => {
                self.telemetry.record_upload_failure();
                tracing::error!(path = %local_path.display(), error = %err, "artifact upload failed");
                None
            }
        }
    }

    pub(crate) fn skip(&self, reason: SkipReason) -> HookOutcome {
        self.telemetry.record_skipped();
        tracing::debug!(%reason, "nothing to report");
        HookOutcome::Skipped(reason)
    }

    pub(crate) fn telemetry(&self) -> &Arc<Telemetry> {
        &self.telemetry
    }
}
