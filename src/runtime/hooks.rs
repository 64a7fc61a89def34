use crate::ingest::message::MessageKind;
use serde_json::Value;
use std::fmt;

/// Why an entry point decided not to report anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    RunNotStarted,
    RunAlreadyStarted,
    RunFinished,
    UnresolvedCase,
    MissingArtifactPath,
    MissingTitle,
    MalformedPayload,
    UnknownHook,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SkipReason::RunNotStarted => "run has no remote id",
            SkipReason::RunAlreadyStarted => "run already started",
            SkipReason::RunFinished => "run already finished",
            SkipReason::UnresolvedCase => "case id not resolvable",
            SkipReason::MissingArtifactPath => "artifact path missing",
            SkipReason::MissingTitle => "test title missing",
            SkipReason::MalformedPayload => "payload could not be decoded",
            SkipReason::UnknownHook => "hook not handled",
        };
        f.write_str(reason)
    }
}

/// Outcome of a lifecycle hook or ad-hoc task.
///
/// Hosts discard it; it exists so reporting failures are observable without
/// ever surfacing as errors in the test run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    /// Every message of the event was accepted.
    Reported,
    /// The event was reported, but the listed messages failed.
    Partial { failed: Vec<MessageKind> },
    Skipped(SkipReason),
    /// The event stopped at the given message.
    Failed(MessageKind),
    /// The handler panicked; the panic was contained.
    Aborted,
}

impl HookOutcome {
    pub fn from_failures(failed: Vec<MessageKind>) -> Self {
        if failed.is_empty() {
            HookOutcome::Reported
        } else {
            HookOutcome::Partial { failed }
        }
    }

    pub fn is_reported(&self) -> bool {
        matches!(self, HookOutcome::Reported)
    }

    /// Host-facing task reply: `true` when the message went out, `null` otherwise.
    pub fn task_reply(&self) -> Value {
        if self.is_reported() {
            Value::Bool(true)
        } else {
            Value::Null
        }
    }
}
