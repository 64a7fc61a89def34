pub mod ingest;
pub mod reporter;
pub mod runtime;

pub use ingest::{
    ArtifactStorage, IngestClient, IngestClientOptions, IngestError, IngestMetricsSnapshot,
    LocalPathStorage, Message, MessageKind, ReportTransport, Status,
};
pub use reporter::{CorrelationStore, EventDispatcher, RunPhase, SpecKey, TaskHandler, TitlePath};
pub use runtime::ci::{CiMetadata, CiProvider};
pub use runtime::config::{EnvSource, ProcessEnv, ReporterConfig, ReporterConfigBuilder};
pub use runtime::events::RunnerEvent;
pub use runtime::hooks::{HookOutcome, SkipReason};
pub use runtime::runner::Reporter;
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
