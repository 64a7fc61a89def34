//! Ingestion plumbing: protocol messages, bearer authentication, the HTTP
//! client, request metrics, and the artifact storage seam.

pub mod auth;
pub mod client;
pub mod message;
pub mod metrics;
pub mod options;
pub mod storage;

pub use client::{IngestClient, IngestError, ReportTransport};
pub use message::{Message, MessageKind, Status};
pub use metrics::IngestMetricsSnapshot;
pub use options::IngestClientOptions;
pub use storage::{ArtifactStorage, LocalPathStorage};
