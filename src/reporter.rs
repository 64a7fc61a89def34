//! Correlation and reporting core: identity derivation, the correlation store,
//! the lifecycle event dispatcher, and the ad-hoc task handler.

pub mod dispatcher;
pub mod keys;
pub mod store;
pub mod tasks;

pub use dispatcher::{EventDispatcher, RunPhase};
pub use keys::{CaseKey, SpecKey, TitlePath};
pub use store::CorrelationStore;
pub use tasks::{ArtifactTask, CaseRef, CaseUpdateTask, LogTask, TaskHandler, TaskRequest};
