//! In-memory correlation between locally known spec/test identities and the
//! ids issued by the ingestion service. Lives exactly as long as one test-run
//! process; nothing is persisted.

use crate::reporter::keys::{CaseKey, SpecKey};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct StoreInner {
    run_id: Option<String>,
    suites: HashMap<SpecKey, String>,
    cases: HashMap<CaseKey, String>,
}

/// Run id plus spec→suite and (spec, full title)→case lookups.
///
/// All methods take `&self`; a write is visible to every later read, including
/// reads issued from ad-hoc tasks running concurrently with a dispatcher event.
#[derive(Debug, Default)]
pub struct CorrelationStore {
    inner: RwLock<StoreInner>,
}

impl CorrelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_run_id(&self, run_id: impl Into<String>) {
        self.write().run_id = Some(run_id.into());
    }

    /// `None` until a run-start succeeded.
    pub fn run_id(&self) -> Option<String> {
        self.read().run_id.clone()
    }

    /// Overwrites any id previously cached for the spec.
    pub fn set_suite_id(&self, spec: &SpecKey, suite_id: impl Into<String>) {
        self.write().suites.insert(spec.clone(), suite_id.into());
    }

    pub fn suite_id(&self, spec: &SpecKey) -> Option<String> {
        self.read().suites.get(spec).cloned()
    }

    pub fn set_case_id(&self, spec: &SpecKey, full_title: &str, case_id: impl Into<String>) {
        self.write()
            .cases
            .insert(CaseKey::new(spec.clone(), full_title), case_id.into());
    }

    pub fn case_id(&self, spec: &SpecKey, full_title: &str) -> Option<String> {
        self.read()
            .cases
            .get(&CaseKey::new(spec.clone(), full_title))
            .cloned()
    }

    pub fn suite_count(&self) -> usize {
        self.read().suites.len()
    }

    pub fn case_count(&self) -> usize {
        self.read().cases.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
