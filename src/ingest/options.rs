//! Configurable knobs for the ingestion client along with validation helpers.

use anyhow::{bail, Result};
use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone)]
pub struct IngestClientOptions {
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for IngestClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

impl IngestClientOptions {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.request_timeout.is_zero() {
            bail!("request_timeout must be greater than 0");
        }
        if self.connect_timeout.is_zero() {
            bail!("connect_timeout must be greater than 0");
        }
        Ok(())
    }
}
