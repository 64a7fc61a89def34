use std::collections::HashMap;

use anyhow::Result;
use once_cell::sync::Lazy;
use quollabore::{Reporter, ReporterConfig};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use crate::support::mock_ingest::{MockIngest, MockIngestServer};

pub const TOKEN: &str = "test-ingest-token";

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

/// Resolves a config against a fixed environment so tests never see the host's CI variables.
pub fn config_for(portal_url: &str, env: &[(&str, &str)]) -> Result<ReporterConfig> {
    let env: HashMap<String, String> = env
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    ReporterConfig::builder()
        .token(TOKEN)
        .project_id("proj-1")
        .portal_url(portal_url)
        .build_with_env(&env)
}

/// A reporter wired to a fresh mock ingestion server through the real HTTP client.
pub async fn reporter_with_mock() -> Result<(Reporter, MockIngest, MockIngestServer)> {
    init_tracing();
    let ingest = MockIngest::new();
    let server = MockIngestServer::start(ingest.clone()).await?;
    let reporter = Reporter::new(config_for(server.url(), &[])?)?;
    Ok((reporter, ingest, server))
}

pub fn spec(relative: &str) -> Value {
    json!({ "relative": relative, "name": relative, "absolute": format!("/repo/{relative}") })
}

/// Spec results shaped the way Cypress hands them to `after:spec`.
pub fn login_results() -> Value {
    json!({
        "browserName": "chrome",
        "stats": { "tests": 2, "failures": 1, "wallClockDuration": 2100 },
        "tests": [
            {
                "title": ["Login", "accepts valid credentials"],
                "state": "passed",
                "displayError": null,
                "attempts": [{ "wallClockDuration": 830 }]
            },
            {
                "title": ["Login", "rejects bad password"],
                "state": "failed",
                "displayError": "AssertionError: expected 401",
                "attempts": [{ "wallClockDuration": 1200 }]
            }
        ]
    })
}
