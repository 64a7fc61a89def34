//! Ingestion client: one authenticated JSON POST per protocol message. Houses
//! the `IngestClient`, its error type, and the `ReportTransport` trait consumed
//! by the dispatcher and task handler.

use crate::ingest::auth::build_auth_headers;
use crate::ingest::message::{Message, MessageKind};
use crate::ingest::metrics::{IngestMetrics, IngestMetricsSnapshot, RequestOutcome};
use crate::ingest::options::IngestClientOptions;
use crate::runtime::config::ReporterConfig;
use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug)]
pub enum IngestError {
    Status {
        kind: MessageKind,
        status: u16,
        body: String,
    },
    Timeout {
        kind: MessageKind,
    },
    Transport {
        kind: MessageKind,
        message: String,
    },
}

impl IngestError {
    pub fn kind(&self) -> MessageKind {
        match self {
            IngestError::Status { kind, .. }
            | IngestError::Timeout { kind }
            | IngestError::Transport { kind, .. } => *kind,
        }
    }
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::Status { kind, status, body } => {
                write!(f, "{kind} rejected with HTTP {status}: {body}")
            }
            IngestError::Timeout { kind } => write!(f, "{kind} request timed out"),
            IngestError::Transport { kind, message } => {
                write!(f, "{kind} request failed: {message}")
            }
        }
    }
}

impl std::error::Error for IngestError {}

/// Sends one protocol message and returns the decoded response body.
pub trait ReportTransport: Send + Sync {
    fn send<'a>(&'a self, message: &'a Message) -> BoxFuture<'a, Result<Value>>;
}

#[derive(Debug, Clone)]
pub struct IngestClient {
    portal_url: Arc<String>,
    client: reqwest::Client,
    options: IngestClientOptions,
    metrics: Arc<IngestMetrics>,
}

impl ReportTransport for IngestClient {
    fn send<'a>(&'a self, message: &'a Message) -> BoxFuture<'a, Result<Value>> {
        Box::pin(self.post(message))
    }
}

impl IngestClient {
    pub fn new(portal_url: impl Into<String>, token: &str) -> Result<Self> {
        Self::with_options(portal_url, token, IngestClientOptions::default())
    }

    pub fn with_options(
        portal_url: impl Into<String>,
        token: &str,
        options: IngestClientOptions,
    ) -> Result<Self> {
        options.validate()?;

        let headers = build_auth_headers(token)?;
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(options.request_timeout)
            .connect_timeout(options.connect_timeout)
            .build()
            .map_err(|err| anyhow!("failed to build ingestion client: {err}"))?;

        Ok(Self {
            portal_url: Arc::new(portal_url.into()),
            client,
            options,
            metrics: Arc::new(IngestMetrics::default()),
        })
    }

    pub fn from_config(config: &ReporterConfig) -> Result<Self> {
        let options = IngestClientOptions {
            request_timeout: config.request_timeout(),
            ..IngestClientOptions::default()
        };
        Self::with_options(config.portal_url().to_owned(), config.token(), options)
    }

    pub fn endpoint(&self) -> &str {
        &self.portal_url
    }

    pub fn options(&self) -> &IngestClientOptions {
        &self.options
    }

    pub fn metrics(&self) -> IngestMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub async fn post(&self, message: &Message) -> Result<Value> {
        let kind = message.kind();
        let start = Instant::now();

        let response = match self
            .client
            .post(self.portal_url.as_str())
            .json(message)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                let elapsed = start.elapsed();
                if err.is_timeout() {
                    self.metrics
                        .record(kind, elapsed, RequestOutcome::TimedOut);
                    return Err(IngestError::Timeout { kind }.into());
                }
                self.metrics.record(kind, elapsed, RequestOutcome::Rejected);
                return Err(IngestError::Transport {
                    kind,
                    message: err.to_string(),
                }
                .into());
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = match response.text().await {
                Ok(text) if !text.trim().is_empty() => text,
                _ => status.canonical_reason().unwrap_or_default().to_owned(),
            };
            self.metrics
                .record(kind, start.elapsed(), RequestOutcome::Rejected);
            return Err(IngestError::Status {
                kind,
                status: status.as_u16(),
                body,
            }
            .into());
        }

        // Bodies that are empty or not JSON decode to an empty object.
        let value = match response.bytes().await {
            Ok(bytes) => serde_json::from_slice::<Value>(&bytes)
                .unwrap_or_else(|_| Value::Object(Map::new())),
            Err(err) => {
                tracing::debug!(kind = %kind, error = %err, "failed to read ingestion response body");
                Value::Object(Map::new())
            }
        };

        self.metrics
            .record(kind, start.elapsed(), RequestOutcome::Accepted);
        tracing::trace!(kind = %kind, status = status.as_u16(), "ingestion request completed");
        Ok(value)
    }
}
