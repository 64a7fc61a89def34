//! Per-client request accounting: how many protocol messages were posted, how
//! many the service rejected or never answered, and how long the calls took.

use crate::ingest::message::MessageKind;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// How one POST ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RequestOutcome {
    Accepted,
    Rejected,
    TimedOut,
}

#[derive(Debug, Default)]
pub(crate) struct IngestMetrics {
    requests: AtomicU64,
    rejected: AtomicU64,
    timed_out: AtomicU64,
    latency_us: AtomicU64,
    slowest_us: AtomicU64,
    failures_by_kind: Mutex<HashMap<MessageKind, u64>>,
}

impl IngestMetrics {
    pub(crate) fn record(&self, kind: MessageKind, elapsed: Duration, outcome: RequestOutcome) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.latency_us.fetch_add(micros, Ordering::Relaxed);
        self.slowest_us.fetch_max(micros, Ordering::Relaxed);

        match outcome {
            RequestOutcome::Accepted => return,
            RequestOutcome::Rejected => self.rejected.fetch_add(1, Ordering::Relaxed),
            RequestOutcome::TimedOut => self.timed_out.fetch_add(1, Ordering::Relaxed),
        };
        *self
            .failures_by_kind
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default() += 1;
    }

    pub(crate) fn snapshot(&self) -> IngestMetricsSnapshot {
        let total_requests = self.requests.load(Ordering::Relaxed);
        let total_timeouts = self.timed_out.load(Ordering::Relaxed);
        let latency_us = self.latency_us.load(Ordering::Relaxed);

        IngestMetricsSnapshot {
            total_requests,
            total_errors: self.rejected.load(Ordering::Relaxed) + total_timeouts,
            total_timeouts,
            average_latency_ms: match total_requests {
                0 => 0.0,
                n => latency_us as f64 / n as f64 / 1_000.0,
            },
            slowest_ms: self.slowest_us.load(Ordering::Relaxed) as f64 / 1_000.0,
            failures_by_kind: self
                .failures_by_kind
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}

/// Point-in-time view of an [`IngestClient`](crate::ingest::IngestClient)'s traffic.
#[derive(Debug, Clone, Default)]
pub struct IngestMetricsSnapshot {
    pub total_requests: u64,
    /// Rejections and timeouts together.
    pub total_errors: u64,
    pub total_timeouts: u64,
    pub average_latency_ms: f64,
    pub slowest_ms: f64,
    pub failures_by_kind: HashMap<MessageKind, u64>,
}

impl IngestMetricsSnapshot {
    pub fn failures_for(&self, kind: MessageKind) -> u64 {
        self.failures_by_kind.get(&kind).copied().unwrap_or(0)
    }
}
