//! Global atomic counters for campaign pipeline observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a run).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocations and no locking.
pub struct Metrics {
    runs_started: AtomicU64,
    runs_completed: AtomicU64,
    runs_failed: AtomicU64,
    runs_cancelled: AtomicU64,
    transport_retries: AtomicU64,
    quality_retries: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            runs_started: AtomicU64::new(0),
            runs_completed: AtomicU64::new(0),
            runs_failed: AtomicU64::new(0),
            runs_cancelled: AtomicU64::new(0),
            transport_retries: AtomicU64::new(0),
            quality_retries: AtomicU64::new(0),
        }
    }

    pub fn inc_runs_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runs_started", "counter incremented");
    }

    pub fn inc_runs_completed(&self) {
        self.runs_completed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runs_completed", "counter incremented");
    }

    /// Failed runs, cancellations excluded.
    pub fn inc_runs_failed(&self) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runs_failed", "counter incremented");
    }

    pub fn inc_runs_cancelled(&self) {
        self.runs_cancelled.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runs_cancelled", "counter incremented");
    }

    /// Transient collaborator failures that were retried.
    pub fn inc_transport_retries(&self) {
        self.transport_retries.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "transport_retries", "counter incremented");
    }

    /// Quality-gate RETRY decisions.
    pub fn inc_quality_retries(&self) {
        self.quality_retries.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "quality_retries", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            runs_started = self.runs_started(),
            runs_completed = self.runs_completed(),
            runs_failed = self.runs_failed(),
            runs_cancelled = self.runs_cancelled(),
            transport_retries = self.transport_retries(),
            quality_retries = self.quality_retries(),
        );
    }

    pub fn runs_started(&self) -> u64 {
        self.runs_started.load(Ordering::Relaxed)
    }

    pub fn runs_completed(&self) -> u64 {
        self.runs_completed.load(Ordering::Relaxed)
    }

    pub fn runs_failed(&self) -> u64 {
        self.runs_failed.load(Ordering::Relaxed)
    }

    pub fn runs_cancelled(&self) -> u64 {
        self.runs_cancelled.load(Ordering::Relaxed)
    }

    pub fn transport_retries(&self) -> u64 {
        self.transport_retries.load(Ordering::Relaxed)
    }

    pub fn quality_retries(&self) -> u64 {
        self.quality_retries.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.runs_started.store(0, Ordering::Relaxed);
        self.runs_completed.store(0, Ordering::Relaxed);
        self.runs_failed.store(0, Ordering::Relaxed);
        self.runs_cancelled.store(0, Ordering::Relaxed);
        self.transport_retries.store(0, Ordering::Relaxed);
        self.quality_retries.store(0, Ordering::Relaxed);
    }
}
