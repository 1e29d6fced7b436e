//! Structured observability hooks for campaign run lifecycle events.
//!
//! This module provides:
//! - Run-scoped tracing spans, either as a `RunSpan` RAII guard for
//!   synchronous code or via [`run_span`] + `Instrument` for async runs
//! - Emission functions for key lifecycle events: start, stage completion,
//!   transport retries, quality scoring, finish and failure
//!
//! Events are emitted at `info!` level (configurable via `CAMPAIGN_LOG`).

use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{FailureKind, PipelineState, QualityScore, RunId, Stage};

/// RAII guard that enters a run-scoped tracing span.
///
/// The entered span is not `Send`; async code should instrument its future
/// with [`run_span`] instead.
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    pub fn enter(run_id: RunId) -> Self {
        Self {
            _span: run_span(run_id, None).entered(),
        }
    }
}

/// Span tagged with the run id (and trace id once known).
pub fn run_span(run_id: RunId, trace_id: Option<Uuid>) -> tracing::Span {
    match trace_id {
        Some(trace_id) => tracing::info_span!("campaign.run", run_id = %run_id, trace_id = %trace_id),
        None => tracing::info_span!("campaign.run", run_id = %run_id),
    }
}

pub fn emit_run_started(run_id: RunId, destination: &str) {
    info!(event = "run.started", run_id = %run_id, destination = %destination);
}

pub fn emit_state_changed(run_id: RunId, state: PipelineState, iteration: u32) {
    tracing::debug!(
        event = "run.state_changed",
        run_id = %run_id,
        state = %state,
        iteration = iteration,
    );
}

/// Emit event: a stage's output passed validation and was recorded.
pub fn emit_stage_completed(run_id: RunId, stage: Stage, iteration: u32, sequence: u32) {
    info!(
        event = "stage.completed",
        run_id = %run_id,
        stage = %stage,
        iteration = iteration,
        seq = sequence,
    );
}

/// Emit event: a transient collaborator failure will be retried.
pub fn emit_stage_retrying(
    stage: Stage,
    attempt: u32,
    delay: Duration,
    error: &dyn std::fmt::Display,
) {
    warn!(
        event = "stage.retrying",
        stage = %stage,
        attempt = attempt,
        delay_ms = delay.as_millis() as u64,
        error = %error,
    );
}

pub fn emit_quality_scored(run_id: RunId, iteration: u32, score: &QualityScore, passed: bool) {
    info!(
        event = "quality.scored",
        run_id = %run_id,
        iteration = iteration,
        overall = score.overall,
        content = score.content,
        design = score.design,
        technical = score.technical,
        brand = score.brand,
        issues = score.issues.len() as u64,
        passed = passed,
    );
}

/// Emit event: the quality gate sent work back to a stage.
pub fn emit_quality_retry(run_id: RunId, target: Stage, iteration: u32, issues: usize) {
    info!(
        event = "quality.retry",
        run_id = %run_id,
        target = %target,
        iteration = iteration,
        issues = issues as u64,
    );
}

pub fn emit_run_finished(run_id: RunId, duration_ms: u64, records: u64, iterations: u32) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        records = records,
        iterations = iterations,
        success = true,
    );
}

pub fn emit_run_failed(run_id: RunId, duration_ms: u64, kind: FailureKind, summary: &str) {
    warn!(
        event = "run.failed",
        run_id = %run_id,
        duration_ms = duration_ms,
        kind = %kind,
        summary = %summary,
    );
}

/// Emit event: publishing a completed package failed (the run stays DONE).
pub fn emit_publish_error(run_id: RunId, error: &dyn std::fmt::Display) {
    warn!(event = "run.publish_error", run_id = %run_id, error = %error);
}
