//! The run loop behind [`Orchestrator::run`](super::Orchestrator::run).

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use super::Orchestrator;
use crate::context::WorkflowContext;
use crate::contracts::{self, FieldError, ValidationResult};
use crate::domain::{
    CampaignPackage, CampaignRequest, FailureKind, FailureReport, PipelineState,
    PublicationStatus, QualityScore, RunOutcome, RunStatus, Stage,
};
use crate::executor::{call_with_controls, CancelSignal, StageError, StageExecutor};
use crate::metrics::METRICS;
use crate::obs;
use crate::retry::{self, RetryDecision, RetryInstruction, RetryState};

/// Why a run stopped short of DONE.
struct Failure {
    kind: FailureKind,
    stage: Option<Stage>,
    issues: Vec<String>,
    validation_errors: Vec<FieldError>,
    offending_payload: Option<Value>,
}

impl Failure {
    fn new(kind: FailureKind, stage: Option<Stage>, issues: Vec<String>) -> Self {
        Self {
            kind,
            stage,
            issues,
            validation_errors: Vec::new(),
            offending_payload: None,
        }
    }

    fn invalid_request(result: ValidationResult) -> Self {
        Self {
            kind: FailureKind::InvalidRequest,
            stage: None,
            issues: result.messages(),
            validation_errors: result.errors,
            offending_payload: None,
        }
    }

    fn schema_violation(stage: Stage, result: ValidationResult, payload: Value) -> Self {
        Self {
            kind: FailureKind::SchemaViolation,
            stage: Some(stage),
            issues: result.messages(),
            validation_errors: result.errors,
            offending_payload: Some(payload),
        }
    }

    fn from_stage_error(error: StageError) -> Self {
        let kind = match &error {
            StageError::Cancelled { .. } => FailureKind::Cancelled,
            StageError::MissingInput { .. } => FailureKind::SchemaViolation,
            StageError::Permanent { .. } | StageError::RetriesExhausted { .. } => {
                FailureKind::PermanentCollaborator
            }
        };
        Self::new(kind, Some(error.stage()), vec![error.to_string()])
    }
}

/// Mutable state of one run, exclusively owned by the run loop.
pub(super) struct PipelineRun<'a> {
    orchestrator: &'a Orchestrator,
    ctx: WorkflowContext,
    executor: StageExecutor,
    retry: RetryState,
    /// Current pipeline pass (1-based). Incremented on every RETRY.
    pass: u32,
    /// Revision instruction for the stage targeted by the last RETRY.
    revision: Option<RetryInstruction>,
    started: Instant,
}

impl<'a> PipelineRun<'a> {
    pub(super) fn new(orchestrator: &'a Orchestrator, request: Arc<CampaignRequest>) -> Self {
        let executor = StageExecutor::new(
            orchestrator.collaborators.clone(),
            orchestrator.config.clone(),
            orchestrator.cancel.clone(),
        );
        Self {
            orchestrator,
            ctx: WorkflowContext::new(request),
            executor,
            retry: RetryState::new(),
            pass: 1,
            revision: None,
            started: Instant::now(),
        }
    }

    pub(super) fn trace_id(&self) -> Uuid {
        self.ctx.trace_id()
    }

    pub(super) async fn execute(mut self) -> RunOutcome {
        let run_id = self.orchestrator.run_id;
        METRICS.inc_runs_started();
        obs::emit_run_started(run_id, &self.ctx.request().destination);

        let mut state = PipelineState::Init;
        while !state.is_terminal() {
            self.set_status(state, state.stage());

            let step = match state {
                PipelineState::Init => self.check_request(),
                PipelineState::Content | PipelineState::RetryContent => self
                    .run_stage(Stage::Content)
                    .await
                    .map(|()| PipelineState::Design),
                PipelineState::Design | PipelineState::RetryDesign => self
                    .run_stage(Stage::Design)
                    .await
                    .map(|()| PipelineState::Quality),
                PipelineState::Quality => self.quality_gate().await,
                PipelineState::Delivery => self
                    .run_stage(Stage::Delivery)
                    .await
                    .map(|()| PipelineState::Done),
                PipelineState::Done | PipelineState::Failed => Ok(state),
            };

            match step {
                Ok(next) => state = next,
                Err(failure) => return self.fail(failure),
            }
        }

        self.complete().await
    }

    fn check_request(&self) -> Result<PipelineState, Failure> {
        let result = contracts::validate_request(self.ctx.request());
        if result.valid {
            Ok(PipelineState::Content)
        } else {
            Err(Failure::invalid_request(result))
        }
    }

    /// Execute `stage`, validate its output and append the record.
    async fn run_stage(&mut self, stage: Stage) -> Result<(), Failure> {
        let revision = self.revision.as_ref().filter(|r| r.target == stage);
        let raw = self
            .executor
            .execute(stage, &self.ctx, self.pass, revision)
            .await
            .map_err(Failure::from_stage_error)?;

        let accepted = contracts::accept(stage, raw.clone())
            .map_err(|result| Failure::schema_violation(stage, result, raw))?;

        let record = self
            .ctx
            .append(accepted, self.pass)
            .map_err(|e| Failure::new(FailureKind::SchemaViolation, Some(stage), vec![e.to_string()]))?;

        obs::emit_stage_completed(
            self.orchestrator.run_id,
            stage,
            record.iteration(),
            record.sequence(),
        );
        Ok(())
    }

    /// Score the current pair and apply the retry decision.
    async fn quality_gate(&mut self) -> Result<PipelineState, Failure> {
        self.run_stage(Stage::Quality).await?;

        let score = self.ctx.latest_score().cloned().ok_or_else(|| {
            Failure::new(
                FailureKind::SchemaViolation,
                Some(Stage::Quality),
                vec!["quality stage produced no score".to_string()],
            )
        })?;
        let policy = self.orchestrator.config.retry_policy();
        obs::emit_quality_scored(
            self.orchestrator.run_id,
            self.pass,
            &score,
            score.passes(policy.threshold),
        );

        match retry::decide(&score, &self.retry, policy) {
            RetryDecision::Accept => {
                self.revision = None;
                Ok(PipelineState::Delivery)
            }
            RetryDecision::Retry { stage, issues } => {
                let prior = self
                    .ctx
                    .latest(stage)
                    .map(|r| r.payload().clone())
                    .ok_or_else(|| {
                        Failure::from_stage_error(StageError::MissingInput {
                            stage: Stage::Quality,
                            missing: stage,
                        })
                    })?;

                self.retry.record_retry(stage, issues.clone());
                self.pass += 1;
                METRICS.inc_quality_retries();
                obs::emit_quality_retry(self.orchestrator.run_id, stage, self.pass, issues.len());

                self.revision = Some(retry::build_instruction(
                    stage,
                    self.pass,
                    self.ctx.request().clone(),
                    prior,
                    &score,
                    issues,
                ));
                Ok(match stage {
                    Stage::Design => PipelineState::RetryDesign,
                    _ => PipelineState::RetryContent,
                })
            }
            RetryDecision::Escalate { stage, iterations } => {
                let mut issues = vec![format!(
                    "quality gate not met: overall {:.1} below {:.1} after {} {} iterations",
                    score.overall, policy.threshold, iterations, stage
                )];
                issues.extend(
                    score
                        .issues
                        .iter()
                        .map(|i| format!("[{}] {}: {}", i.severity, i.dimension, i.message)),
                );
                Err(Failure::new(
                    FailureKind::QualityGateExhausted,
                    Some(Stage::Quality),
                    issues,
                ))
            }
        }
    }

    /// Enter DONE, then publish. `run.finished` and the metrics flush precede
    /// publication, so a publish failure surfaces only as `publish.error`.
    async fn complete(mut self) -> RunOutcome {
        let run_id = self.orchestrator.run_id;
        let threshold = self.orchestrator.config.retry_policy().threshold;

        let package = match CampaignPackage::assemble(
            run_id,
            self.ctx.trace_id(),
            self.ctx.records().to_vec(),
            threshold,
        ) {
            Ok(package) => package,
            Err(e) => {
                return self.fail(Failure::new(
                    FailureKind::SchemaViolation,
                    Some(Stage::Delivery),
                    vec![e.to_string()],
                ))
            }
        };

        self.set_status(PipelineState::Done, None);
        METRICS.inc_runs_completed();
        obs::emit_run_finished(
            run_id,
            self.elapsed_ms(),
            package.records.len() as u64,
            self.pass,
        );
        METRICS.flush();

        let publication = self.publish(&package).await;
        RunOutcome::Completed {
            package,
            publication,
        }
    }

    /// Publish a DONE package. Failures are recorded, never fatal.
    async fn publish(&mut self, package: &CampaignPackage) -> PublicationStatus {
        let Some(publisher) = self.orchestrator.collaborators.publisher.clone() else {
            return PublicationStatus::NotConfigured;
        };

        let policy = self.orchestrator.config.policy_for(Stage::Delivery);
        let mut attempts = Vec::new();
        let result = call_with_controls(
            Stage::Delivery,
            self.pass,
            &policy,
            &CancelSignal::never(),
            &mut attempts,
            || publisher.publish(package),
        )
        .await;

        match result {
            Ok(publication) => PublicationStatus::Published {
                urls: publication.urls,
            },
            Err(e) => {
                obs::emit_publish_error(self.orchestrator.run_id, &e);
                PublicationStatus::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    fn fail(mut self, failure: Failure) -> RunOutcome {
        let run_id = self.orchestrator.run_id;
        let cancelled = failure.kind == FailureKind::Cancelled;

        let quality_history = self.ctx.quality_history();
        let last_quality_score = quality_history.last().cloned();
        // A cancelled run's context is discarded.
        let records = if cancelled {
            Vec::new()
        } else {
            self.ctx.records().to_vec()
        };

        let report = FailureReport {
            run_id,
            trace_id: self.ctx.trace_id(),
            kind: failure.kind,
            failed_stage: failure.stage,
            iteration: self.pass,
            issues: failure.issues,
            validation_errors: failure.validation_errors,
            offending_payload: failure.offending_payload,
            last_quality_score: last_quality_score.clone(),
            quality_history,
            stage_errors: self.executor.take_attempts(),
            records,
            failed_at: Utc::now(),
        };

        self.publish_status(PipelineState::Failed, failure.stage, last_quality_score);
        if cancelled {
            METRICS.inc_runs_cancelled();
        } else {
            METRICS.inc_runs_failed();
        }
        obs::emit_run_failed(run_id, self.elapsed_ms(), report.kind, &report.summary());
        METRICS.flush();

        RunOutcome::Failed { report }
    }

    fn set_status(&self, state: PipelineState, current_stage: Option<Stage>) {
        self.publish_status(state, current_stage, self.ctx.latest_score().cloned());
    }

    fn publish_status(
        &self,
        state: PipelineState,
        current_stage: Option<Stage>,
        last_quality_score: Option<QualityScore>,
    ) {
        obs::emit_state_changed(self.orchestrator.run_id, state, self.pass);
        self.orchestrator.status.send_replace(RunStatus {
            run_id: self.orchestrator.run_id,
            state,
            current_stage,
            iteration: self.pass,
            last_quality_score,
            updated_at: Utc::now(),
        });
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}
