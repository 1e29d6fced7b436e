//! Stage execution controls: timeout, transient retry with exponential
//! backoff, and cooperative cancellation.
//!
//! [`call_with_controls`] wraps a single collaborator call. [`StageExecutor`]
//! builds the stage-specific request from the workflow context and runs it
//! through those controls, keeping an attempt log for failure reports.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::collaborator::{
    AssetRequirements, CollaboratorError, CollaboratorResult, Collaborators, ContentPrompt,
};
use crate::config::PipelineConfig;
use crate::context::WorkflowContext;
use crate::domain::{AttemptFailure, CampaignRequest, Stage, StagePayload};
use crate::metrics::METRICS;
use crate::obs;
use crate::retry::RetryInstruction;
use crate::scorer::QualityScorer;

/// Transport-level controls for one collaborator call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportPolicy {
    /// Hard deadline for a single attempt (milliseconds).
    pub timeout_ms: u64,
    /// Retries after the first attempt for transient failures (0 = run once).
    pub max_retries: u32,
    /// Delay before the first retry (milliseconds).
    pub backoff_base_ms: u64,
    /// Multiplier applied to the delay after every retry.
    pub backoff_factor: u32,
}

impl Default for TransportPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_retries: 2,
            backoff_base_ms: 1_000,
            backoff_factor: 2,
        }
    }
}

impl TransportPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delay after failed attempt `attempt` (1-based):
    /// `backoff_base_ms * backoff_factor^(attempt - 1)`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let multiplier = u64::from(self.backoff_factor).saturating_pow(exponent);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(multiplier))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// Errors surfaced by a stage execution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StageError {
    #[error("{stage} collaborator failed permanently: {error}")]
    Permanent {
        stage: Stage,
        error: CollaboratorError,
    },

    #[error("{stage} collaborator still failing after {attempts} attempts: {last}")]
    RetriesExhausted {
        stage: Stage,
        attempts: u32,
        last: CollaboratorError,
    },

    #[error("{stage} cancelled")]
    Cancelled { stage: Stage },

    #[error("{stage} cannot run without a validated {missing} record")]
    MissingInput { stage: Stage, missing: Stage },
}

impl StageError {
    pub fn stage(&self) -> Stage {
        match self {
            StageError::Permanent { stage, .. }
            | StageError::RetriesExhausted { stage, .. }
            | StageError::Cancelled { stage }
            | StageError::MissingInput { stage, .. } => *stage,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, StageError::Cancelled { .. })
    }
}

/// Sending half of a run's cancel signal.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Receiving half of a run's cancel signal.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: Option<watch::Receiver<bool>>,
}

/// Create a connected cancel handle and signal.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (
        CancelHandle { tx: Arc::new(tx) },
        CancelSignal { rx: Some(rx) },
    )
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Resolves once cancellation is requested. Pends forever if the handle
    /// is dropped without cancelling.
    pub async fn cancelled(&self) {
        let Some(rx) = &self.rx else {
            return std::future::pending().await;
        };
        let mut rx = rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::never()
    }
}

/// Run `call` with timeout, transient retry and cancellation controls.
///
/// Every failed attempt is appended to `attempts`. Permanent failures return
/// immediately; transient ones are retried up to `policy.max_retries` times
/// with exponential backoff. Cancellation is checked before every attempt and
/// raced against both the call and the backoff sleep.
pub async fn call_with_controls<T, F, Fut>(
    stage: Stage,
    iteration: u32,
    policy: &TransportPolicy,
    cancel: &CancelSignal,
    attempts: &mut Vec<AttemptFailure>,
    call: F,
) -> Result<T, StageError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = CollaboratorResult<T>>,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 0;

    loop {
        attempt += 1;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StageError::Cancelled { stage }),
            result = tokio::time::timeout(policy.timeout(), call()) => result,
        };

        let error = match outcome {
            Ok(Ok(value)) => {
                debug!(stage = %stage, attempt, "collaborator call succeeded");
                return Ok(value);
            }
            Ok(Err(error)) => error,
            Err(_elapsed) => CollaboratorError::timeout(format!(
                "no response within {}ms",
                policy.timeout_ms
            )),
        };

        attempts.push(AttemptFailure {
            stage,
            iteration,
            attempt,
            error: error.clone(),
            at: Utc::now(),
        });

        if !error.is_transient() {
            warn!(stage = %stage, attempt, error = %error, "permanent collaborator failure");
            return Err(StageError::Permanent { stage, error });
        }

        if attempt >= max_attempts {
            warn!(stage = %stage, attempts = attempt, error = %error, "transient retries exhausted");
            return Err(StageError::RetriesExhausted {
                stage,
                attempts: attempt,
                last: error,
            });
        }

        let delay = policy.backoff_for(attempt);
        METRICS.inc_transport_retries();
        obs::emit_stage_retrying(stage, attempt, delay, &error);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StageError::Cancelled { stage }),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Executes pipeline stages for one run.
pub struct StageExecutor {
    collaborators: Collaborators,
    config: Arc<PipelineConfig>,
    scorer: QualityScorer,
    cancel: CancelSignal,
    attempts: Vec<AttemptFailure>,
}

impl StageExecutor {
    pub fn new(
        collaborators: Collaborators,
        config: Arc<PipelineConfig>,
        cancel: CancelSignal,
    ) -> Self {
        let scorer = QualityScorer::new(collaborators.analyzers.clone(), config.analyzer_policy());
        Self {
            collaborators,
            config,
            scorer,
            cancel,
            attempts: Vec::new(),
        }
    }

    /// Drain the failed attempts observed so far, oldest first.
    pub fn take_attempts(&mut self) -> Vec<AttemptFailure> {
        std::mem::take(&mut self.attempts)
    }

    /// Produce the raw output of `stage` from the current context.
    ///
    /// `revision` carries the quality feedback when `stage` is the target of
    /// a retry. The returned value has not been validated yet.
    pub async fn execute(
        &mut self,
        stage: Stage,
        ctx: &WorkflowContext,
        iteration: u32,
        revision: Option<&RetryInstruction>,
    ) -> Result<Value, StageError> {
        match stage {
            Stage::Content => self.content(ctx, iteration, revision).await,
            Stage::Design => self.design(ctx, iteration, revision).await,
            Stage::Quality => self.quality(ctx, iteration).await,
            Stage::Delivery => self.delivery(ctx, iteration).await,
        }
    }

    async fn content(
        &mut self,
        ctx: &WorkflowContext,
        iteration: u32,
        revision: Option<&RetryInstruction>,
    ) -> Result<Value, StageError> {
        let prompt = ContentPrompt {
            instruction: content_instruction(ctx.request(), revision),
            request: ctx.request().clone(),
            revision: revision.cloned(),
        };
        let generator = self.collaborators.content.clone();
        let policy = self.config.policy_for(Stage::Content);

        call_with_controls(
            Stage::Content,
            iteration,
            &policy,
            &self.cancel,
            &mut self.attempts,
            || generator.generate(&prompt),
        )
        .await
    }

    async fn design(
        &mut self,
        ctx: &WorkflowContext,
        iteration: u32,
        revision: Option<&RetryInstruction>,
    ) -> Result<Value, StageError> {
        let content = ctx.content().ok_or(StageError::MissingInput {
            stage: Stage::Design,
            missing: Stage::Content,
        })?;

        let request = ctx.request();
        let (corrections, prior_markup) = match revision {
            Some(instruction) => {
                let prior = match &instruction.prior_output {
                    StagePayload::Design(design) => Some(design.markup_source.clone()),
                    _ => None,
                };
                (instruction.suggested_corrections.clone(), prior)
            }
            None => (Vec::new(), None),
        };
        let requirements = AssetRequirements {
            tone: request.tone,
            language: request.language.clone(),
            design_reference: request.design_reference.clone(),
            corrections,
            prior_markup,
        };
        let renderer = self.collaborators.design.clone();
        let policy = self.config.policy_for(Stage::Design);

        call_with_controls(
            Stage::Design,
            iteration,
            &policy,
            &self.cancel,
            &mut self.attempts,
            || renderer.render(content, &requirements),
        )
        .await
    }

    async fn quality(&mut self, ctx: &WorkflowContext, iteration: u32) -> Result<Value, StageError> {
        let content = ctx.latest(Stage::Content).ok_or(StageError::MissingInput {
            stage: Stage::Quality,
            missing: Stage::Content,
        })?;
        let design = ctx.latest(Stage::Design).ok_or(StageError::MissingInput {
            stage: Stage::Quality,
            missing: Stage::Design,
        })?;

        let score = self
            .scorer
            .score(
                ctx.request().clone(),
                content,
                design,
                iteration,
                &self.cancel,
                &mut self.attempts,
            )
            .await?;

        serde_json::to_value(&score).map_err(|e| StageError::Permanent {
            stage: Stage::Quality,
            error: CollaboratorError::internal(e.to_string()),
        })
    }

    async fn delivery(&mut self, ctx: &WorkflowContext, iteration: u32) -> Result<Value, StageError> {
        if ctx.latest_score().is_none() {
            return Err(StageError::MissingInput {
                stage: Stage::Delivery,
                missing: Stage::Quality,
            });
        }
        let design = ctx.design().ok_or(StageError::MissingInput {
            stage: Stage::Delivery,
            missing: Stage::Design,
        })?;

        let compiler = self.collaborators.compiler.clone();
        let policy = self.config.policy_for(Stage::Delivery);
        let markup = design.markup_source.as_str();

        call_with_controls(
            Stage::Delivery,
            iteration,
            &policy,
            &self.cancel,
            &mut self.attempts,
            || compiler.compile(markup),
        )
        .await
    }
}

/// Render the natural-language instruction for the content generator.
pub fn content_instruction(request: &CampaignRequest, revision: Option<&RetryInstruction>) -> String {
    let mut text = format!(
        "Write a {} marketing email in {} for {}.\nBrief: {}",
        request.tone, request.language, request.destination, request.brief
    );
    if let Some(reference) = &request.design_reference {
        text.push_str(&format!("\nDesign reference: {reference}"));
    }

    if let Some(instruction) = revision {
        text.push_str(&format!(
            "\n\nRevision {}: the previous draft did not pass review.",
            instruction.iteration
        ));
        if !instruction.issues.is_empty() {
            text.push_str("\nIssues:");
            for issue in &instruction.issues {
                text.push_str(&format!(
                    "\n- [{}] {}: {}",
                    issue.severity, issue.dimension, issue.message
                ));
            }
        }
        if !instruction.suggested_corrections.is_empty() {
            text.push_str("\nCorrections:");
            for correction in &instruction.suggested_corrections {
                text.push_str(&format!("\n- {correction}"));
            }
        }
    }
    text
}
