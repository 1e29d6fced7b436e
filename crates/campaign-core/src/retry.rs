//! Retry controller: the quality gate's accept / retry / escalate decision.
//!
//! [`decide`] is pure. [`RetryState`] is owned by one run and dropped with it.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::{
    CampaignRequest, Dimension, QualityIssue, QualityScore, Severity, Stage, StagePayload,
    SCORE_EPSILON,
};

/// Quality gate parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    /// Minimum overall score (inclusive).
    pub threshold: f64,
    /// Maximum executions of any retryable stage.
    pub max_iterations: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            threshold: 70.0,
            max_iterations: 3,
        }
    }
}

/// Outcome of evaluating a quality score.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    Accept,
    Retry {
        stage: Stage,
        issues: Vec<QualityIssue>,
    },
    Escalate {
        stage: Stage,
        iterations: u32,
    },
}

/// Per-run retry bookkeeping.
///
/// Counts start at 1 for Content and Design (their first execution). A retry
/// of a stage also re-runs every retryable stage downstream of it, so those
/// counters move too.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryState {
    executions: BTreeMap<Stage, u32>,
    target: Option<Stage>,
    driving_issues: Vec<QualityIssue>,
}

/// Stages the quality gate can send work back to.
const RETRYABLE: [Stage; 2] = [Stage::Content, Stage::Design];

impl Default for RetryState {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryState {
    pub fn new() -> Self {
        Self {
            executions: RETRYABLE.iter().map(|s| (*s, 1)).collect(),
            target: None,
            driving_issues: Vec::new(),
        }
    }

    /// Executions of `stage` so far.
    pub fn iterations(&self, stage: Stage) -> u32 {
        self.executions.get(&stage).copied().unwrap_or(0)
    }

    /// Target of the most recent retry.
    pub fn target(&self) -> Option<Stage> {
        self.target
    }

    pub fn driving_issues(&self) -> &[QualityIssue] {
        &self.driving_issues
    }

    /// First stage a retry of `stage` would re-run that has already used
    /// `max_iterations` executions.
    pub fn exhausted_by(&self, stage: Stage, max_iterations: u32) -> Option<(Stage, u32)> {
        RETRYABLE
            .into_iter()
            .filter(|retryable| *retryable >= stage)
            .map(|retryable| (retryable, self.iterations(retryable)))
            .find(|(_, iterations)| *iterations >= max_iterations)
    }

    /// Record a retry of `stage`; returns the stage's new execution count.
    pub fn record_retry(&mut self, stage: Stage, issues: Vec<QualityIssue>) -> u32 {
        for retryable in RETRYABLE {
            if retryable >= stage {
                *self.executions.entry(retryable).or_insert(0) += 1;
            }
        }
        self.target = Some(stage);
        self.driving_issues = issues;
        self.iterations(stage)
    }
}

/// Decide what to do with `score` given the run's retry state.
pub fn decide(score: &QualityScore, state: &RetryState, policy: &RetryPolicy) -> RetryDecision {
    if score.passes(policy.threshold) {
        return RetryDecision::Accept;
    }

    let stage = select_target(score);
    if let Some((stage, iterations)) = state.exhausted_by(stage, policy.max_iterations) {
        return RetryDecision::Escalate { stage, iterations };
    }

    let mut issues: Vec<QualityIssue> = score
        .issues
        .iter()
        .filter(|i| i.dimension.retry_target() == stage)
        .cloned()
        .collect();
    issues.sort_by(|a, b| b.severity.cmp(&a.severity));

    RetryDecision::Retry { stage, issues }
}

/// Pick the stage to re-run for a failing score.
///
/// Highest issue severity wins, then the larger weighted deficit, then
/// Content.
pub fn select_target(score: &QualityScore) -> Stage {
    let content = (
        max_severity_for(score, Stage::Content),
        weighted_deficit(score, Stage::Content),
    );
    let design = (
        max_severity_for(score, Stage::Design),
        weighted_deficit(score, Stage::Design),
    );

    if design.0 != content.0 {
        return if design.0 > content.0 {
            Stage::Design
        } else {
            Stage::Content
        };
    }
    if design.1 > content.1 + SCORE_EPSILON {
        Stage::Design
    } else {
        Stage::Content
    }
}

fn max_severity_for(score: &QualityScore, stage: Stage) -> Option<Severity> {
    score
        .issues
        .iter()
        .filter(|i| i.dimension.retry_target() == stage)
        .map(|i| i.severity)
        .max()
}

/// `Σ weight·(100 − sub_score)` over the dimensions routed to `stage`.
pub fn weighted_deficit(score: &QualityScore, stage: Stage) -> f64 {
    Dimension::ALL
        .iter()
        .filter(|d| d.retry_target() == stage)
        .map(|d| d.weight() * (100.0 - score.dimension(*d)))
        .sum()
}

/// Enriched instruction handed to the stage targeted by a retry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetryInstruction {
    pub target: Stage,
    /// Pipeline pass the revision belongs to.
    pub iteration: u32,
    pub request: Arc<CampaignRequest>,
    /// The output being revised.
    pub prior_output: StagePayload,
    pub previous_overall: f64,
    pub issues: Vec<QualityIssue>,
    pub suggested_corrections: Vec<String>,
}

/// Build the revision instruction for a RETRY decision.
pub fn build_instruction(
    target: Stage,
    iteration: u32,
    request: Arc<CampaignRequest>,
    prior_output: StagePayload,
    score: &QualityScore,
    issues: Vec<QualityIssue>,
) -> RetryInstruction {
    let suggested_corrections = issues
        .iter()
        .map(|issue| match &issue.suggestion {
            Some(suggestion) => suggestion.clone(),
            None => format!("Resolve {} issue: {}", issue.dimension, issue.message),
        })
        .collect();

    RetryInstruction {
        target,
        iteration,
        request,
        prior_output,
        previous_overall: score.overall,
        issues,
        suggested_corrections,
    }
}
