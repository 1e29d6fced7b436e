//! Terminal run artifacts: the campaign package and the failure report.
//!
//! Both can be persisted as `<dir>/<run_id>/outcome.json` alongside an
//! `outcome.digest` file and read back with integrity verification.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::Digest as _;
use uuid::Uuid;

use super::error::{CampaignError, Result};
use super::record::StageRecord;
use super::run::{RunId, RunOutcome, RunStatus};
use super::score::QualityScore;
use super::stage::{Stage, StagePayload};
use crate::collaborator::CollaboratorError;
use crate::contracts::FieldError;

/// Reference to an artifact the campaign depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub name: String,
    pub uri: String,
    pub kind: String,
    /// SHA-256 hex digest when the artifact content is held by the package.
    pub digest: Option<String>,
}

/// Manifest of every artifact referenced by a package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub entries: Vec<ArtifactRef>,
}

impl ArtifactManifest {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<&ArtifactRef> {
        self.entries.iter().find(|e| e.name == name)
    }
}

/// Final output of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignPackage {
    pub run_id: RunId,
    pub trace_id: Uuid,
    /// Every record appended during the run, in order.
    pub records: Vec<StageRecord>,
    pub manifest: ArtifactManifest,
    /// The accepted quality score.
    pub final_score: QualityScore,
    pub created_at: DateTime<Utc>,
}

impl CampaignPackage {
    /// Assemble a package from a run's records.
    ///
    /// Requires validated design, quality and delivery records, and the
    /// latest quality score must clear `threshold`.
    pub fn assemble(
        run_id: RunId,
        trace_id: Uuid,
        records: Vec<StageRecord>,
        threshold: f64,
    ) -> Result<Self> {
        let latest = |stage: Stage| records.iter().rev().find(|r| r.stage() == stage);

        let design = match latest(Stage::Design).map(StageRecord::payload) {
            Some(StagePayload::Design(design)) => design,
            _ => return Err(CampaignError::MissingRecord(Stage::Design)),
        };
        let final_score = match latest(Stage::Quality).map(StageRecord::payload) {
            Some(StagePayload::Quality(score)) => score.clone(),
            _ => return Err(CampaignError::MissingRecord(Stage::Quality)),
        };
        let delivery = latest(Stage::Delivery).ok_or(CampaignError::MissingRecord(Stage::Delivery))?;

        if !final_score.passes(threshold) {
            return Err(CampaignError::GateNotPassed {
                overall: final_score.overall,
                threshold,
            });
        }

        let html = match delivery.payload() {
            StagePayload::Delivery(output) => &output.html,
            _ => {
                return Err(CampaignError::PayloadMismatch {
                    expected: Stage::Delivery,
                    actual: delivery.payload().stage(),
                })
            }
        };

        let mut entries: Vec<ArtifactRef> = design
            .asset_manifest
            .iter()
            .map(|asset| ArtifactRef {
                name: asset.asset_id.clone(),
                uri: asset.url.clone(),
                kind: asset.kind.clone(),
                digest: None,
            })
            .collect();
        entries.push(ArtifactRef {
            name: "email.html".to_string(),
            uri: format!("record://{}/{}", Stage::Delivery, delivery.sequence()),
            kind: "html".to_string(),
            digest: Some(hex::encode(sha2::Sha256::digest(html.as_bytes()))),
        });

        Ok(Self {
            run_id,
            trace_id,
            records,
            manifest: ArtifactManifest { entries },
            final_score,
            created_at: Utc::now(),
        })
    }

    /// Compiled HTML of the delivered email.
    pub fn html(&self) -> Option<&str> {
        self.records.iter().rev().find_map(|r| match r.payload() {
            StagePayload::Delivery(output) => Some(output.html.as_str()),
            _ => None,
        })
    }
}

/// Outcome of publishing a completed package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PublicationStatus {
    NotConfigured,
    Published { urls: Vec<String> },
    Failed { error: String },
}

/// Failure taxonomy surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The campaign request itself failed its contract.
    InvalidRequest,
    /// A stage output failed its contract. Never retried.
    SchemaViolation,
    /// A collaborator failed permanently or exhausted its transient retries.
    PermanentCollaborator,
    /// The quality gate was not met within the iteration budget.
    QualityGateExhausted,
    /// The caller cancelled the run.
    Cancelled,
    /// The run task terminated without producing an outcome.
    Aborted,
}

impl FailureKind {
    pub fn name(&self) -> &'static str {
        match self {
            FailureKind::InvalidRequest => "invalid_request",
            FailureKind::SchemaViolation => "schema_violation",
            FailureKind::PermanentCollaborator => "permanent_collaborator",
            FailureKind::QualityGateExhausted => "quality_gate_exhausted",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One failed collaborator attempt, kept for failure reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptFailure {
    pub stage: Stage,
    /// Pipeline pass during which the attempt ran.
    pub iteration: u32,
    /// Transport attempt number within the stage execution (1-based).
    pub attempt: u32,
    pub error: CollaboratorError,
    pub at: DateTime<Utc>,
}

/// Structured description of why a run failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    pub run_id: RunId,
    pub trace_id: Uuid,
    pub kind: FailureKind,
    pub failed_stage: Option<Stage>,
    pub iteration: u32,
    /// Human-readable issues explaining the failure.
    pub issues: Vec<String>,
    pub validation_errors: Vec<FieldError>,
    /// The payload that violated its contract, if any.
    pub offending_payload: Option<serde_json::Value>,
    pub last_quality_score: Option<QualityScore>,
    /// Every quality score produced during the run, in order.
    pub quality_history: Vec<QualityScore>,
    pub stage_errors: Vec<AttemptFailure>,
    /// Records accepted before the failure (empty for cancelled runs).
    pub records: Vec<StageRecord>,
    pub failed_at: DateTime<Utc>,
}

impl FailureReport {
    /// Report for a run whose task died; built from its last published status.
    pub fn aborted(last: &RunStatus, reason: impl Into<String>) -> Self {
        Self {
            run_id: last.run_id,
            trace_id: Uuid::nil(),
            kind: FailureKind::Aborted,
            failed_stage: last.current_stage,
            iteration: last.iteration,
            issues: vec![reason.into()],
            validation_errors: Vec::new(),
            offending_payload: None,
            last_quality_score: last.last_quality_score.clone(),
            quality_history: last.last_quality_score.iter().cloned().collect(),
            stage_errors: Vec::new(),
            records: Vec::new(),
            failed_at: Utc::now(),
        }
    }

    /// One-line summary for logs and CLI output.
    pub fn summary(&self) -> String {
        let stage = self
            .failed_stage
            .map(|s| s.to_string())
            .unwrap_or_else(|| "init".to_string());
        match self.issues.first() {
            Some(first) => format!(
                "{} at {} (iteration {}): {}",
                self.kind, stage, self.iteration, first
            ),
            None => format!("{} at {} (iteration {})", self.kind, stage, self.iteration),
        }
    }
}

/// Persist `<dir>/<run_id>/outcome.json` and `<dir>/<run_id>/outcome.digest`.
pub fn write_outcome_artifact(outcome: &RunOutcome, dir: &Path) -> Result<PathBuf> {
    let run_dir = dir.join(outcome.run_id().to_string());
    std::fs::create_dir_all(&run_dir)?;

    let artifact_path = run_dir.join("outcome.json");
    let digest_path = run_dir.join("outcome.digest");
    let json = serde_json::to_vec_pretty(outcome)?;
    let digest = hex::encode(sha2::Sha256::digest(&json));

    std::fs::write(&artifact_path, &json)?;
    std::fs::write(&digest_path, digest.as_bytes())?;

    Ok(artifact_path)
}

/// Read and verify `<dir>/<run_id>/outcome.json` integrity.
///
/// Checks the file digest and every contained record's payload digest.
pub fn read_outcome_artifact(run_id: RunId, dir: &Path) -> Result<RunOutcome> {
    let run_dir = dir.join(run_id.to_string());
    let json = std::fs::read(run_dir.join("outcome.json"))?;
    let digest = std::fs::read_to_string(run_dir.join("outcome.digest"))?;

    let actual = hex::encode(sha2::Sha256::digest(&json));
    if digest.trim() != actual {
        return Err(CampaignError::DigestMismatch {
            expected: digest.trim().to_string(),
            actual,
        });
    }

    let outcome: RunOutcome = serde_json::from_slice(&json)?;
    let records = match &outcome {
        RunOutcome::Completed { package, .. } => &package.records,
        RunOutcome::Failed { report } => &report.records,
    };
    for record in records {
        record.verify()?;
    }
    Ok(outcome)
}
