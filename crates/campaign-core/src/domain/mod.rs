//! Domain models for the campaign pipeline.
//!
//! Canonical definitions for the core entities:
//! - `CampaignRequest`: Immutable input brief for one run
//! - `StagePayload`: Closed, typed output of each pipeline stage
//! - `StageRecord`: A validated, digest-stamped stage output
//! - `QualityScore`: Weighted four-dimension quality assessment
//! - `CampaignPackage` / `FailureReport`: Terminal run outcomes

pub mod error;
pub mod record;
pub mod report;
pub mod request;
pub mod run;
pub mod score;
pub mod stage;

// Re-export main types and errors
pub use error::{CampaignError, Result};
pub use record::StageRecord;
pub use report::{
    read_outcome_artifact, write_outcome_artifact, ArtifactManifest, ArtifactRef,
    AttemptFailure, CampaignPackage, FailureKind, FailureReport, PublicationStatus,
};
pub use request::{CampaignRequest, Tone};
pub use run::{PipelineState, RunId, RunOutcome, RunStatus};
pub use score::{
    weighted_overall, Dimension, QualityIssue, QualityScore, Severity, SCORE_EPSILON,
};
pub use stage::{
    AssetRef, CallToAction, ContentDraft, DeliveryOutput, DesignOutput, Stage, StagePayload,
};
