//! Domain-level error taxonomy for the campaign pipeline.

use super::run::RunId;
use super::stage::Stage;

/// Campaign domain errors.
#[derive(Debug, thiserror::Error)]
pub enum CampaignError {
    #[error("run not found: {0}")]
    RunNotFound(RunId),

    #[error("run {0} terminated without producing an outcome")]
    RunAborted(RunId),

    #[error("payload mismatch: expected {expected} payload, got {actual}")]
    PayloadMismatch { expected: Stage, actual: Stage },

    #[error("missing {0} record in workflow context")]
    MissingRecord(Stage),

    #[error("handoff out of order: {stage} requires a validated {requires} record")]
    HandoffOutOfOrder { stage: Stage, requires: Stage },

    #[error("iteration regression for {stage}: {iteration} after {previous}")]
    IterationRegression {
        stage: Stage,
        iteration: u32,
        previous: u32,
    },

    #[error("quality gate not passed: overall {overall:.2} below threshold {threshold:.2}")]
    GateNotPassed { overall: f64, threshold: f64 },

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for campaign domain operations.
pub type Result<T> = std::result::Result<T, CampaignError>;
