//! Run identity, pipeline state and terminal outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::report::{CampaignPackage, FailureReport, PublicationStatus};
use super::score::QualityScore;
use super::stage::Stage;

/// Unique identifier of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(RunId)
    }
}

/// States of the orchestrator state machine.
///
/// ```text
/// INIT → CONTENT → DESIGN → QUALITY → {RETRY_CONTENT | RETRY_DESIGN | DELIVERY} → DONE | FAILED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Init,
    Content,
    Design,
    Quality,
    RetryContent,
    RetryDesign,
    Delivery,
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    /// The stage actively executing in this state, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineState::Content | PipelineState::RetryContent => Some(Stage::Content),
            PipelineState::Design | PipelineState::RetryDesign => Some(Stage::Design),
            PipelineState::Quality => Some(Stage::Quality),
            PipelineState::Delivery => Some(Stage::Delivery),
            PipelineState::Init | PipelineState::Done | PipelineState::Failed => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PipelineState::Init => "INIT",
            PipelineState::Content => "CONTENT",
            PipelineState::Design => "DESIGN",
            PipelineState::Quality => "QUALITY",
            PipelineState::RetryContent => "RETRY_CONTENT",
            PipelineState::RetryDesign => "RETRY_DESIGN",
            PipelineState::Delivery => "DELIVERY",
            PipelineState::Done => "DONE",
            PipelineState::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Observable status of a run, published on every state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    pub run_id: RunId,
    pub state: PipelineState,
    pub current_stage: Option<Stage>,
    /// Current pipeline pass (1-based).
    pub iteration: u32,
    pub last_quality_score: Option<QualityScore>,
    pub updated_at: DateTime<Utc>,
}

impl RunStatus {
    pub fn initial(run_id: RunId) -> Self {
        Self {
            run_id,
            state: PipelineState::Init,
            current_stage: None,
            iteration: 1,
            last_quality_score: None,
            updated_at: Utc::now(),
        }
    }
}

/// Terminal outcome of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed {
        package: CampaignPackage,
        publication: PublicationStatus,
    },
    Failed {
        report: FailureReport,
    },
}

impl RunOutcome {
    pub fn run_id(&self) -> RunId {
        match self {
            RunOutcome::Completed { package, .. } => package.run_id,
            RunOutcome::Failed { report } => report.run_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. })
    }

    pub fn package(&self) -> Option<&CampaignPackage> {
        match self {
            RunOutcome::Completed { package, .. } => Some(package),
            RunOutcome::Failed { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<&FailureReport> {
        match self {
            RunOutcome::Completed { .. } => None,
            RunOutcome::Failed { report } => Some(report),
        }
    }
}
