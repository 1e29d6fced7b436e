//! Campaign Pipeline Core Library
//!
//! Quality-gated orchestration of marketing email generation: schema
//! validated stage handoffs, weighted quality scoring with bounded retry
//! loops, and per-run workflow contexts driven by an explicit state machine.

pub mod collaborator;
pub mod config;
pub mod context;
pub mod contracts;
pub mod domain;
pub mod executor;
pub mod fakes;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod retry;
pub mod scorer;
pub mod service;
pub mod telemetry;

pub use collaborator::{
    AnalysisArtifact, Analyzer, ArtifactPublisher, AssetRequirements, CollaboratorError,
    CollaboratorErrorKind, CollaboratorResult, Collaborators, ContentGenerator, ContentPrompt,
    DesignRenderer, MarkupCompiler, Publication,
};

pub use config::{ConfigError, PipelineConfig, StageTimeouts};

pub use context::WorkflowContext;

pub use contracts::{
    accept, validate, validate_request, AcceptedPayload, FieldError, ValidationResult,
    CONTRACT_VERSION,
};

pub use domain::{
    read_outcome_artifact, write_outcome_artifact, ArtifactManifest, ArtifactRef,
    AttemptFailure, CampaignError, CampaignPackage, CampaignRequest, ContentDraft,
    DeliveryOutput, DesignOutput, Dimension, FailureKind, FailureReport, PipelineState,
    PublicationStatus, QualityIssue, QualityScore, Result, RunId, RunOutcome, RunStatus,
    Severity, Stage, StagePayload, StageRecord, Tone,
};

pub use executor::{
    call_with_controls, cancel_pair, CancelHandle, CancelSignal, StageError, StageExecutor,
    TransportPolicy,
};

pub use orchestrator::Orchestrator;

pub use retry::{decide, RetryDecision, RetryInstruction, RetryPolicy, RetryState};

pub use scorer::{AnalyzerSet, QualityScorer};

pub use service::CampaignService;
