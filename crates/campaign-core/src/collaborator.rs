//! Interfaces to the external collaborators driven by the pipeline.
//!
//! Every collaborator returns raw JSON; the pipeline never trusts it until the
//! schema validator has accepted it. Errors carry a [`CollaboratorErrorKind`]
//! that the stage executor uses to decide between retrying and failing.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{CampaignPackage, CampaignRequest, ContentDraft, DesignOutput, Tone};
use crate::retry::RetryInstruction;
use crate::scorer::AnalyzerSet;

/// Failure category reported by a collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollaboratorErrorKind {
    Timeout,
    RateLimited,
    Unavailable,
    Rejected,
    Internal,
}

impl CollaboratorErrorKind {
    /// Transient failures are retried at transport level.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CollaboratorErrorKind::Timeout
                | CollaboratorErrorKind::RateLimited
                | CollaboratorErrorKind::Unavailable
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            CollaboratorErrorKind::Timeout => "timeout",
            CollaboratorErrorKind::RateLimited => "rate_limited",
            CollaboratorErrorKind::Unavailable => "unavailable",
            CollaboratorErrorKind::Rejected => "rejected",
            CollaboratorErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for CollaboratorErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned by a collaborator call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct CollaboratorError {
    pub kind: CollaboratorErrorKind,
    pub message: String,
}

impl CollaboratorError {
    pub fn new(kind: CollaboratorErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(CollaboratorErrorKind::Timeout, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(CollaboratorErrorKind::RateLimited, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(CollaboratorErrorKind::Unavailable, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(CollaboratorErrorKind::Rejected, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(CollaboratorErrorKind::Internal, message)
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

pub type CollaboratorResult<T> = std::result::Result<T, CollaboratorError>;

/// Request sent to the content generator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentPrompt {
    /// Rendered natural-language instruction.
    pub instruction: String,
    pub request: Arc<CampaignRequest>,
    /// Present when the content stage is re-run after a quality retry.
    pub revision: Option<RetryInstruction>,
}

/// Constraints handed to the design renderer alongside the content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetRequirements {
    pub tone: Tone,
    pub language: String,
    pub design_reference: Option<String>,
    /// Corrections requested by the quality gate (empty on the first pass).
    pub corrections: Vec<String>,
    /// Markup from the previous design pass, when revising.
    pub prior_markup: Option<String>,
}

/// Content and design pair submitted to each analyzer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisArtifact {
    pub request: Arc<CampaignRequest>,
    pub content: ContentDraft,
    pub design: DesignOutput,
}

/// Locations where a package was published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publication {
    pub urls: Vec<String>,
}

/// Produces email copy: `{subject, preheader?, body, cta}`.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, prompt: &ContentPrompt) -> CollaboratorResult<Value>;
}

/// Produces email markup and its asset manifest.
#[async_trait]
pub trait DesignRenderer: Send + Sync {
    async fn render(
        &self,
        content: &ContentDraft,
        requirements: &AssetRequirements,
    ) -> CollaboratorResult<Value>;
}

/// Scores one quality dimension: `{score, issues[]}`.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, artifact: &AnalysisArtifact) -> CollaboratorResult<Value>;
}

/// Compiles markup source to `{html, text_fallback?, warnings?}`.
#[async_trait]
pub trait MarkupCompiler: Send + Sync {
    async fn compile(&self, markup_source: &str) -> CollaboratorResult<Value>;
}

/// Uploads a finished package.
#[async_trait]
pub trait ArtifactPublisher: Send + Sync {
    async fn publish(&self, package: &CampaignPackage) -> CollaboratorResult<Publication>;
}

/// The full set of collaborators one pipeline run needs.
#[derive(Clone)]
pub struct Collaborators {
    pub content: Arc<dyn ContentGenerator>,
    pub design: Arc<dyn DesignRenderer>,
    pub analyzers: AnalyzerSet,
    pub compiler: Arc<dyn MarkupCompiler>,
    pub publisher: Option<Arc<dyn ArtifactPublisher>>,
}

impl Collaborators {
    pub fn new(
        content: Arc<dyn ContentGenerator>,
        design: Arc<dyn DesignRenderer>,
        analyzers: AnalyzerSet,
        compiler: Arc<dyn MarkupCompiler>,
    ) -> Self {
        Self {
            content,
            design,
            analyzers,
            compiler,
            publisher: None,
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn ArtifactPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("publisher", &self.publisher.is_some())
            .finish_non_exhaustive()
    }
}
