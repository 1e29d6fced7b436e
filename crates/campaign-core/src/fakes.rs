//! In-memory scripted collaborators (testing only).
//!
//! Each fake plays back a script of [`Scripted`] steps, one per call. Once
//! the script runs out, the last step repeats. Calls and inputs are recorded
//! so tests can assert on what the pipeline sent.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::collaborator::{
    AnalysisArtifact, Analyzer, ArtifactPublisher, AssetRequirements, CollaboratorError,
    CollaboratorResult, Collaborators, ContentGenerator, ContentPrompt, DesignRenderer,
    MarkupCompiler, Publication,
};
use crate::domain::{CampaignPackage, CampaignRequest, ContentDraft, RunId, Severity, Tone};
use crate::scorer::AnalyzerSet;

/// One scripted collaborator response.
#[derive(Debug, Clone)]
pub enum Scripted {
    Respond(Value),
    Fail(CollaboratorError),
    /// Never resolves; exercises timeouts and cancellation.
    Hang,
    /// Panics inside the collaborator call.
    Panic(&'static str),
}

#[derive(Debug, Default)]
struct Script {
    steps: Vec<Scripted>,
    calls: AtomicUsize,
}

impl Script {
    fn new(steps: Vec<Scripted>) -> Self {
        Self {
            steps,
            calls: AtomicUsize::new(0),
        }
    }

    async fn play(&self) -> CollaboratorResult<Value> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let step = match self.steps.len() {
            0 => None,
            len => self.steps.get(n.min(len - 1)).cloned(),
        };
        match step {
            Some(Scripted::Respond(value)) => Ok(value),
            Some(Scripted::Fail(error)) => Err(error),
            Some(Scripted::Hang) => std::future::pending().await,
            Some(Scripted::Panic(message)) => panic!("{message}"),
            None => Err(CollaboratorError::internal("empty script")),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// ScriptedContentGenerator
// ---------------------------------------------------------------------------

/// Content generator that records every prompt it receives.
#[derive(Debug, Default)]
pub struct ScriptedContentGenerator {
    script: Script,
    prompts: Mutex<Vec<ContentPrompt>>,
}

impl ScriptedContentGenerator {
    pub fn new(steps: Vec<Scripted>) -> Self {
        Self {
            script: Script::new(steps),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn always(value: Value) -> Self {
        Self::new(vec![Scripted::Respond(value)])
    }

    pub fn calls(&self) -> usize {
        self.script.calls()
    }

    pub fn prompts(&self) -> Vec<ContentPrompt> {
        lock(&self.prompts).clone()
    }
}

#[async_trait]
impl ContentGenerator for ScriptedContentGenerator {
    async fn generate(&self, prompt: &ContentPrompt) -> CollaboratorResult<Value> {
        lock(&self.prompts).push(prompt.clone());
        self.script.play().await
    }
}

// ---------------------------------------------------------------------------
// ScriptedDesignRenderer
// ---------------------------------------------------------------------------

/// Design renderer that records the requirements it was given.
#[derive(Debug, Default)]
pub struct ScriptedDesignRenderer {
    script: Script,
    requirements: Mutex<Vec<AssetRequirements>>,
}

impl ScriptedDesignRenderer {
    pub fn new(steps: Vec<Scripted>) -> Self {
        Self {
            script: Script::new(steps),
            requirements: Mutex::new(Vec::new()),
        }
    }

    pub fn always(value: Value) -> Self {
        Self::new(vec![Scripted::Respond(value)])
    }

    pub fn calls(&self) -> usize {
        self.script.calls()
    }

    pub fn requirements(&self) -> Vec<AssetRequirements> {
        lock(&self.requirements).clone()
    }
}

#[async_trait]
impl DesignRenderer for ScriptedDesignRenderer {
    async fn render(
        &self,
        _content: &ContentDraft,
        requirements: &AssetRequirements,
    ) -> CollaboratorResult<Value> {
        lock(&self.requirements).push(requirements.clone());
        self.script.play().await
    }
}

// ---------------------------------------------------------------------------
// ScriptedAnalyzer
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ScriptedAnalyzer {
    script: Script,
}

impl ScriptedAnalyzer {
    pub fn new(steps: Vec<Scripted>) -> Self {
        Self {
            script: Script::new(steps),
        }
    }

    /// Issue-free reports with the given scores, one per call.
    pub fn scores(scores: &[f64]) -> Self {
        Self::new(
            scores
                .iter()
                .map(|s| Scripted::Respond(analyzer_report(*s, &[])))
                .collect(),
        )
    }

    pub fn calls(&self) -> usize {
        self.script.calls()
    }
}

#[async_trait]
impl Analyzer for ScriptedAnalyzer {
    async fn analyze(&self, _artifact: &AnalysisArtifact) -> CollaboratorResult<Value> {
        self.script.play().await
    }
}

/// Four scripted analyzers, content / design / technical / brand.
#[derive(Debug, Clone)]
pub struct ScriptedAnalyzers {
    pub content: Arc<ScriptedAnalyzer>,
    pub design: Arc<ScriptedAnalyzer>,
    pub technical: Arc<ScriptedAnalyzer>,
    pub brand: Arc<ScriptedAnalyzer>,
}

impl ScriptedAnalyzers {
    pub fn new(
        content: ScriptedAnalyzer,
        design: ScriptedAnalyzer,
        technical: ScriptedAnalyzer,
        brand: ScriptedAnalyzer,
    ) -> Self {
        Self {
            content: Arc::new(content),
            design: Arc::new(design),
            technical: Arc::new(technical),
            brand: Arc::new(brand),
        }
    }

    /// Every analyzer reports the same score sequence, so each pass's
    /// overall equals that pass's score.
    pub fn uniform(scores: &[f64]) -> Self {
        Self::new(
            ScriptedAnalyzer::scores(scores),
            ScriptedAnalyzer::scores(scores),
            ScriptedAnalyzer::scores(scores),
            ScriptedAnalyzer::scores(scores),
        )
    }

    pub fn set(&self) -> AnalyzerSet {
        AnalyzerSet::new(
            self.content.clone(),
            self.design.clone(),
            self.technical.clone(),
            self.brand.clone(),
        )
    }
}

// ---------------------------------------------------------------------------
// ScriptedCompiler
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ScriptedCompiler {
    script: Script,
    sources: Mutex<Vec<String>>,
}

impl ScriptedCompiler {
    pub fn new(steps: Vec<Scripted>) -> Self {
        Self {
            script: Script::new(steps),
            sources: Mutex::new(Vec::new()),
        }
    }

    pub fn always(value: Value) -> Self {
        Self::new(vec![Scripted::Respond(value)])
    }

    pub fn calls(&self) -> usize {
        self.script.calls()
    }

    pub fn sources(&self) -> Vec<String> {
        lock(&self.sources).clone()
    }
}

#[async_trait]
impl MarkupCompiler for ScriptedCompiler {
    async fn compile(&self, markup_source: &str) -> CollaboratorResult<Value> {
        lock(&self.sources).push(markup_source.to_string());
        self.script.play().await
    }
}

// ---------------------------------------------------------------------------
// RecordingPublisher
// ---------------------------------------------------------------------------

/// Publisher that records which runs it published.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    failure: Option<CollaboratorError>,
    published: Mutex<Vec<RunId>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(error: CollaboratorError) -> Self {
        Self {
            failure: Some(error),
            published: Mutex::new(Vec::new()),
        }
    }

    pub fn published(&self) -> Vec<RunId> {
        lock(&self.published).clone()
    }
}

#[async_trait]
impl ArtifactPublisher for RecordingPublisher {
    async fn publish(&self, package: &CampaignPackage) -> CollaboratorResult<Publication> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        lock(&self.published).push(package.run_id);
        Ok(Publication {
            urls: vec![format!("https://campaigns.example.com/{}/email.html", package.run_id)],
        })
    }
}

// ---------------------------------------------------------------------------
// Fixture set
// ---------------------------------------------------------------------------

/// Scripted collaborators with handles kept for assertions.
#[derive(Debug, Clone)]
pub struct FakeCollaborators {
    pub content: Arc<ScriptedContentGenerator>,
    pub design: Arc<ScriptedDesignRenderer>,
    pub analyzers: ScriptedAnalyzers,
    pub compiler: Arc<ScriptedCompiler>,
    pub publisher: Option<Arc<RecordingPublisher>>,
}

impl FakeCollaborators {
    /// Valid sample outputs everywhere, analyzers scoring `scores` per pass.
    pub fn happy_path(scores: &[f64]) -> Self {
        Self {
            content: Arc::new(ScriptedContentGenerator::always(sample_content())),
            design: Arc::new(ScriptedDesignRenderer::always(sample_design())),
            analyzers: ScriptedAnalyzers::uniform(scores),
            compiler: Arc::new(ScriptedCompiler::always(sample_delivery())),
            publisher: None,
        }
    }

    pub fn with_content(mut self, content: ScriptedContentGenerator) -> Self {
        self.content = Arc::new(content);
        self
    }

    pub fn with_design(mut self, design: ScriptedDesignRenderer) -> Self {
        self.design = Arc::new(design);
        self
    }

    pub fn with_analyzers(mut self, analyzers: ScriptedAnalyzers) -> Self {
        self.analyzers = analyzers;
        self
    }

    pub fn with_compiler(mut self, compiler: ScriptedCompiler) -> Self {
        self.compiler = Arc::new(compiler);
        self
    }

    pub fn with_publisher(mut self, publisher: RecordingPublisher) -> Self {
        self.publisher = Some(Arc::new(publisher));
        self
    }

    pub fn collaborators(&self) -> Collaborators {
        let collaborators = Collaborators::new(
            self.content.clone(),
            self.design.clone(),
            self.analyzers.set(),
            self.compiler.clone(),
        );
        match &self.publisher {
            Some(publisher) => collaborators.with_publisher(publisher.clone()),
            None => collaborators,
        }
    }
}

// ---------------------------------------------------------------------------
// Sample payloads
// ---------------------------------------------------------------------------

pub fn sample_request() -> CampaignRequest {
    CampaignRequest::new(
        "Announce our spring collection with 20% off for returning customers",
        "returning-customers",
        Tone::Friendly,
        "en-US",
    )
}

pub fn sample_content() -> Value {
    json!({
        "subject": "Spring is here: 20% off for you",
        "preheader": "A thank-you for coming back",
        "body": "Our new spring collection just landed. As a returning customer you get 20% off.",
        "cta": { "text": "Shop the collection", "url": "https://shop.example.com/spring" }
    })
}

pub fn sample_design() -> Value {
    json!({
        "markup_source": "<mjml><mj-body><mj-section><mj-column><mj-text>Spring</mj-text></mj-column></mj-section></mj-body></mjml>",
        "asset_manifest": [
            { "asset_id": "hero", "url": "https://cdn.example.com/spring/hero.jpg", "kind": "image" },
            { "asset_id": "logo", "url": "https://cdn.example.com/brand/logo.png", "kind": "logo" }
        ]
    })
}

pub fn sample_delivery() -> Value {
    json!({
        "html": "<!doctype html><html><body><p>Spring</p></body></html>",
        "text_fallback": "Spring",
        "warnings": []
    })
}

/// Analyzer response `{score, issues}` with `(severity, message)` issues.
pub fn analyzer_report(score: f64, issues: &[(Severity, &str)]) -> Value {
    let issues: Vec<Value> = issues
        .iter()
        .map(|(severity, message)| json!({ "severity": severity.name(), "message": message }))
        .collect();
    json!({ "score": score, "issues": issues })
}
