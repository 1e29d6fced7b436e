//! reqwest-backed collaborators.
//!
//! Every collaborator is a JSON `POST` to one endpoint. Transport outcomes
//! are mapped onto [`CollaboratorErrorKind`] so the pipeline's retry logic
//! can tell transient failures from permanent ones:
//!
//! | outcome                         | kind           |
//! |---------------------------------|----------------|
//! | client timeout, HTTP 408        | `timeout`      |
//! | HTTP 429                        | `rate_limited` |
//! | connect failure, HTTP 5xx       | `unavailable`  |
//! | other HTTP 4xx                  | `rejected`     |
//! | undecodable response body       | `internal`     |

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use campaign_core::{
    AnalysisArtifact, Analyzer, AnalyzerSet, ArtifactPublisher, AssetRequirements,
    CampaignPackage, CollaboratorError, CollaboratorResult, Collaborators, ContentDraft,
    ContentGenerator, ContentPrompt, DesignRenderer, MarkupCompiler, Publication,
};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::EndpointConfig;
use crate::error::Result;

/// Maximum response body excerpt carried in an error message.
const ERROR_BODY_CHARS: usize = 200;

/// Shared HTTP client plus credentials.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn new(api_key: Option<String>, request_timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("campaign-adapters/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = request_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            api_key,
        })
    }

    pub fn from_config(config: &EndpointConfig) -> Result<Self> {
        Self::new(
            config.api_key.clone(),
            config.request_timeout_ms.map(Duration::from_millis),
        )
    }

    /// POST `body` as JSON and decode a JSON response.
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> CollaboratorResult<Value> {
        let mut request = self.client.post(url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| classify_transport(url, &e))?;
        let status = response.status();
        debug!(url, status = status.as_u16(), "collaborator responded");

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(url, status, &text));
        }

        response.json::<Value>().await.map_err(|e| {
            if e.is_timeout() {
                classify_transport(url, &e)
            } else {
                CollaboratorError::internal(format!("{url}: undecodable response body: {e}"))
            }
        })
    }
}

/// Map a non-success HTTP status to a collaborator error.
pub fn classify_status(url: &str, status: StatusCode, body: &str) -> CollaboratorError {
    let excerpt: String = body.chars().take(ERROR_BODY_CHARS).collect();
    let message = if excerpt.is_empty() {
        format!("{url}: HTTP {status}")
    } else {
        format!("{url}: HTTP {status}: {excerpt}")
    };

    match status {
        StatusCode::REQUEST_TIMEOUT => CollaboratorError::timeout(message),
        StatusCode::TOO_MANY_REQUESTS => CollaboratorError::rate_limited(message),
        s if s.is_server_error() => CollaboratorError::unavailable(message),
        _ => CollaboratorError::rejected(message),
    }
}

fn classify_transport(url: &str, error: &reqwest::Error) -> CollaboratorError {
    if error.is_timeout() {
        CollaboratorError::timeout(format!("{url}: {error}"))
    } else if error.is_connect() || error.is_request() {
        CollaboratorError::unavailable(format!("{url}: {error}"))
    } else {
        CollaboratorError::internal(format!("{url}: {error}"))
    }
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Content generator service. Receives the full [`ContentPrompt`].
#[derive(Debug, Clone)]
pub struct HttpContentGenerator {
    transport: HttpTransport,
    url: String,
}

impl HttpContentGenerator {
    pub fn new(transport: HttpTransport, url: impl Into<String>) -> Self {
        Self {
            transport,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ContentGenerator for HttpContentGenerator {
    async fn generate(&self, prompt: &ContentPrompt) -> CollaboratorResult<Value> {
        self.transport.post_json(&self.url, prompt).await
    }
}

/// Design renderer service. Receives `{content, requirements}`.
#[derive(Debug, Clone)]
pub struct HttpDesignRenderer {
    transport: HttpTransport,
    url: String,
}

impl HttpDesignRenderer {
    pub fn new(transport: HttpTransport, url: impl Into<String>) -> Self {
        Self {
            transport,
            url: url.into(),
        }
    }
}

#[async_trait]
impl DesignRenderer for HttpDesignRenderer {
    async fn render(
        &self,
        content: &ContentDraft,
        requirements: &AssetRequirements,
    ) -> CollaboratorResult<Value> {
        let body = json!({ "content": content, "requirements": requirements });
        self.transport.post_json(&self.url, &body).await
    }
}

/// One quality analyzer. Receives the [`AnalysisArtifact`].
#[derive(Debug, Clone)]
pub struct HttpAnalyzer {
    transport: HttpTransport,
    url: String,
}

impl HttpAnalyzer {
    pub fn new(transport: HttpTransport, url: impl Into<String>) -> Self {
        Self {
            transport,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Analyzer for HttpAnalyzer {
    async fn analyze(&self, artifact: &AnalysisArtifact) -> CollaboratorResult<Value> {
        self.transport.post_json(&self.url, artifact).await
    }
}

/// Markup compiler service. Receives `{markup_source}`.
#[derive(Debug, Clone)]
pub struct HttpMarkupCompiler {
    transport: HttpTransport,
    url: String,
}

impl HttpMarkupCompiler {
    pub fn new(transport: HttpTransport, url: impl Into<String>) -> Self {
        Self {
            transport,
            url: url.into(),
        }
    }
}

#[async_trait]
impl MarkupCompiler for HttpMarkupCompiler {
    async fn compile(&self, markup_source: &str) -> CollaboratorResult<Value> {
        let body = json!({ "markup_source": markup_source });
        self.transport.post_json(&self.url, &body).await
    }
}

/// Artifact store. Receives the package, answers `{urls: [..]}`.
#[derive(Debug, Clone)]
pub struct HttpPublisher {
    transport: HttpTransport,
    url: String,
}

impl HttpPublisher {
    pub fn new(transport: HttpTransport, url: impl Into<String>) -> Self {
        Self {
            transport,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ArtifactPublisher for HttpPublisher {
    async fn publish(&self, package: &CampaignPackage) -> CollaboratorResult<Publication> {
        let response = self.transport.post_json(&self.url, package).await?;
        serde_json::from_value(response).map_err(|e| {
            CollaboratorError::internal(format!("{}: malformed publish response: {e}", self.url))
        })
    }
}

/// Wire every collaborator in `config` to one shared HTTP client.
pub fn build_collaborators(config: &EndpointConfig) -> Result<Collaborators> {
    config.validate()?;
    let transport = HttpTransport::from_config(config)?;
    let analyzer = |url: &str| -> Arc<dyn Analyzer> {
        Arc::new(HttpAnalyzer::new(transport.clone(), url))
    };

    let analyzers = AnalyzerSet::new(
        analyzer(&config.analyzers.content_url),
        analyzer(&config.analyzers.design_url),
        analyzer(&config.analyzers.technical_url),
        analyzer(&config.analyzers.brand_url),
    );
    let collaborators = Collaborators::new(
        Arc::new(HttpContentGenerator::new(transport.clone(), &config.content_url)),
        Arc::new(HttpDesignRenderer::new(transport.clone(), &config.design_url)),
        analyzers,
        Arc::new(HttpMarkupCompiler::new(transport.clone(), &config.compiler_url)),
    );

    Ok(match &config.publisher_url {
        Some(url) => collaborators.with_publisher(Arc::new(HttpPublisher::new(transport, url))),
        None => collaborators,
    })
}
