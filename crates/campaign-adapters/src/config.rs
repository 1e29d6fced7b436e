//! Collaborator endpoint configuration.
//!
//! Loaded from a TOML file:
//!
//! ```toml
//! content_url = "https://llm.internal/content"
//! design_url = "https://llm.internal/design"
//! compiler_url = "https://mjml.internal/compile"
//! publisher_url = "https://cdn.internal/publish"   # optional
//! request_timeout_ms = 45000                        # optional
//!
//! [analyzers]
//! content_url = "https://qa.internal/content"
//! design_url = "https://qa.internal/design"
//! technical_url = "https://qa.internal/technical"
//! brand_url = "https://qa.internal/brand"
//! ```
//!
//! or from `CAMPAIGN_*` environment variables (see [`EndpointConfig::from_env`]).

use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AdapterError, Result};

/// One URL per quality dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalyzerEndpoints {
    pub content_url: String,
    pub design_url: String,
    pub technical_url: String,
    pub brand_url: String,
}

/// Where each collaborator lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointConfig {
    pub content_url: String,
    pub design_url: String,
    pub compiler_url: String,
    #[serde(default)]
    pub publisher_url: Option<String>,
    /// Bearer token sent with every request.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Client-side ceiling for a single HTTP exchange. The pipeline's own
    /// per-stage timeout still applies.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    pub analyzers: AnalyzerEndpoints,
}

impl EndpointConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| AdapterError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Read endpoints from the process environment.
    ///
    /// Required: `CAMPAIGN_CONTENT_URL`, `CAMPAIGN_DESIGN_URL`,
    /// `CAMPAIGN_COMPILER_URL`, `CAMPAIGN_ANALYZER_{CONTENT,DESIGN,TECHNICAL,BRAND}_URL`.
    /// Optional: `CAMPAIGN_PUBLISHER_URL`, `CAMPAIGN_API_KEY`,
    /// `CAMPAIGN_REQUEST_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) but with an injectable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| lookup(key).ok_or_else(|| AdapterError::MissingEnv(key.to_string()));

        let request_timeout_ms = match lookup("CAMPAIGN_REQUEST_TIMEOUT_MS") {
            Some(raw) => Some(raw.trim().parse::<u64>().map_err(|_| AdapterError::InvalidValue {
                key: "CAMPAIGN_REQUEST_TIMEOUT_MS".to_string(),
                value: raw,
            })?),
            None => None,
        };

        let config = Self {
            content_url: required("CAMPAIGN_CONTENT_URL")?,
            design_url: required("CAMPAIGN_DESIGN_URL")?,
            compiler_url: required("CAMPAIGN_COMPILER_URL")?,
            publisher_url: lookup("CAMPAIGN_PUBLISHER_URL"),
            api_key: lookup("CAMPAIGN_API_KEY"),
            request_timeout_ms,
            analyzers: AnalyzerEndpoints {
                content_url: required("CAMPAIGN_ANALYZER_CONTENT_URL")?,
                design_url: required("CAMPAIGN_ANALYZER_DESIGN_URL")?,
                technical_url: required("CAMPAIGN_ANALYZER_TECHNICAL_URL")?,
                brand_url: required("CAMPAIGN_ANALYZER_BRAND_URL")?,
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Every configured URL must be absolute http(s).
    pub fn validate(&self) -> Result<()> {
        let mut urls = vec![
            ("content_url", &self.content_url),
            ("design_url", &self.design_url),
            ("compiler_url", &self.compiler_url),
            ("analyzers.content_url", &self.analyzers.content_url),
            ("analyzers.design_url", &self.analyzers.design_url),
            ("analyzers.technical_url", &self.analyzers.technical_url),
            ("analyzers.brand_url", &self.analyzers.brand_url),
        ];
        if let Some(url) = &self.publisher_url {
            urls.push(("publisher_url", url));
        }

        for (field, url) in urls {
            if !is_endpoint_url(url) {
                return Err(AdapterError::InvalidUrl {
                    field: field.to_string(),
                    url: url.clone(),
                });
            }
        }
        Ok(())
    }
}

fn is_endpoint_url(raw: &str) -> bool {
    match Url::parse(raw) {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https")
                && url.host_str().is_some_and(|h| !h.is_empty())
        }
        Err(_) => false,
    }
}
