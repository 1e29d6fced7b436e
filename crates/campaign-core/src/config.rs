//! Pipeline configuration.
//!
//! Loaded from TOML. Every key is optional and falls back to its default:
//!
//! ```toml
//! [quality]
//! threshold = 70.0
//! max_iterations = 3
//!
//! [transport]
//! timeout_ms = 30000
//! max_retries = 2
//! backoff_base_ms = 1000
//! backoff_factor = 2
//!
//! [timeouts]
//! design_ms = 45000
//! analyzer_ms = 10000
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::Stage;
use crate::executor::TransportPolicy;
use crate::retry::RetryPolicy;

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Per-stage timeout overrides (milliseconds). Unset stages use
/// `transport.timeout_ms`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StageTimeouts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub design_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_ms: Option<u64>,
    /// Bound on each analyzer call during the quality stage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyzer_ms: Option<u64>,
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub quality: RetryPolicy,
    pub transport: TransportPolicy,
    pub timeouts: StageTimeouts,
}

impl PipelineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.quality.threshold;
        if !threshold.is_finite() || !(0.0..=100.0).contains(&threshold) {
            return Err(ConfigError::Invalid(format!(
                "quality.threshold must be within 0..=100, got {threshold}"
            )));
        }
        if self.quality.max_iterations == 0 {
            return Err(ConfigError::Invalid(
                "quality.max_iterations must be at least 1".into(),
            ));
        }
        if self.transport.backoff_factor == 0 {
            return Err(ConfigError::Invalid(
                "transport.backoff_factor must be at least 1".into(),
            ));
        }

        let timeouts = [
            ("transport.timeout_ms", Some(self.transport.timeout_ms)),
            ("timeouts.content_ms", self.timeouts.content_ms),
            ("timeouts.design_ms", self.timeouts.design_ms),
            ("timeouts.delivery_ms", self.timeouts.delivery_ms),
            ("timeouts.analyzer_ms", self.timeouts.analyzer_ms),
        ];
        for (key, value) in timeouts {
            if value == Some(0) {
                return Err(ConfigError::Invalid(format!("{key} must be greater than 0")));
            }
        }
        Ok(())
    }

    /// Transport controls for a stage's collaborator call.
    ///
    /// Quality uses the analyzer timeout since it only calls analyzers.
    pub fn policy_for(&self, stage: Stage) -> TransportPolicy {
        let timeout = match stage {
            Stage::Content => self.timeouts.content_ms,
            Stage::Design => self.timeouts.design_ms,
            Stage::Quality => self.timeouts.analyzer_ms,
            Stage::Delivery => self.timeouts.delivery_ms,
        };
        match timeout {
            Some(ms) => self.transport.clone().with_timeout_ms(ms),
            None => self.transport.clone(),
        }
    }

    pub fn analyzer_policy(&self) -> TransportPolicy {
        self.policy_for(Stage::Quality)
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.quality
    }
}
