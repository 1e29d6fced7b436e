//! Error types for campaign-adapters

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while configuring HTTP collaborators.
///
/// Failures of individual collaborator calls are reported as
/// [`campaign_core::CollaboratorError`] instead, so the executor can classify
/// them as transient or permanent.
#[derive(Error, Debug)]
pub enum AdapterError {
    /// Endpoint file could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Endpoint file is not valid TOML
    #[error("invalid endpoint configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Required environment variable is unset
    #[error("environment variable {0} is not set")]
    MissingEnv(String),

    /// Endpoint is not an absolute http(s) URL
    #[error("{field} is not an http(s) URL: {url}")]
    InvalidUrl { field: String, url: String },

    /// Environment variable holds an unusable value
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    /// HTTP client could not be constructed
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Result type for adapter setup.
pub type Result<T> = std::result::Result<T, AdapterError>;
