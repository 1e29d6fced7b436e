//! HTTP collaborator adapters for the campaign pipeline.
//!
//! Implements the `campaign-core` collaborator traits as JSON-over-HTTP
//! clients and wires them from an [`EndpointConfig`].

pub mod config;
pub mod error;
pub mod http;

pub use config::{AnalyzerEndpoints, EndpointConfig};
pub use error::{AdapterError, Result};
pub use http::{
    build_collaborators, classify_status, HttpAnalyzer, HttpContentGenerator,
    HttpDesignRenderer, HttpMarkupCompiler, HttpPublisher, HttpTransport,
};
