//! Error types for longrecall.

use thiserror::Error;

/// Result type for longrecall operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for longrecall operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Invalid or conflicting command-line arguments.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration loading or validation failed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Question set loading/parsing error.
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Pre-check gate rejected the question set.
    #[error("Pre-check failed: {0}")]
    Precheck(String),

    /// Tokenizer initialization or decode error.
    #[error("Tokenizer error: {0}")]
    Tokenize(String),

    /// Context assembly failed for a single assignment.
    #[error("Context build failed: {0}")]
    ContextBuild(String),

    /// The source document cannot supply the requested context length.
    #[error("Insufficient source material: {0}")]
    InsufficientSource(String),

    /// Prompt template loading or rendering error.
    #[error("Template error: {0}")]
    Template(String),

    /// Model endpoint returned an unrecoverable error.
    #[error("Model API error: {0}")]
    Api(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create an invalid-argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a dataset error.
    pub fn dataset(msg: impl Into<String>) -> Self {
        Error::Dataset(msg.into())
    }

    /// Create a pre-check error.
    pub fn precheck(msg: impl Into<String>) -> Self {
        Error::Precheck(msg.into())
    }

    /// Create a tokenizer error.
    pub fn tokenize(msg: impl Into<String>) -> Self {
        Error::Tokenize(msg.into())
    }

    /// Create a context-build error.
    pub fn context_build(msg: impl Into<String>) -> Self {
        Error::ContextBuild(msg.into())
    }

    /// Create an insufficient-source error.
    pub fn insufficient_source(msg: impl Into<String>) -> Self {
        Error::InsufficientSource(msg.into())
    }

    /// Create a template error.
    pub fn template(msg: impl Into<String>) -> Self {
        Error::Template(msg.into())
    }

    /// Create a model API error.
    pub fn api(msg: impl Into<String>) -> Self {
        Error::Api(msg.into())
    }
}
