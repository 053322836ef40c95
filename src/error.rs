use crate::embedding::{EmbeddingError, VectorIndexError};
use crate::ingest::ChunkError;
use crate::service::Resource;
use crate::storage::StorageError;
use crate::synthesis::ModelError;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for lexrag
#[derive(Error, Debug)]
pub enum LexragError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// Chunking window misconfigured
    #[error(transparent)]
    Chunking(#[from] ChunkError),

    /// Embedding model errors
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Vector index errors
    #[error("Vector index error: {0}")]
    VectorIndex(#[from] VectorIndexError),

    /// Persisted index / metadata errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Generative model client errors
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// One or more startup resources failed to load
    #[error("Service is not ready: missing {missing:?}")]
    NotReady { missing: Vec<Resource> },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for lexrag operations
pub type Result<T> = std::result::Result<T, LexragError>;
