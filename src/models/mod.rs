//! Word-vector model: table storage, loading, similarity and the query façade.

pub mod config;
pub mod loader;
pub mod manager;
pub mod similarity;
pub mod source;
pub mod table;

// Re-exports
pub use config::{EncodingSource, ModelConfig, SourceKind, TokenizersConfig};
pub use loader::{LoadState, ModelLoader};
pub use manager::{WordLookup, WordVectorsManager};
pub use similarity::SimilarWord;
pub use source::{GloveFileSource, TableSource};
pub use table::{EmbeddingTable, VectorLookup};

use serde::{Deserialize, Serialize};

/// Embedding vector type
pub type Embedding = Vec<f32>;

/// Result type for word-vector operations
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Errors that can occur in word-vector operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Model is still loading")]
    NotReady,

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Model load failed: {error}")]
    ModelLoadFailed { error: String },

    #[error("Tokenizer '{encoding}' unavailable")]
    TokenizerUnavailable { encoding: String },

    #[error("Tokenization failed: {encoding} - {error}")]
    TokenizationFailed { encoding: String, error: String },

    #[error("IO error: {error}")]
    IoError { error: std::io::Error },

    #[error("TOML parsing error: {error}")]
    TomlError { error: toml::de::Error },
}

impl EmbeddingError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        EmbeddingError::InvalidInput { message: message.into() }
    }
}

impl From<std::io::Error> for EmbeddingError {
    fn from(error: std::io::Error) -> Self {
        EmbeddingError::IoError { error }
    }
}

impl From<toml::de::Error> for EmbeddingError {
    fn from(error: toml::de::Error) -> Self {
        EmbeddingError::TomlError { error }
    }
}

/// Static description of the served model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier, e.g. `glove-wiki-gigaword-300`
    pub id: String,
    /// Human readable service name
    pub description: String,
    /// Vector dimensionality
    pub dimension: usize,
    /// Number of words, known once the table is loaded
    pub vocabulary_size: Option<usize>,
    /// Current load state
    pub state: LoadState,
}
