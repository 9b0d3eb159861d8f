//! Configuration sections for the word-vector table and the tokenizers
//!
//! Both sections live in `config.toml` next to the network settings and can
//! be omitted entirely; every field has a default.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where the pre-trained table comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Text file on local disk
    Local,
    /// Text file fetched once from the Hugging Face hub
    Hub,
}

/// Word-vector table settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model identifier reported to clients
    pub id: String,
    /// Service name reported on `/`
    pub description: String,
    pub source: SourceKind,
    /// Local table path (GloVe text format), used when `source = "local"`
    pub path: String,
    /// Hub repository id, used when `source = "hub"`
    pub hub_repo: String,
    /// File inside the hub repository
    pub hub_filename: String,
    /// Expected vector dimensionality; 0 infers it from the first row
    pub dimension: usize,
    /// Whether table keys are lowercase, in which case queries are lowercased
    pub lowercase: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            id: "glove-wiki-gigaword-300".to_string(),
            description: "GloVe Word Embeddings API".to_string(),
            source: SourceKind::Local,
            path: "model_cache/glove.6B.300d.txt".to_string(),
            hub_repo: "stanfordnlp/glove".to_string(),
            hub_filename: "glove.6B.300d.txt".to_string(),
            dimension: 300,
            lowercase: true,
        }
    }
}

impl ModelConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::models::EmbeddingError> {
        if self.id.trim().is_empty() {
            return Err(crate::models::EmbeddingError::ConfigError {
                message: "model.id cannot be empty".to_string(),
            });
        }

        match self.source {
            SourceKind::Local if self.path.trim().is_empty() => {
                Err(crate::models::EmbeddingError::ConfigError {
                    message: "model.path is required for a local source".to_string(),
                })
            }
            SourceKind::Hub if self.hub_repo.is_empty() || self.hub_filename.is_empty() => {
                Err(crate::models::EmbeddingError::ConfigError {
                    message: "model.hub_repo and model.hub_filename are required for a hub source"
                        .to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Where one encoding's `tokenizer.json` comes from
///
/// The local `path` wins when the file exists; otherwise the file is fetched
/// from `hub_repo` into the Hugging Face cache.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EncodingSource {
    pub path: String,
    pub hub_repo: String,
    pub hub_filename: String,
}

impl EncodingSource {
    pub fn new(path: impl Into<String>, hub_repo: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            hub_repo: hub_repo.into(),
            ..Self::default()
        }
    }
}

impl Default for EncodingSource {
    fn default() -> Self {
        Self {
            path: String::new(),
            hub_repo: String::new(),
            hub_filename: "tokenizer.json".to_string(),
        }
    }
}

/// Tokenizer settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenizersConfig {
    /// Encoding used when the requested model is absent or unknown
    pub default_encoding: String,
    /// Encoding name -> `tokenizer.json` location
    pub encodings: BTreeMap<String, EncodingSource>,
    /// Model name -> encoding name
    pub models: BTreeMap<String, String>,
    /// Model name prefix -> encoding name, for dated model variants
    pub model_prefixes: BTreeMap<String, String>,
}

impl Default for TokenizersConfig {
    fn default() -> Self {
        let encodings = [
            (
                "cl100k_base".to_string(),
                EncodingSource::new("tokenizers/cl100k_base.json", "Xenova/gpt-4"),
            ),
            (
                "o200k_base".to_string(),
                EncodingSource::new("tokenizers/o200k_base.json", "Xenova/gpt-4o"),
            ),
        ];
        let models = [
            ("gpt-4o", "o200k_base"),
            ("gpt-4o-mini", "o200k_base"),
            ("gpt-4", "cl100k_base"),
            ("gpt-4-turbo", "cl100k_base"),
            ("gpt-3.5-turbo", "cl100k_base"),
            ("gpt-35-turbo", "cl100k_base"),
            ("text-embedding-ada-002", "cl100k_base"),
            ("text-embedding-3-small", "cl100k_base"),
            ("text-embedding-3-large", "cl100k_base"),
        ];
        let model_prefixes = [
            ("gpt-4o-", "o200k_base"),
            ("gpt-4-", "cl100k_base"),
            ("gpt-3.5-turbo-", "cl100k_base"),
            ("gpt-35-turbo-", "cl100k_base"),
        ];

        let to_map = |pairs: &[(&str, &str)]| {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>()
        };

        Self {
            default_encoding: "cl100k_base".to_string(),
            encodings: encodings.into_iter().collect(),
            models: to_map(&models),
            model_prefixes: to_map(&model_prefixes),
        }
    }
}

impl TokenizersConfig {
    /// Validate that every referenced encoding is declared
    pub fn validate(&self) -> Result<(), crate::models::EmbeddingError> {
        if !self.encodings.contains_key(&self.default_encoding) {
            return Err(crate::models::EmbeddingError::ConfigError {
                message: format!(
                    "Default encoding '{}' not found in tokenizers.encodings",
                    self.default_encoding
                ),
            });
        }

        for (encoding, source) in &self.encodings {
            if source.path.trim().is_empty() && source.hub_repo.trim().is_empty() {
                return Err(crate::models::EmbeddingError::ConfigError {
                    message: format!("Encoding '{}' needs a path or a hub_repo", encoding),
                });
            }
            if !source.hub_repo.is_empty() && source.hub_filename.trim().is_empty() {
                return Err(crate::models::EmbeddingError::ConfigError {
                    message: format!("Encoding '{}' has an empty hub_filename", encoding),
                });
            }
        }

        for (model, encoding) in self.models.iter().chain(self.model_prefixes.iter()) {
            if !self.encodings.contains_key(encoding) {
                return Err(crate::models::EmbeddingError::ConfigError {
                    message: format!("Model '{}' references unknown encoding '{}'", model, encoding),
                });
            }
        }

        Ok(())
    }
}
