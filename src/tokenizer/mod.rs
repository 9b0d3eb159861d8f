//! Tokenizer registry
//!
//! Maps model names to encodings and delegates the actual tokenization to
//! Hugging Face `tokenizer.json` files loaded at startup, from disk when the
//! configured file exists and from the hub cache otherwise. Encoders carry no
//! state between calls: the same text always produces the same tokens for a
//! given tokenizer file.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use crate::models::config::{EncodingSource, TokenizersConfig};
use crate::models::{EmbeddingError, EmbeddingResult};

/// Token ids and their per-id surface strings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenEncoding {
    pub ids: Vec<u32>,
    pub tokens: Vec<String>,
}

/// Narrow capability over an external tokenizer
pub trait TextEncoder: Send + Sync {
    fn encode(&self, text: &str) -> EmbeddingResult<TokenEncoding>;
}

/// Encoder backed by the `tokenizers` crate
pub struct HfTextEncoder {
    encoding: String,
    tokenizer: Tokenizer,
}

impl HfTextEncoder {
    /// Load a `tokenizer.json` file
    pub fn from_file(encoding: impl Into<String>, path: impl AsRef<Path>) -> EmbeddingResult<Self> {
        let encoding = encoding.into();
        let path = path.as_ref();
        let tokenizer = Tokenizer::from_file(path).map_err(|e| EmbeddingError::ConfigError {
            message: format!(
                "Failed to load tokenizer '{}' from {}: {}",
                encoding,
                path.display(),
                e
            ),
        })?;
        Ok(Self { encoding, tokenizer })
    }

    /// Build from an in-memory `tokenizer.json` document
    pub fn from_json(encoding: impl Into<String>, json: &str) -> EmbeddingResult<Self> {
        let encoding = encoding.into();
        let tokenizer = Tokenizer::from_str(json).map_err(|e| EmbeddingError::ConfigError {
            message: format!("Invalid tokenizer '{}': {}", encoding, e),
        })?;
        Ok(Self { encoding, tokenizer })
    }

    fn failure(&self, error: impl std::fmt::Display) -> EmbeddingError {
        EmbeddingError::TokenizationFailed {
            encoding: self.encoding.clone(),
            error: error.to_string(),
        }
    }
}

impl TextEncoder for HfTextEncoder {
    fn encode(&self, text: &str) -> EmbeddingResult<TokenEncoding> {
        let encoding = self.tokenizer.encode(text, false).map_err(|e| self.failure(e))?;
        let ids = encoding.get_ids().to_vec();

        let tokens = ids
            .iter()
            .map(|id| self.tokenizer.decode(&[*id], false).map_err(|e| self.failure(e)))
            .collect::<EmbeddingResult<Vec<_>>>()?;

        Ok(TokenEncoding { ids, tokens })
    }
}

/// Result of a tokenize call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tokenized {
    /// Encoding actually used
    pub encoding: String,
    pub ids: Vec<u32>,
    pub tokens: Vec<String>,
}

impl Tokenized {
    pub fn token_count(&self) -> usize {
        self.ids.len()
    }
}

/// Model name -> encoding -> encoder
pub struct TokenizerRegistry {
    default_encoding: String,
    encoders: HashMap<String, Arc<dyn TextEncoder>>,
    models: BTreeMap<String, String>,
    model_prefixes: BTreeMap<String, String>,
}

impl TokenizerRegistry {
    /// Registry with no encoders and no model names
    pub fn new(default_encoding: impl Into<String>) -> Self {
        Self {
            default_encoding: default_encoding.into(),
            encoders: HashMap::new(),
            models: BTreeMap::new(),
            model_prefixes: BTreeMap::new(),
        }
    }

    /// Load every configured encoding; encodings that fail to load are skipped
    pub async fn from_config(config: &TokenizersConfig) -> Self {
        let mut registry = Self::new(config.default_encoding.clone());
        registry.models = config.models.clone();
        registry.model_prefixes = config.model_prefixes.clone();

        for (encoding, source) in &config.encodings {
            match load_encoder(encoding, source).await {
                Ok(encoder) => {
                    registry.encoders.insert(encoding.clone(), Arc::new(encoder));
                }
                Err(e) => warn!("⚠️  {}", e),
            }
        }

        if !registry.encoders.contains_key(&registry.default_encoding) {
            warn!(
                "⚠️  Default encoding '{}' is not available, tokenization of unknown models will fail",
                registry.default_encoding
            );
        }

        registry
    }

    /// Register an encoder under an encoding name
    pub fn with_encoder(mut self, encoding: impl Into<String>, encoder: Arc<dyn TextEncoder>) -> Self {
        self.encoders.insert(encoding.into(), encoder);
        self
    }

    /// Map a model name to an encoding name
    pub fn with_model(mut self, model: impl Into<String>, encoding: impl Into<String>) -> Self {
        self.models.insert(model.into(), encoding.into());
        self
    }

    /// Map a model name prefix to an encoding name
    pub fn with_model_prefix(mut self, prefix: impl Into<String>, encoding: impl Into<String>) -> Self {
        self.model_prefixes.insert(prefix.into(), encoding.into());
        self
    }

    pub fn default_encoding(&self) -> &str {
        &self.default_encoding
    }

    /// Sorted, de-duplicated model names
    pub fn available_models(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    /// Encoding used for a model; unknown or absent models get the default
    ///
    /// Exact names win over prefixes, and the longest matching prefix wins.
    pub fn resolve_encoding(&self, model: Option<&str>) -> &str {
        let model = match model.map(str::trim).filter(|m| !m.is_empty()) {
            Some(model) => model,
            None => return &self.default_encoding,
        };

        if let Some(encoding) = self.models.get(model) {
            return encoding;
        }

        self.model_prefixes
            .iter()
            .filter(|(prefix, _)| model.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, encoding)| encoding.as_str())
            .unwrap_or_else(|| {
                debug!("Unknown tokenizer model '{}', using default encoding", model);
                self.default_encoding.as_str()
            })
    }

    /// Tokenize text with the encoding for `model`
    pub fn tokenize(&self, text: &str, model: Option<&str>) -> EmbeddingResult<Tokenized> {
        let encoding = self.resolve_encoding(model);
        let encoder = self
            .encoders
            .get(encoding)
            .ok_or_else(|| EmbeddingError::TokenizerUnavailable {
                encoding: encoding.to_string(),
            })?;

        let TokenEncoding { ids, tokens } = encoder.encode(text)?;
        Ok(Tokenized {
            encoding: encoding.to_string(),
            ids,
            tokens,
        })
    }
}

async fn load_encoder(encoding: &str, source: &EncodingSource) -> EmbeddingResult<HfTextEncoder> {
    if !source.path.is_empty() && Path::new(&source.path).is_file() {
        let encoder = HfTextEncoder::from_file(encoding, &source.path)?;
        info!("🔤 Loaded tokenizer '{}' from {}", encoding, source.path);
        return Ok(encoder);
    }

    if source.hub_repo.is_empty() {
        return Err(EmbeddingError::ConfigError {
            message: format!(
                "Tokenizer '{}' not found at '{}' and no hub_repo is configured",
                encoding, source.path
            ),
        });
    }

    let path = fetch_from_hub(source).await?;
    let encoder = HfTextEncoder::from_file(encoding, &path)?;
    info!(
        "🔤 Loaded tokenizer '{}' from hf://{}/{}",
        encoding, source.hub_repo, source.hub_filename
    );
    Ok(encoder)
}

#[cfg(feature = "hub")]
async fn fetch_from_hub(source: &EncodingSource) -> EmbeddingResult<std::path::PathBuf> {
    let api = hf_hub::api::tokio::Api::new().map_err(|e| EmbeddingError::ConfigError {
        message: format!("HF Hub API error: {}", e),
    })?;
    api.model(source.hub_repo.clone())
        .get(&source.hub_filename)
        .await
        .map_err(|e| EmbeddingError::ConfigError {
            message: format!(
                "Failed to download {} from {}: {}",
                source.hub_filename, source.hub_repo, e
            ),
        })
}

#[cfg(not(feature = "hub"))]
async fn fetch_from_hub(source: &EncodingSource) -> EmbeddingResult<std::path::PathBuf> {
    Err(EmbeddingError::ConfigError {
        message: format!(
            "Tokenizer repo '{}' requires the `hub` feature",
            source.hub_repo
        ),
    })
}
