//! Word Vectors Manager
//!
//! The query façade over the loaded table and the tokenizer registry. Every
//! table query reads the readiness gate exactly once and then works on that
//! snapshot; a word missing from the vocabulary is `Ok(None)`, never an error.

use std::sync::Arc;
use tracing::debug;

use crate::models::config::ModelConfig;
use crate::models::loader::{LoadState, ModelLoader};
use crate::models::similarity::{most_similar, SimilarWord};
use crate::models::{Embedding, EmbeddingResult, ModelInfo};
use crate::tokenizer::{Tokenized, TokenizerRegistry};

/// Number of neighbours returned when the caller does not ask for a valid count
pub const DEFAULT_SIMILAR_COUNT: usize = 10;

/// One entry of a batch lookup, in caller order
#[derive(Debug, Clone, PartialEq)]
pub struct WordLookup {
    /// The word exactly as the caller sent it
    pub word: String,
    pub embedding: Option<Embedding>,
}

/// Main façade for word-vector queries
pub struct WordVectorsManager {
    config: ModelConfig,
    loader: Arc<ModelLoader>,
    tokenizers: Arc<TokenizerRegistry>,
}

impl WordVectorsManager {
    pub fn new(config: ModelConfig, loader: Arc<ModelLoader>, tokenizers: Arc<TokenizerRegistry>) -> Self {
        Self {
            config,
            loader,
            tokenizers,
        }
    }

    /// Apply the table's key convention to a query word
    pub fn normalize(&self, word: &str) -> String {
        let word = word.trim();
        if self.config.lowercase {
            word.to_lowercase()
        } else {
            word.to_string()
        }
    }

    /// Vector for a single word, `None` when it is not in the vocabulary
    pub fn get_embedding(&self, word: &str) -> EmbeddingResult<Option<Embedding>> {
        let table = self.loader.table()?;
        Ok(table.lookup_vector(&self.normalize(word)))
    }

    /// Vectors for many words; one entry per input word, in input order
    ///
    /// Missing words yield `None` without affecting the rest of the batch.
    pub fn get_embeddings(&self, words: &[String]) -> EmbeddingResult<Vec<WordLookup>> {
        let table = self.loader.table()?;

        let results: Vec<WordLookup> = words
            .iter()
            .map(|word| WordLookup {
                word: word.clone(),
                embedding: table.lookup_vector(&self.normalize(word)),
            })
            .collect();

        debug!(
            "Batch lookup: {}/{} words found",
            results.iter().filter(|r| r.embedding.is_some()).count(),
            results.len()
        );
        Ok(results)
    }

    /// The `n` nearest neighbours of `word` by cosine similarity
    ///
    /// `None` when the word itself is not in the vocabulary. A missing,
    /// zero or negative `n` means [`DEFAULT_SIMILAR_COUNT`].
    pub fn get_similar(&self, word: &str, n: Option<i64>) -> EmbeddingResult<Option<Vec<SimilarWord>>> {
        let table = self.loader.table()?;
        let top_n = resolve_top_n(n);

        let index = match table.index_of(&self.normalize(word)) {
            Some(index) => index,
            None => return Ok(None),
        };

        Ok(Some(most_similar(table.as_ref(), index, top_n)))
    }

    /// Tokenize text; not gated on table readiness
    pub fn tokenize(&self, text: &str, model: Option<&str>) -> EmbeddingResult<Tokenized> {
        self.tokenizers.tokenize(text, model)
    }

    /// Available tokenizer model names and the default encoding
    pub fn available_tokenizers(&self) -> (Vec<String>, String) {
        (
            self.tokenizers.available_models(),
            self.tokenizers.default_encoding().to_string(),
        )
    }

    /// Static model description plus the current load state
    pub fn model_info(&self) -> ModelInfo {
        let state = self.loader.state();
        let table = self.loader.table().ok();

        ModelInfo {
            id: self.config.id.clone(),
            description: self.config.description.clone(),
            dimension: table
                .as_ref()
                .map(|t| t.dimension())
                .unwrap_or(self.config.dimension),
            vocabulary_size: table.as_ref().map(|t| t.len()),
            state,
        }
    }

    pub fn load_state(&self) -> LoadState {
        self.loader.state()
    }
}

/// Validate a requested neighbour count
pub fn resolve_top_n(n: Option<i64>) -> usize {
    match n {
        Some(n) if n > 0 => usize::try_from(n).unwrap_or(DEFAULT_SIMILAR_COUNT),
        _ => DEFAULT_SIMILAR_COUNT,
    }
}
