//! HTTP REST API Protocol
//!
//! JSON bodies for the word-vector endpoints:
//! - `POST /embedding`   `{"word": "..."}` -> `{"embedding": [...]}`
//! - `POST /embeddings`  `{"words": [...]}` -> `{"results": {"w": {"embedding": [...] | null}}}`
//! - `GET  /similar/{w}` -> `{"similar_words": [{"word": "...", "similarity": 0.7}]}`
//! - `POST /tokenize`    `{"text": "...", "model": "gpt-4"}` -> `{"tokens", "token_count", "token_strings"}`

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashSet;

use crate::models::{ModelInfo, LoadState, SimilarWord, WordLookup};
use crate::tokenizer::Tokenized;

/// Single word lookup request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    pub word: String,
}

/// Batch lookup request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsRequest {
    pub words: Vec<String>,
}

impl EmbeddingsRequest {
    /// Validate the request
    pub fn validate(&self, max_batch_size: usize) -> Result<(), String> {
        if self.words.len() > max_batch_size {
            return Err(format!(
                "Batch exceeds maximum size of {} words (got {})",
                max_batch_size,
                self.words.len()
            ));
        }
        Ok(())
    }
}

/// Tokenize request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenizeRequest {
    pub text: String,

    /// Model whose encoding to use; the default encoding when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl TokenizeRequest {
    /// Validate the request
    pub fn validate(&self, max_text_length: usize) -> Result<(), String> {
        if self.text.len() > max_text_length {
            return Err(format!(
                "Text exceeds maximum length of {} bytes (got {})",
                max_text_length,
                self.text.len()
            ));
        }
        Ok(())
    }
}

/// Single word lookup response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    pub embedding: Vec<f32>,
}

/// Per-word entry of a batch response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordEmbeddingResponse {
    pub embedding: Option<Vec<f32>>,
}

/// Batch lookup response
///
/// `results` is a JSON object in caller order. A word sent more than once
/// appears once, since every occurrence has the same result.
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingsResponse {
    #[serde(serialize_with = "serialize_ordered_results")]
    pub results: Vec<WordLookup>,
}

fn serialize_ordered_results<S: Serializer>(results: &[WordLookup], serializer: S) -> Result<S::Ok, S::Error> {
    let mut seen = HashSet::with_capacity(results.len());
    let mut map = serializer.serialize_map(None)?;
    for entry in results {
        if seen.insert(entry.word.as_str()) {
            map.serialize_entry(
                &entry.word,
                &WordEmbeddingResponse {
                    embedding: entry.embedding.clone(),
                },
            )?;
        }
    }
    map.end()
}

/// Similar words response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarWordsResponse {
    pub similar_words: Vec<SimilarWord>,
}

/// Tokenize response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenizeResponse {
    pub tokens: Vec<u32>,
    pub token_count: usize,
    pub token_strings: Vec<String>,
}

impl From<Tokenized> for TokenizeResponse {
    fn from(tokenized: Tokenized) -> Self {
        Self {
            token_count: tokenized.token_count(),
            tokens: tokenized.ids,
            token_strings: tokenized.tokens,
        }
    }
}

/// Available tokenizers response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableTokenizersResponse {
    pub available_models: Vec<String>,
    pub default_encoding: String,
}

/// Service metadata returned on `/`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootResponse {
    pub message: String,
    pub model: String,
    pub dimensions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vocabulary_size: Option<usize>,
    pub status: String,
}

impl From<ModelInfo> for RootResponse {
    fn from(info: ModelInfo) -> Self {
        let status = match info.state {
            LoadState::Ready => "running",
            LoadState::NotStarted | LoadState::Loading => "initializing",
        };
        Self {
            message: info.description,
            model: info.id,
            dimensions: info.dimension,
            vocabulary_size: info.vocabulary_size,
            status: status.to_string(),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
}

impl HealthResponse {
    pub fn from_state(state: LoadState) -> Self {
        let model_loaded = state == LoadState::Ready;
        Self {
            status: if model_loaded { "healthy" } else { "initializing" }.to_string(),
            model_loaded,
        }
    }
}

/// HTTP Error Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpErrorResponse {
    /// Error message
    pub error: String,

    /// Error code (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl HttpErrorResponse {
    /// Create a new error response
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: None,
        }
    }

    /// Create error with code
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(message).with_code("INVALID_INPUT")
    }

    pub fn word_not_found(word: &str) -> Self {
        Self::new(format!("Word '{}' not found in vocabulary", word)).with_code("WORD_NOT_FOUND")
    }

    pub fn model_not_ready() -> Self {
        Self::new("Embedding model is still loading, please try again later").with_code("MODEL_NOT_READY")
    }

    pub fn payload_too_large(limit: usize) -> Self {
        Self::new(format!("Request body exceeds {} bytes", limit)).with_code("PAYLOAD_TOO_LARGE")
    }

    pub fn route_not_found() -> Self {
        Self::new("Not Found").with_code("NOT_FOUND")
    }

    /// Generic failure; details stay in the server log
    pub fn internal_error() -> Self {
        Self::new("Internal server error").with_code("INTERNAL_ERROR")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embeddings_request_validation() {
        let req = EmbeddingsRequest {
            words: vec!["a".to_string(), "b".to_string()],
        };
        assert!(req.validate(2).is_ok());
        assert!(req.validate(1).is_err());
    }

    #[test]
    fn test_tokenize_request_model_optional() {
        let req: TokenizeRequest = serde_json::from_str(r#"{"text": "Hello"}"#).unwrap();
        assert_eq!(req.model, None);
        assert!(req.validate(5).is_ok());
        assert!(req.validate(4).is_err());
    }

    #[test]
    fn test_embeddings_response_keeps_order_and_dedups() {
        let response = EmbeddingsResponse {
            results: vec![
                WordLookup { word: "zebra".to_string(), embedding: Some(vec![1.0]) },
                WordLookup { word: "apple".to_string(), embedding: None },
                WordLookup { word: "zebra".to_string(), embedding: Some(vec![1.0]) },
            ],
        };

        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(
            json,
            r#"{"results":{"zebra":{"embedding":[1.0]},"apple":{"embedding":null}}}"#
        );
    }

    #[test]
    fn test_root_response_status() {
        let info = ModelInfo {
            id: "glove-wiki-gigaword-300".to_string(),
            description: "GloVe Word Embeddings API".to_string(),
            dimension: 300,
            vocabulary_size: None,
            state: LoadState::Loading,
        };
        let root = RootResponse::from(info);
        assert_eq!(root.status, "initializing");
        assert_eq!(root.dimensions, 300);
    }

    #[test]
    fn test_health_response() {
        let health = HealthResponse::from_state(LoadState::Ready);
        assert_eq!(health.status, "healthy");
        assert!(health.model_loaded);
        assert!(!HealthResponse::from_state(LoadState::Loading).model_loaded);
    }

    #[test]
    fn test_error_response() {
        let err = HttpErrorResponse::new("Test error").with_code("TEST_ERROR");
        assert_eq!(err.error, "Test error");
        assert_eq!(err.code, Some("TEST_ERROR".to_string()));

        let json = serde_json::to_string(&HttpErrorResponse::new("plain")).unwrap();
        assert_eq!(json, r#"{"error":"plain"}"#);
    }
}
