//! Word Vectors Server Library
//!
//! HTTP service over a pre-trained word-embedding table: vector lookup,
//! nearest-neighbour search and tokenization.

pub mod models;
pub mod protocol;
pub mod server;
pub mod tokenizer;

// Re-exports
pub use models::{
    EmbeddingError, EmbeddingTable, LoadState, ModelLoader, VectorLookup, WordVectorsManager,
};
pub use server::{start_hyper_http_server, ServerConfig};
pub use tokenizer::TokenizerRegistry;
