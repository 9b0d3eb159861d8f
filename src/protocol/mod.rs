//! Wire formats
//!
//! JSON request and response bodies for the HTTP API.

pub mod http;

pub use http::{EmbeddingRequest, EmbeddingsRequest, HttpErrorResponse, TokenizeRequest};
