//! Table sources
//!
//! A source produces a fully-built table; the loader decides when to call it.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::models::config::{ModelConfig, SourceKind};
use crate::models::table::{EmbeddingTable, VectorLookup};
use crate::models::{EmbeddingError, EmbeddingResult};

/// Something that can produce the pre-trained table
#[async_trait]
pub trait TableSource: Send + Sync {
    /// Human readable origin, used in logs
    fn describe(&self) -> String;

    /// Fetch and build the table
    async fn load(&self) -> EmbeddingResult<Arc<dyn VectorLookup>>;
}

/// GloVe text file on local disk
pub struct GloveFileSource {
    path: PathBuf,
    dimension: usize,
}

impl GloveFileSource {
    pub fn new(path: impl Into<PathBuf>, dimension: usize) -> Self {
        Self {
            path: path.into(),
            dimension,
        }
    }
}

#[async_trait]
impl TableSource for GloveFileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn load(&self) -> EmbeddingResult<Arc<dyn VectorLookup>> {
        parse_off_thread(self.path.clone(), self.dimension).await
    }
}

/// Text-format table fetched from the Hugging Face hub into the local cache
#[cfg(feature = "hub")]
pub struct HubFileSource {
    repo: String,
    filename: String,
    dimension: usize,
}

#[cfg(feature = "hub")]
impl HubFileSource {
    pub fn new(repo: impl Into<String>, filename: impl Into<String>, dimension: usize) -> Self {
        Self {
            repo: repo.into(),
            filename: filename.into(),
            dimension,
        }
    }
}

#[cfg(feature = "hub")]
#[async_trait]
impl TableSource for HubFileSource {
    fn describe(&self) -> String {
        format!("hf://{}/{}", self.repo, self.filename)
    }

    async fn load(&self) -> EmbeddingResult<Arc<dyn VectorLookup>> {
        info!("⬇️  Fetching {} from the Hugging Face hub", self.describe());
        let api = hf_hub::api::tokio::Api::new().map_err(|e| EmbeddingError::ModelLoadFailed {
            error: format!("HF Hub API error: {}", e),
        })?;
        let path = api
            .model(self.repo.clone())
            .get(&self.filename)
            .await
            .map_err(|e| EmbeddingError::ModelLoadFailed {
                error: format!("Failed to download {}: {}", self.filename, e),
            })?;

        parse_off_thread(path, self.dimension).await
    }
}

/// Build the source described by the model configuration
pub fn from_config(config: &ModelConfig) -> EmbeddingResult<Box<dyn TableSource>> {
    match config.source {
        SourceKind::Local => Ok(Box::new(GloveFileSource::new(&config.path, config.dimension))),
        #[cfg(feature = "hub")]
        SourceKind::Hub => Ok(Box::new(HubFileSource::new(
            config.hub_repo.clone(),
            config.hub_filename.clone(),
            config.dimension,
        ))),
        #[cfg(not(feature = "hub"))]
        SourceKind::Hub => Err(EmbeddingError::ConfigError {
            message: "Hub sources require the `hub` feature".to_string(),
        }),
    }
}

async fn parse_off_thread(path: PathBuf, dimension: usize) -> EmbeddingResult<Arc<dyn VectorLookup>> {
    let (table, stats) =
        tokio::task::spawn_blocking(move || EmbeddingTable::from_text_file(path, dimension))
            .await
            .map_err(|e| EmbeddingError::ModelLoadFailed {
                error: format!("Table parser task failed: {}", e),
            })??;

    info!(
        "✅ Parsed {} vectors ({} dimensions, {} malformed rows skipped)",
        stats.rows,
        table.dimension(),
        stats.malformed
    );
    Ok(Arc::new(table))
}
