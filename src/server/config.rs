//! HTTP Word Vectors Server Configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::models::config::{ModelConfig, TokenizersConfig};
use crate::models::{EmbeddingError, EmbeddingResult};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub network: NetworkConfig,
    pub model: ModelConfig,
    pub tokenizers: TokenizersConfig,
    pub limits: LimitsConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub bind_address: String,
    pub max_body_bytes: usize,
    pub listen_backlog: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum number of words in one `/embeddings` request
    pub max_batch_size: usize,
    /// Maximum `/tokenize` text length in bytes
    pub max_text_length: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: String,
    /// Log one line per request at info level instead of debug
    pub enable_detailed_logging: bool,
}

impl ServerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> EmbeddingResult<Self> {
        let content = std::fs::read_to_string(path)?;
        content.parse()
    }

    pub fn validate(&self) -> EmbeddingResult<()> {
        self.model.validate()?;
        self.tokenizers.validate()?;
        if self.limits.max_batch_size == 0 {
            return Err(EmbeddingError::ConfigError {
                message: "limits.max_batch_size must be positive".to_string(),
            });
        }
        Ok(())
    }
}

impl FromStr for ServerConfig {
    type Err = EmbeddingError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let config: ServerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
            max_body_bytes: 5242880,
            listen_backlog: 1024,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 1000,
            max_text_length: 1_000_000,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            enable_detailed_logging: false,
        }
    }
}
