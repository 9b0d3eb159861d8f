//! Word Vectors Server Main
//!
//! Entry point for the HTTP word-vector server

use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use word_vectors_server::models::source;
use word_vectors_server::{
    start_hyper_http_server, ModelLoader, ServerConfig, TokenizerRegistry, WordVectorsManager,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config_path =
        std::env::var("WORD_VECTORS_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let config_found = Path::new(&config_path).exists();
    let config = if config_found {
        ServerConfig::from_file(&config_path)?
    } else {
        ServerConfig::default()
    };

    // Initialize tracing
    let log_level = match config.monitoring.log_level.to_lowercase().as_str() {
        "trace" => "word_vectors_server=trace,trace".to_string(),
        "debug" => "word_vectors_server=debug,debug".to_string(),
        "warn" => "word_vectors_server=warn,warn".to_string(),
        "error" => "word_vectors_server=error,error".to_string(),
        _ => "word_vectors_server=info,info".to_string(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .init();

    if !config_found {
        warn!("⚠️  {} not found, using default configuration", config_path);
    }
    info!("🚀 Word Vectors Server v{}", env!("CARGO_PKG_VERSION"));
    info!("📊 Model: {} ({} dimensions)", config.model.id, config.model.dimension);

    let table_source = source::from_config(&config.model)?;
    let loader = Arc::new(ModelLoader::new(Arc::from(table_source)));

    // Load in the background; requests get 503 until the table is ready
    loader.ensure_loaded();

    let tokenizers = Arc::new(TokenizerRegistry::from_config(&config.tokenizers).await);
    let manager = Arc::new(WordVectorsManager::new(
        config.model.clone(),
        Arc::clone(&loader),
        tokenizers,
    ));

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("⚠️  Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("🛑 Shutdown signal received");
    };

    let result = start_hyper_http_server(Arc::new(config), manager, shutdown).await;
    loader.shutdown();
    result
}
