//! Model loader and readiness gate
//!
//! The table is loaded exactly once by a background task started at process
//! start. Query paths read the state without blocking: until the table is
//! published they get `EmbeddingError::NotReady`.
//!
//! State transitions are monotonic: `NotStarted -> Loading -> Ready`. A failed
//! load is logged and leaves the loader in `Loading` until the process is
//! restarted.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::models::source::TableSource;
use crate::models::table::VectorLookup;
use crate::models::{EmbeddingError, EmbeddingResult};

/// Load state of the embedding table
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    NotStarted = 0,
    Loading = 1,
    Ready = 2,
}

impl From<u8> for LoadState {
    fn from(value: u8) -> Self {
        match value {
            0 => LoadState::NotStarted,
            1 => LoadState::Loading,
            _ => LoadState::Ready,
        }
    }
}

struct Shared {
    state: AtomicU8,
    table: OnceLock<Arc<dyn VectorLookup>>,
}

impl Shared {
    fn state(&self) -> LoadState {
        LoadState::from(self.state.load(Ordering::Acquire))
    }

    fn publish(&self, table: Arc<dyn VectorLookup>) {
        // The table must be visible before anyone can observe `Ready`.
        if self.table.set(table).is_ok() {
            self.state.store(LoadState::Ready as u8, Ordering::Release);
        }
    }
}

/// Owns the embedding table and its load lifecycle
pub struct ModelLoader {
    shared: Arc<Shared>,
    source: Arc<dyn TableSource>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ModelLoader {
    pub fn new(source: Arc<dyn TableSource>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: AtomicU8::new(LoadState::NotStarted as u8),
                table: OnceLock::new(),
            }),
            source,
            task: Mutex::new(None),
        }
    }

    /// Loader that is already `Ready` with the given table
    pub fn preloaded(source: Arc<dyn TableSource>, table: Arc<dyn VectorLookup>) -> Self {
        let loader = Self::new(source);
        loader.shared.publish(table);
        loader
    }

    /// Start the background load if nobody has yet, and report the current state
    ///
    /// Idempotent and safe to call concurrently: only the caller that wins the
    /// `NotStarted -> Loading` transition spawns the task. Never waits for the
    /// load itself. Must be called from within a tokio runtime.
    pub fn ensure_loaded(&self) -> LoadState {
        let won = self
            .shared
            .state
            .compare_exchange(
                LoadState::NotStarted as u8,
                LoadState::Loading as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        if won {
            // Hold the slot across the spawn so `shutdown` and `finish_loading`
            // can never run between the transition and the handle being stored.
            let mut task = self.task.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let shared = Arc::clone(&self.shared);
            let source = Arc::clone(&self.source);
            let handle = tokio::spawn(async move {
                let started = Instant::now();
                info!("🔄 Loading embedding table from {}", source.describe());
                match source.load().await {
                    Ok(table) => {
                        info!(
                            "✅ Embedding table ready: {} words x {} dimensions in {:?}",
                            table.len(),
                            table.dimension(),
                            started.elapsed()
                        );
                        shared.publish(table);
                    }
                    Err(e) => {
                        error!("❌ Error loading embedding table: {}", e);
                    }
                }
            });
            *task = Some(handle);
        }

        self.state()
    }

    /// Current state, a single atomic read
    pub fn state(&self) -> LoadState {
        self.shared.state()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == LoadState::Ready
    }

    /// The loaded table, or `NotReady`
    pub fn table(&self) -> EmbeddingResult<Arc<dyn VectorLookup>> {
        self.shared.table.get().cloned().ok_or(EmbeddingError::NotReady)
    }

    /// Wait for the background load task to finish and report the resulting state
    ///
    /// Returns immediately when no task is tracked (never started, or already
    /// awaited by another caller).
    pub async fn finish_loading(&self) -> LoadState {
        let handle = self.take_task();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    error!("❌ Embedding table load task panicked: {}", e);
                }
            }
        }
        self.state()
    }

    /// Abort a load that is still running
    pub fn shutdown(&self) {
        if let Some(handle) = self.take_task() {
            handle.abort();
        }
    }

    fn take_task(&self) -> Option<JoinHandle<()>> {
        self.task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EmbeddingTable;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct CountingSource {
        calls: AtomicUsize,
        delay: Duration,
        fail: bool,
    }

    impl CountingSource {
        fn new(delay: Duration, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
                fail,
            })
        }
    }

    #[async_trait]
    impl TableSource for CountingSource {
        fn describe(&self) -> String {
            "counting".to_string()
        }

        async fn load(&self) -> EmbeddingResult<Arc<dyn VectorLookup>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(EmbeddingError::ModelLoadFailed {
                    error: "network unreachable".to_string(),
                });
            }
            let table = EmbeddingTable::from_entries(2, vec![("hello", vec![1.0, 0.0])])?;
            Ok(Arc::new(table))
        }
    }

    #[tokio::test]
    async fn test_initial_state_is_not_started() {
        let loader = ModelLoader::new(CountingSource::new(Duration::ZERO, false));
        assert_eq!(loader.state(), LoadState::NotStarted);
        assert!(matches!(loader.table(), Err(EmbeddingError::NotReady)));
        assert_eq!(loader.finish_loading().await, LoadState::NotStarted);
    }

    #[tokio::test]
    async fn test_concurrent_ensure_loaded_loads_once() {
        let source = CountingSource::new(Duration::from_millis(50), false);
        let loader = Arc::new(ModelLoader::new(source.clone()));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let loader = Arc::clone(&loader);
            handles.push(tokio::spawn(async move { loader.ensure_loaded() }));
        }
        for handle in handles {
            let state = handle.await.unwrap();
            assert_ne!(state, LoadState::NotStarted);
        }

        assert_eq!(loader.finish_loading().await, LoadState::Ready);
        assert_eq!(loader.ensure_loaded(), LoadState::Ready);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(loader.table().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ensure_loaded_does_not_block() {
        let loader = ModelLoader::new(CountingSource::new(Duration::from_secs(30), false));

        assert_eq!(loader.ensure_loaded(), LoadState::Loading);
        assert!(matches!(loader.table(), Err(EmbeddingError::NotReady)));
        loader.shutdown();
    }

    #[tokio::test]
    async fn test_load_task_is_tracked_as_soon_as_started() {
        let source = CountingSource::new(Duration::from_secs(30), false);
        let loader = ModelLoader::new(source.clone());

        assert_eq!(loader.ensure_loaded(), LoadState::Loading);
        assert!(loader.task.lock().unwrap().is_some());

        loader.shutdown();
        assert!(loader.task.lock().unwrap().is_none());
        assert_eq!(loader.finish_loading().await, LoadState::Loading);
        assert!(source.calls.load(Ordering::SeqCst) <= 1);
    }

    #[tokio::test]
    async fn test_concurrent_ensure_loaded_and_shutdown_leave_no_task() {
        let source = CountingSource::new(Duration::from_secs(30), false);
        let loader = Arc::new(ModelLoader::new(source));

        let starter = {
            let loader = Arc::clone(&loader);
            tokio::spawn(async move { loader.ensure_loaded() })
        };
        let stopper = {
            let loader = Arc::clone(&loader);
            tokio::spawn(async move { loader.shutdown() })
        };
        starter.await.unwrap();
        stopper.await.unwrap();

        // Whichever ran first, a final shutdown must find any task still tracked.
        loader.shutdown();
        assert!(loader.task.lock().unwrap().is_none());
        assert_eq!(loader.state(), LoadState::Loading);
    }

    #[tokio::test]
    async fn test_failed_load_stays_loading() {
        let source = CountingSource::new(Duration::ZERO, true);
        let loader = ModelLoader::new(source.clone());

        loader.ensure_loaded();
        assert_eq!(loader.finish_loading().await, LoadState::Loading);
        assert_eq!(loader.ensure_loaded(), LoadState::Loading);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(!loader.is_ready());
    }

    #[tokio::test]
    async fn test_preloaded_is_ready() {
        let table = EmbeddingTable::from_entries(2, vec![("a", vec![0.0, 1.0])]).unwrap();
        let loader = ModelLoader::preloaded(
            CountingSource::new(Duration::ZERO, false),
            Arc::new(table),
        );

        assert!(loader.is_ready());
        assert_eq!(loader.ensure_loaded(), LoadState::Ready);
    }
}
