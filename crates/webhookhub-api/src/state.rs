use std::sync::Arc;

use tokio_util::task::TaskTracker;
use tracing::error;
use webhookhub_db::Database;
use webhookhub_ingest::Normalizer;
use webhookhub_notify::Dispatcher;

use crate::cleanup::Sweeper;
use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

/// Shared by both listeners.
pub struct AppStateInner {
    pub db: Arc<Database>,
    pub normalizer: Normalizer,
    pub dispatcher: Dispatcher,
    pub sweeper: Sweeper,
    /// In-flight background dispatches; closed and drained on shutdown.
    pub tracker: TaskTracker,
    pub api_key: String,
}

impl AppStateInner {
    pub fn new(
        db: Arc<Database>,
        normalizer: Normalizer,
        dispatcher: Dispatcher,
        api_key: impl Into<String>,
    ) -> AppState {
        Arc::new(Self {
            sweeper: Sweeper::new(db.clone()),
            db,
            normalizer,
            dispatcher,
            tracker: TaskTracker::new(),
            api_key: api_key.into(),
        })
    }

    /// Runs a store call off the async runtime.
    pub async fn blocking<F, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Internal
            })?
            .map_err(ApiError::from)
    }
}
