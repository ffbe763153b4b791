use std::sync::Arc;

use survey_db::Database;
use tracing::error;

use crate::config::Settings;
use crate::error::{AppError, AppResult};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub settings: Settings,
}

impl AppStateInner {
    pub fn new(db: Database, settings: Settings) -> AppState {
        Arc::new(Self { db, settings })
    }
}

/// Run blocking SQLite work off the async runtime.
pub async fn with_db<F, T>(state: &AppState, f: F) -> AppResult<T>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("Database task panicked: {}", e);
            AppError::Internal(anyhow::anyhow!("database task failed: {}", e))
        })?
        .map_err(AppError::Internal)
}
