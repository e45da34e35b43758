use std::sync::Arc;

use tripmate_storage::{Store, StoreError};
use tripmate_store_memory::MemoryStore;
use tripmate_store_sqlite::SqliteStore;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://tripmate.db?mode=rwc";

/// Storage backends selectable by URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Sqlite,
    Memory,
}

impl BackendKind {
    pub fn from_url(url: &str) -> Result<Self, StoreError> {
        if url.starts_with("sqlite:") {
            Ok(Self::Sqlite)
        } else if url.starts_with("memory:") {
            Ok(Self::Memory)
        } else {
            Err(StoreError::Backend(format!(
                "unsupported database URL scheme: {url}"
            )))
        }
    }
}

/// Open the store named by `url` (`sqlite://…` or `memory://`).
pub async fn open_store(url: &str) -> Result<Arc<dyn Store>, StoreError> {
    let store: Arc<dyn Store> = match BackendKind::from_url(url)? {
        BackendKind::Sqlite => Arc::new(SqliteStore::open(url).await?),
        BackendKind::Memory => Arc::new(MemoryStore::new()),
    };
    tracing::debug!(url, "store opened");
    Ok(store)
}
