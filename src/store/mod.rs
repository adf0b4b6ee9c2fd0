//! Persistence layer — key/value backends and tour outcome records.

pub mod file;
pub mod memory;
pub mod persistence;
pub mod traits;

use std::sync::Arc;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use persistence::{PersistedTourRecord, PersistenceStore};
pub use traits::KeyValueStore;

use crate::config::TourConfig;
use crate::error::Result;

/// Open the backend selected by `config`: the JSON file at `store_path`
/// when set, otherwise a process-local map.
pub async fn open(config: &TourConfig) -> Result<Arc<dyn KeyValueStore>> {
    match &config.store_path {
        Some(path) => {
            let store = FileStore::open(path).await?;
            tracing::info!(path = %path.display(), "Using file-backed tour store");
            Ok(Arc::new(store))
        }
        None => {
            tracing::info!("Using in-memory tour store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_file_store_when_path_set() {
        let dir = tempfile::tempdir().unwrap();
        let config = TourConfig {
            store_path: Some(dir.path().join("tours.json")),
            ..TourConfig::default()
        };
        let store = open(&config).await.unwrap();
        store.set("k", "v").await.unwrap();
        assert!(dir.path().join("tours.json").exists());

        let store = open(&TourConfig::default()).await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
    }
}
