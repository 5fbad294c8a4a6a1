use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{MediaStore, StoreError, replace, select, set_content_status, upsert};
use crate::media::{ContentStatus, MediaItem};

/// On-disk JSON document holding every media record.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StateFile {
    #[serde(default)]
    pub items: Vec<MediaItem>,
}

impl StateFile {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let raw = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let payload = serde_json::to_vec_pretty(self)?;
        let tmp_path = path.with_extension("tmp");

        if tokio::fs::write(&tmp_path, &payload).await.is_err() {
            tokio::fs::write(path, &payload).await?;
            return Ok(());
        }

        match tokio::fs::rename(&tmp_path, path).await {
            Ok(()) => Ok(()),
            Err(_) => {
                tokio::fs::write(path, &payload).await?;
                let _ = tokio::fs::remove_file(&tmp_path).await;
                Ok(())
            }
        }
    }
}

/// Media records kept in a JSON state file.
///
/// The file is the only copy. Fetches read it, and every write re-reads it
/// under the write lock, changes the one record it targets and saves the
/// document. A failed save leaves the previous file, so the item keeps its
/// prior state. Other writers are seen on the next read and kept on the next
/// write, provided they replace the file atomically (write a sibling, then
/// rename).
#[derive(Debug)]
pub struct StateFileStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl StateFileStore {
    /// Opens the store. A missing file reads as empty and is created on the
    /// first write; an unreadable one is an error.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        };
        let state = store.read_state().await?;
        debug!(path = %store.path.display(), items = state.items.len(), "opened media state file");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Adds a new item, or replaces the record with the same id.
    pub async fn insert(&self, item: MediaItem) -> Result<(), StoreError> {
        self.update(|items| {
            upsert(items, item);
            Ok(true)
        })
        .await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<MediaItem>, StoreError> {
        let state = self.read_state().await?;
        Ok(state.items.into_iter().find(|item| item.id == id))
    }

    pub async fn snapshot(&self) -> Result<Vec<MediaItem>, StoreError> {
        Ok(self.read_state().await?.items)
    }

    async fn read_state(&self) -> Result<StateFile, StoreError> {
        match StateFile::load(&self.path).await {
            Ok(state) => Ok(state),
            Err(StoreError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                Ok(StateFile::default())
            }
            Err(err) => Err(err),
        }
    }

    /// Read-modify-write of the document. `apply` returns whether anything
    /// changed; nothing is written when it did not.
    async fn update(
        &self,
        apply: impl FnOnce(&mut Vec<MediaItem>) -> Result<bool, StoreError>,
    ) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut state = self.read_state().await?;
        if !apply(&mut state.items)? {
            return Ok(false);
        }
        state.save(&self.path).await?;
        Ok(true)
    }
}

#[async_trait]
impl MediaStore for StateFileStore {
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<MediaItem>, StoreError> {
        let state = self.read_state().await?;
        Ok(select(&state.items, limit, MediaItem::awaits_moderation))
    }

    async fn fetch_awaiting_commentary(
        &self,
        limit: usize,
    ) -> Result<Vec<MediaItem>, StoreError> {
        let state = self.read_state().await?;
        Ok(select(&state.items, limit, MediaItem::awaits_commentary))
    }

    async fn persist(&self, item: &MediaItem) -> Result<(), StoreError> {
        self.update(|items| replace(items, item).map(|()| true)).await?;
        Ok(())
    }

    async fn mark_published(&self, id: &str, status: ContentStatus) -> Result<bool, StoreError> {
        self.update(|items| Ok(set_content_status(items, id, status))).await
    }
}
