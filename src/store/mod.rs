use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

use crate::media::{ContentStatus, MediaItem};

mod state_file;

pub use state_file::{StateFile, StateFileStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("media item not found: {0}")]
    NotFound(String),
    #[error("store io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store encoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Query/update surface of the media record store.
///
/// Fetches return at most `limit` items, oldest first. Writes are atomic per
/// item.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Images whose moderation status is still pending.
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<MediaItem>, StoreError>;

    /// Items with a moderation description and no commentary yet.
    async fn fetch_awaiting_commentary(&self, limit: usize)
    -> Result<Vec<MediaItem>, StoreError>;

    /// Writes back the full item state.
    async fn persist(&self, item: &MediaItem) -> Result<(), StoreError>;

    /// Updates only the publication status. `Ok(false)` when no record matched.
    async fn mark_published(&self, id: &str, status: ContentStatus) -> Result<bool, StoreError>;
}

/// Insertion-ordered in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<Vec<MediaItem>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: impl IntoIterator<Item = MediaItem>) -> Self {
        let store = Self::new();
        if let Ok(mut guard) = store.items.lock() {
            for item in items {
                upsert(&mut guard, item);
            }
        }
        store
    }

    /// Adds a new item, or replaces the record with the same id in place.
    pub fn insert(&self, item: MediaItem) -> Result<(), StoreError> {
        let mut items = self.lock()?;
        upsert(&mut items, item);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<MediaItem> {
        let items = self.items.lock().ok()?;
        items.iter().find(|item| item.id == id).cloned()
    }

    pub fn snapshot(&self) -> Vec<MediaItem> {
        self.items
            .lock()
            .map(|items| items.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.items.lock().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<MediaItem>>, StoreError> {
        self.items
            .lock()
            .map_err(|_| StoreError::Backend("media store lock poisoned".to_string()))
    }

    fn select(
        &self,
        limit: usize,
        predicate: impl Fn(&MediaItem) -> bool,
    ) -> Result<Vec<MediaItem>, StoreError> {
        let items = self.lock()?;
        Ok(select(&items, limit, predicate))
    }
}

fn select(
    items: &[MediaItem],
    limit: usize,
    predicate: impl Fn(&MediaItem) -> bool,
) -> Vec<MediaItem> {
    items
        .iter()
        .filter(|item| predicate(*item))
        .take(limit)
        .cloned()
        .collect()
}

fn upsert(items: &mut Vec<MediaItem>, item: MediaItem) {
    match items.iter_mut().find(|existing| existing.id == item.id) {
        Some(existing) => *existing = item,
        None => items.push(item),
    }
}

/// Replaces the record with the same id; never adds one.
fn replace(items: &mut [MediaItem], item: &MediaItem) -> Result<(), StoreError> {
    let existing = items
        .iter_mut()
        .find(|existing| existing.id == item.id)
        .ok_or_else(|| StoreError::NotFound(item.id.clone()))?;
    *existing = item.clone();
    Ok(())
}

fn set_content_status(items: &mut [MediaItem], id: &str, status: ContentStatus) -> bool {
    let Some(existing) = items.iter_mut().find(|existing| existing.id == id) else {
        return false;
    };
    existing.content_status = status;
    true
}

#[async_trait]
impl MediaStore for MemoryStore {
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<MediaItem>, StoreError> {
        self.select(limit, MediaItem::awaits_moderation)
    }

    async fn fetch_awaiting_commentary(
        &self,
        limit: usize,
    ) -> Result<Vec<MediaItem>, StoreError> {
        self.select(limit, MediaItem::awaits_commentary)
    }

    async fn persist(&self, item: &MediaItem) -> Result<(), StoreError> {
        let mut items = self.lock()?;
        replace(&mut items, item)
    }

    async fn mark_published(&self, id: &str, status: ContentStatus) -> Result<bool, StoreError> {
        let mut items = self.lock()?;
        Ok(set_content_status(&mut items, id, status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{DataType, ModerationStatus};

    fn seeded() -> MemoryStore {
        let mut described = MediaItem::image("3", "https://cdn.example/3.png");
        described.moderation_status = ModerationStatus::Approved;
        described.moderation_description = Some("a dog".to_string());

        MemoryStore::with_items([
            MediaItem::image("1", "https://cdn.example/1.png"),
            MediaItem::new("2", DataType::Video, "https://cdn.example/2.mp4"),
            described,
            MediaItem::image("4", "https://cdn.example/4.png"),
        ])
    }

    #[tokio::test]
    async fn fetch_pending_is_oldest_first_and_limited() -> Result<(), StoreError> {
        let store = seeded();
        let ids: Vec<String> = store
            .fetch_pending(10)
            .await?
            .into_iter()
            .map(|item| item.id)
            .collect();
        assert_eq!(ids, ["1", "4"]);
        assert_eq!(store.fetch_pending(1).await?.len(), 1);
        assert!(store.fetch_pending(0).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn fetch_awaiting_commentary_requires_description() -> Result<(), StoreError> {
        let store = seeded();
        let batch = store.fetch_awaiting_commentary(5).await?;
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, "3");
        Ok(())
    }

    #[tokio::test]
    async fn persist_replaces_the_record() -> Result<(), StoreError> {
        let store = seeded();
        let mut item = store.get("1").expect("seeded item");
        item.moderation_status = ModerationStatus::Flagged;
        item.rejection_reason = Some("blurry".to_string());
        store.persist(&item).await?;

        assert_eq!(store.get("1"), Some(item));
        assert_eq!(store.len(), 4);
        Ok(())
    }

    #[tokio::test]
    async fn persist_of_unknown_item_fails() {
        let store = MemoryStore::new();
        let err = store
            .persist(&MediaItem::image("404", "https://cdn.example/404.png"))
            .await
            .expect_err("unknown id");
        assert!(matches!(err, StoreError::NotFound(id) if id == "404"));
    }

    #[tokio::test]
    async fn mark_published_reports_whether_a_record_matched() -> Result<(), StoreError> {
        let store = seeded();
        assert!(store.mark_published("3", ContentStatus::Approved).await?);
        assert_eq!(
            store.get("3").map(|item| item.content_status),
            Some(ContentStatus::Approved)
        );
        assert!(!store.mark_published("404", ContentStatus::Approved).await?);
        Ok(())
    }
}
