use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::ReviewTask;
use crate::media::MediaItem;
use crate::review::{CommentaryResult, ReviewClient};
use crate::store::{MediaStore, StoreError};

/// Writes commentary for moderated items, once per item.
pub struct CommentaryTask {
    store: Arc<dyn MediaStore>,
    client: ReviewClient,
    batch_size: usize,
}

impl CommentaryTask {
    pub fn new(store: Arc<dyn MediaStore>, client: ReviewClient, batch_size: usize) -> Self {
        Self {
            store,
            client,
            batch_size: batch_size.max(1),
        }
    }
}

#[async_trait]
impl ReviewTask for CommentaryTask {
    fn name(&self) -> &'static str {
        "commentary"
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn fetch_batch(&self, limit: usize) -> Result<Vec<MediaItem>, StoreError> {
        self.store.fetch_awaiting_commentary(limit).await
    }

    fn is_eligible(&self, item: &MediaItem) -> bool {
        item.awaits_commentary()
    }

    async fn process(&self, mut item: MediaItem) -> Result<(), StoreError> {
        let description = item.moderation_description.as_deref().unwrap_or_default();
        let result = self.client.comment(description).await;
        match &result {
            CommentaryResult::Text(text) => {
                info!(media_id = %item.id, chars = text.chars().count(), "commentary generated");
            }
            CommentaryResult::Failed { reason } => {
                warn!(media_id = %item.id, reason = %reason, "commentary failed, storing sentinel");
            }
        }

        item.commentary = Some(result.into_commentary());
        self.store.persist(&item).await
    }
}
