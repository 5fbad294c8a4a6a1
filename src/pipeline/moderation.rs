use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use super::ReviewTask;
use crate::media::{ContentStatus, MediaItem};
use crate::metrics::{MetricsSink, ReviewCounter};
use crate::review::{ReviewClient, ReviewOutcome};
use crate::store::{MediaStore, StoreError};

/// Moderates pending images and publishes the approved ones.
pub struct ModerationTask {
    store: Arc<dyn MediaStore>,
    client: ReviewClient,
    metrics: Arc<dyn MetricsSink>,
    batch_size: usize,
}

impl ModerationTask {
    pub fn new(
        store: Arc<dyn MediaStore>,
        client: ReviewClient,
        metrics: Arc<dyn MetricsSink>,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            client,
            metrics,
            batch_size: batch_size.max(1),
        }
    }
}

#[async_trait]
impl ReviewTask for ModerationTask {
    fn name(&self) -> &'static str {
        "moderation"
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn fetch_batch(&self, limit: usize) -> Result<Vec<MediaItem>, StoreError> {
        self.store.fetch_pending(limit).await
    }

    fn is_eligible(&self, item: &MediaItem) -> bool {
        item.awaits_moderation()
    }

    async fn process(&self, mut item: MediaItem) -> Result<(), StoreError> {
        let verdict = self.client.moderate(&item.data_content).await;
        let outcome = verdict.outcome;
        self.metrics
            .increment(ReviewCounter::ReviewCount, outcome.as_str());

        item.moderation_description = verdict.description().map(str::to_string);
        item.rejection_reason = verdict.failure_reason;
        item.moderation_status = outcome.moderation_status();
        self.store.persist(&item).await?;

        match outcome {
            ReviewOutcome::Approved => {
                match self
                    .store
                    .mark_published(&item.id, ContentStatus::Approved)
                    .await
                {
                    Ok(true) => info!(media_id = %item.id, "media approved and published"),
                    Ok(false) => {
                        warn!(media_id = %item.id, "approved media vanished before publishing")
                    }
                    Err(err) => {
                        warn!(media_id = %item.id, error = %err, "failed to mark media published")
                    }
                }
            }
            ReviewOutcome::Flagged | ReviewOutcome::Rejected => {
                info!(
                    media_id = %item.id,
                    outcome = %outcome,
                    reason = item.rejection_reason.as_deref().unwrap_or_default(),
                    "media left for manual review"
                );
            }
            ReviewOutcome::Unknown => {
                error!(
                    media_id = %item.id,
                    reason = item.rejection_reason.as_deref().unwrap_or_default(),
                    "unrecognized verdict, media left for manual review"
                );
            }
        }
        Ok(())
    }
}
