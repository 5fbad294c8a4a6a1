use std::sync::Arc;

use async_trait::async_trait;
use ditto_review::{
    COMMENTARY_FAILED, ContentPart, ContentStatus, DataType, GenerateRequest, GenerateResponse,
    LanguageModel, MediaItem, MediaStore, ModerationStatus, ModerationTask, ReviewClient,
    ReviewMetrics, ReviewTask, StateFileStore, StoreError,
};

struct ApprovingModel;

#[async_trait]
impl LanguageModel for ApprovingModel {
    fn provider(&self) -> &str {
        "stub"
    }

    fn model_id(&self) -> &str {
        "stub-model"
    }

    async fn generate(&self, _request: GenerateRequest) -> ditto_review::Result<GenerateResponse> {
        Ok(GenerateResponse {
            content: vec![ContentPart::Text {
                text: r#"{"outcome":"APPROVED","mediaDescription":"a cat photo"}"#.to_string(),
            }],
            ..GenerateResponse::default()
        })
    }
}

#[tokio::test]
async fn mutations_survive_reopen() -> Result<(), StoreError> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("media-state.json");

    let store = StateFileStore::open(&path).await?;
    store
        .insert(MediaItem::image("1", "https://cdn.example/1.png"))
        .await?;
    store
        .insert(MediaItem::new("2", DataType::Video, "https://cdn.example/2.mp4"))
        .await?;

    let mut item = store.fetch_pending(10).await?.remove(0);
    item.moderation_status = ModerationStatus::Approved;
    item.moderation_description = Some("a cat photo".to_string());
    store.persist(&item).await?;
    assert!(store.mark_published("1", ContentStatus::Approved).await?);
    drop(store);

    let reopened = StateFileStore::open(&path).await?;
    assert_eq!(reopened.snapshot().await?.len(), 2);
    let item = reopened.get("1").await?.expect("item 1");
    assert_eq!(item.moderation_status, ModerationStatus::Approved);
    assert_eq!(item.content_status, ContentStatus::Approved);
    assert!(reopened.fetch_pending(10).await?.is_empty());

    let mut awaiting = reopened.fetch_awaiting_commentary(5).await?;
    assert_eq!(awaiting.len(), 1);
    let mut item = awaiting.remove(0);
    item.commentary = Some(COMMENTARY_FAILED.to_string());
    reopened.persist(&item).await?;
    assert!(reopened.fetch_awaiting_commentary(5).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn unknown_ids_do_not_touch_the_file() -> Result<(), StoreError> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("media-state.json");
    let store = StateFileStore::open(&path).await?;

    assert!(!store.mark_published("404", ContentStatus::Approved).await?);
    let err = store
        .persist(&MediaItem::image("404", "https://cdn.example/404.png"))
        .await
        .expect_err("unknown id");
    assert!(matches!(err, StoreError::NotFound(_)));
    assert!(!path.exists());
    Ok(())
}

#[tokio::test]
async fn failed_write_leaves_item_pending_for_the_next_pass() -> Result<(), StoreError> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("media-state.json");
    let store = Arc::new(StateFileStore::open(&path).await?);
    store
        .insert(MediaItem::image("1", "https://cdn.example/1.png"))
        .await?;

    let metrics = Arc::new(ReviewMetrics::default());
    let client = ReviewClient::new(
        Arc::new(ApprovingModel),
        "gpt-4o-mini",
        "system prompt",
        metrics.clone(),
    )
    .expect("valid review client");
    let task = ModerationTask::new(store.clone(), client, metrics, 10);

    let item = store.fetch_pending(10).await?.remove(0);
    let saved = dir.path().join("media-state.saved");
    tokio::fs::rename(&path, &saved).await?;
    tokio::fs::create_dir(&path).await?;
    tokio::fs::write(path.join("occupied"), b"x").await?;

    assert!(task.process(item).await.is_err());

    tokio::fs::remove_dir_all(&path).await?;
    tokio::fs::rename(&saved, &path).await?;

    let item = store.get("1").await?.expect("item 1");
    assert_eq!(item.moderation_status, ModerationStatus::Pending);
    assert_eq!(item.content_status, ContentStatus::Pending);
    assert_eq!(store.fetch_pending(10).await?.len(), 1);

    let retry = store.fetch_pending(10).await?.remove(0);
    task.process(retry).await?;
    let item = store.get("1").await?.expect("item 1");
    assert_eq!(item.moderation_status, ModerationStatus::Approved);
    assert_eq!(item.content_status, ContentStatus::Approved);
    Ok(())
}
