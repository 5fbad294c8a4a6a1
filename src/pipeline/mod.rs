//! Generic polling scheduler shared by the moderation and commentary passes.
//!
//! A [`Pipeline`] owns exactly one worker task. Each iteration fetches a
//! bounded batch, filters it, processes the eligible items one at a time in
//! batch order, then sleeps. Shutdown goes through a [`CancellationToken`]:
//! it is checked before every fetch and every item and it interrupts the
//! sleep, but an item that has started processing always runs to completion.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::media::MediaItem;
use crate::store::StoreError;

mod commentary;
mod moderation;

pub use commentary::CommentaryTask;
pub use moderation::ModerationTask;

/// One pipeline's selection predicate and per-item action.
#[async_trait]
pub trait ReviewTask: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn batch_size(&self) -> usize;

    async fn fetch_batch(&self, limit: usize) -> Result<Vec<MediaItem>, StoreError>;

    fn is_eligible(&self, item: &MediaItem) -> bool;

    async fn process(&self, item: MediaItem) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Stopped,
    Running,
    Stopping,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Stopping => "stopping",
        })
    }
}

pub struct Pipeline<T: ReviewTask> {
    task: Arc<T>,
    poll_interval: Duration,
}

impl<T: ReviewTask> Pipeline<T> {
    pub fn new(task: T, poll_interval: Duration) -> Self {
        Self {
            task: Arc::new(task),
            poll_interval,
        }
    }

    /// Starts the worker. The returned handle is the only way to stop it.
    pub fn spawn(self) -> PipelineHandle {
        self.spawn_with_token(CancellationToken::new())
    }

    /// Starts the worker under `token`, so cancelling a parent token stops it
    /// as well.
    pub fn spawn_with_token(self, token: CancellationToken) -> PipelineHandle {
        let name = self.task.name();
        let (state_tx, state_rx) = watch::channel(PipelineState::Running);
        let state_tx = Arc::new(state_tx);

        let span = info_span!("pipeline", name);
        let join = tokio::spawn(
            run_loop(
                self.task,
                self.poll_interval,
                token.clone(),
                state_tx.clone(),
            )
            .instrument(span),
        );

        PipelineHandle {
            name,
            token,
            state_tx,
            state_rx,
            join,
        }
    }
}

pub struct PipelineHandle {
    name: &'static str,
    token: CancellationToken,
    state_tx: Arc<watch::Sender<PipelineState>>,
    state_rx: watch::Receiver<PipelineState>,
    join: JoinHandle<()>,
}

impl std::fmt::Debug for PipelineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineHandle")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl PipelineHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> PipelineState {
        *self.state_rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state_rx.clone()
    }

    /// Signals shutdown and waits for the worker to exit, including any item
    /// it was processing.
    pub async fn stop(self) {
        self.state_tx.send_if_modified(|state| {
            if *state == PipelineState::Running {
                *state = PipelineState::Stopping;
                true
            } else {
                false
            }
        });
        self.token.cancel();

        if let Err(err) = self.join.await {
            error!(pipeline = self.name, error = %err, "pipeline worker did not exit cleanly");
            self.state_tx.send_replace(PipelineState::Stopped);
        }
    }
}

async fn run_loop<T: ReviewTask>(
    task: Arc<T>,
    poll_interval: Duration,
    token: CancellationToken,
    state: Arc<watch::Sender<PipelineState>>,
) {
    info!(
        batch_size = task.batch_size(),
        poll_interval_ms = poll_interval.as_millis() as u64,
        "pipeline started"
    );

    while !token.is_cancelled() {
        run_batch(&task, &token).await;

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }

    state.send_replace(PipelineState::Stopped);
    info!("pipeline stopped");
}

async fn run_batch<T: ReviewTask>(task: &Arc<T>, token: &CancellationToken) {
    let limit = task.batch_size();
    let fetch = {
        let task = task.clone();
        tokio::spawn(async move { task.fetch_batch(limit).await })
    };
    let batch = match fetch.await {
        Ok(Ok(batch)) => batch,
        Ok(Err(err)) => {
            warn!(error = %err, "failed to fetch batch");
            return;
        }
        Err(err) => {
            error!(error = %err, panicked = err.is_panic(), "batch fetch aborted");
            return;
        }
    };

    if !batch.is_empty() {
        debug!(items = batch.len(), "fetched batch");
    }

    for item in batch {
        if token.is_cancelled() {
            debug!("shutdown requested, leaving the rest of the batch");
            return;
        }
        if !task.is_eligible(&item) {
            debug!(media_id = %item.id, data_type = ?item.data_type, "skipping ineligible item");
            continue;
        }

        let media_id = item.id.clone();
        let worker = {
            let task = task.clone();
            tokio::spawn(async move { task.process(item).await }.in_current_span())
        };
        match worker.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                error!(media_id = %media_id, error = %err, "failed to persist media item");
            }
            Err(err) if err.is_panic() => {
                error!(media_id = %media_id, error = %err, "media item processing panicked");
            }
            Err(err) => {
                error!(media_id = %media_id, error = %err, "media item processing aborted");
            }
        }
    }
}
