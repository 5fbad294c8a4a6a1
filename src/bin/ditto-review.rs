use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use ditto_review::{
    CommentaryTask, Env, LanguageModel, MediaStore, MemoryStore, ModerationTask, OpenAICompatible,
    Pipeline, PipelineHandle, ReviewClient, ReviewConfig, ReviewMetrics, StateFileStore,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Moderates pending media with a language model and writes commentary for
/// the reviewed items.
#[derive(Debug, Parser)]
#[command(name = "ditto-review", version)]
struct Args {
    /// TOML config file.
    #[arg(long)]
    config: PathBuf,
    /// Dotenv file whose values override the process environment.
    #[arg(long)]
    dotenv: Option<PathBuf>,
    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
    /// Write Prometheus counters here on shutdown.
    #[arg(long)]
    metrics_out: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    ditto_review::telemetry::init_tracing(args.json_logs)?;

    let config = ReviewConfig::load(&args.config)?;
    let env = match args.dotenv.as_ref() {
        Some(path) => Env::from_dotenv_file(path)?,
        None => Env::default(),
    };

    let model: Arc<dyn LanguageModel> =
        Arc::new(OpenAICompatible::from_config(&config.provider, &env)?);

    let store: Arc<dyn MediaStore> = match config.store.state_path.clone() {
        Some(path) => {
            let store = StateFileStore::open(path).await?;
            info!(path = %store.path().display(), "media records stored in state file");
            Arc::new(store)
        }
        None => {
            warn!("no [store] state_path configured, media records live in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let metrics = Arc::new(ReviewMetrics::default());
    let moderation_client = ReviewClient::new(
        model.clone(),
        config.moderation_model(),
        config.moderation_prompt(),
        metrics.clone(),
    )?;
    let commentary_client = ReviewClient::new(
        model,
        config.commentary_model(),
        config.commentary_prompt(),
        metrics.clone(),
    )?;

    let shutdown = CancellationToken::new();
    let handles = vec![
        Pipeline::new(
            ModerationTask::new(
                store.clone(),
                moderation_client,
                metrics.clone(),
                config.moderation_batch_size(),
            ),
            config.poll_interval(),
        )
        .spawn_with_token(shutdown.child_token()),
        Pipeline::new(
            CommentaryTask::new(store, commentary_client, config.commentary_batch_size()),
            config.poll_interval(),
        )
        .spawn_with_token(shutdown.child_token()),
    ];
    info!(
        moderation_model = config.moderation_model(),
        commentary_model = config.commentary_model(),
        "review pipelines running, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested, waiting for in-flight items");
    futures_util::future::join_all(handles.into_iter().map(PipelineHandle::stop)).await;

    if let Some(path) = args.metrics_out.as_ref() {
        tokio::fs::write(path, metrics.render()).await?;
        info!(path = %path.display(), "wrote metrics");
    }
    Ok(())
}
