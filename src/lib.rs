mod error;
mod profile;

pub mod media;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod providers;
pub mod review;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod utils;

pub use error::{DittoError, Result};
pub use media::{COMMENTARY_FAILED, ContentStatus, DataType, MediaItem, ModerationStatus};
pub use metrics::{MetricsSink, ReviewCounter, ReviewMetrics};
pub use model::LanguageModel;
pub use pipeline::{
    CommentaryTask, ModerationTask, Pipeline, PipelineHandle, PipelineState, ReviewTask,
};
pub use profile::{
    Env, PipelineSection, ProviderAuth, ProviderConfig, ReviewConfig, StoreSection, parse_dotenv,
    resolve_api_key,
};
pub use review::{
    CallFailure, CommentaryResult, ModerationVerdict, ParseError, ReviewClient, ReviewOutcome,
    parse_verdict,
};
pub use store::{MediaStore, MemoryStore, StateFileStore, StoreError};
pub use types::{
    ContentPart, FinishReason, GenerateRequest, GenerateResponse, ImageSource, Message, Role,
    Usage, Warning,
};

#[cfg(feature = "provider-openai-compatible")]
pub use providers::OpenAICompatible;
