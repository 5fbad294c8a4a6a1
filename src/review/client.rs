use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, warn};

use super::parse::parse_verdict;
use super::verdict::{CommentaryResult, ModerationVerdict};
use crate::metrics::{MetricsSink, ReviewCounter};
use crate::model::LanguageModel;
use crate::types::{GenerateRequest, Message, Usage};
use crate::{DittoError, Result};

pub const MODERATION_USER_PROMPT: &str = "Please review this image.";

/// Models matching these prefixes reject `temperature` and `max_tokens`.
pub const REASONING_MODEL_PREFIXES: &[&str] = &["gpt-5", "o1", "o3"];

pub const POLICY_MARKERS: &[&str] = &["content_policy_violation", "inappropriate"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

pub const MODERATION_SAMPLING: SamplingParams = SamplingParams {
    temperature: 0.0,
    max_tokens: 1000,
};

pub const COMMENTARY_SAMPLING: SamplingParams = SamplingParams {
    temperature: 0.7,
    max_tokens: 500,
};

pub fn supports_sampling_params(model: &str) -> bool {
    let model = model.trim().to_ascii_lowercase();
    !REASONING_MODEL_PREFIXES
        .iter()
        .any(|prefix| model.starts_with(prefix))
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallFailure {
    #[error("{0}")]
    Transport(String),
    #[error("{0}")]
    PolicyRejection(String),
}

impl CallFailure {
    pub fn classify(err: &DittoError) -> Self {
        let message = err.to_string();
        let lowered = message.to_ascii_lowercase();
        if POLICY_MARKERS.iter().any(|marker| lowered.contains(marker)) {
            Self::PolicyRejection(message)
        } else {
            Self::Transport(message)
        }
    }

    pub fn reason(&self) -> String {
        match self {
            Self::PolicyRejection(message) => format!("content policy violation: {message}"),
            Self::Transport(message) => format!("call failed: {message}"),
        }
    }
}

/// Calls the model for one pipeline and folds every outcome into a typed
/// result. Nothing here returns an error to the caller.
#[derive(Clone)]
pub struct ReviewClient {
    model: Arc<dyn LanguageModel>,
    model_id: String,
    system_prompt: String,
    metrics: Arc<dyn MetricsSink>,
}

impl std::fmt::Debug for ReviewClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewClient")
            .field("provider", &self.model.provider())
            .field("model_id", &self.model_id)
            .finish_non_exhaustive()
    }
}

impl ReviewClient {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        model_id: impl Into<String>,
        system_prompt: impl Into<String>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self> {
        let model_id = model_id.into();
        let system_prompt = system_prompt.into();
        if model_id.trim().is_empty() {
            return Err(DittoError::Config("review model id is empty".to_string()));
        }
        if system_prompt.trim().is_empty() {
            return Err(DittoError::Config("review system prompt is empty".to_string()));
        }
        Ok(Self {
            model,
            model_id,
            system_prompt,
            metrics,
        })
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub async fn moderate(&self, media_ref: &str) -> ModerationVerdict {
        let media_ref = media_ref.trim();
        if media_ref.is_empty() {
            return ModerationVerdict::unknown("media reference is empty");
        }

        let message = Message::user_with_image(MODERATION_USER_PROMPT, media_ref);
        let text = match self.call("moderation", message, MODERATION_SAMPLING).await {
            Ok(text) => text,
            Err(failure) => return ModerationVerdict::flagged(failure.reason()),
        };

        match parse_verdict(&text) {
            Ok(verdict) => verdict,
            Err(err) => {
                self.metrics.increment(ReviewCounter::ApiError, &self.model_id);
                error!(
                    model = %self.model_id,
                    operation = "moderation",
                    error = %err,
                    "model output could not be parsed into a verdict"
                );
                ModerationVerdict::unknown(format!("unparseable model output: {err}"))
            }
        }
    }

    pub async fn comment(&self, description: &str) -> CommentaryResult {
        if description.trim().is_empty() {
            return CommentaryResult::Failed {
                reason: "description is empty".to_string(),
            };
        }

        let message = Message::user(description);
        match self.call("commentary", message, COMMENTARY_SAMPLING).await {
            Ok(text) if text.trim().is_empty() => {
                warn!(model = %self.model_id, operation = "commentary", "model returned empty commentary");
                CommentaryResult::Failed {
                    reason: "model returned empty text".to_string(),
                }
            }
            Ok(text) => CommentaryResult::Text(text),
            Err(failure) => CommentaryResult::Failed {
                reason: failure.reason(),
            },
        }
    }

    async fn call(
        &self,
        operation: &'static str,
        user: Message,
        sampling: SamplingParams,
    ) -> std::result::Result<String, CallFailure> {
        let mut request = GenerateRequest::from(vec![Message::system(&self.system_prompt), user]);
        request.model = Some(self.model_id.clone());
        if supports_sampling_params(&self.model_id) {
            request.temperature = Some(sampling.temperature);
            request.max_tokens = Some(sampling.max_tokens);
        }

        match self.model.generate(request).await {
            Ok(response) => {
                self.record_usage(operation, &response.usage);
                Ok(response.text())
            }
            Err(err) => {
                self.metrics.increment(ReviewCounter::ApiError, &self.model_id);
                let failure = CallFailure::classify(&err);
                if matches!(failure, CallFailure::PolicyRejection(_)) {
                    self.metrics
                        .increment(ReviewCounter::InappropriateContent, &self.model_id);
                }
                error!(
                    model = %self.model_id,
                    operation,
                    error = %err,
                    "model call failed"
                );
                Err(failure)
            }
        }
    }

    fn record_usage(&self, operation: &'static str, usage: &Usage) {
        if usage.is_empty() {
            warn!(model = %self.model_id, operation, "model response carried no token usage");
            return;
        }
        let input = usage.input_tokens.unwrap_or(0);
        let output = usage.output_tokens.unwrap_or(0);
        let total = usage.total_tokens.unwrap_or(input.saturating_add(output));
        self.metrics
            .add(ReviewCounter::TotalToken, &self.model_id, total);
        self.metrics
            .add(ReviewCounter::InputToken, &self.model_id, input);
        self.metrics
            .add(ReviewCounter::OutputToken, &self.model_id, output);
        debug!(
            model = %self.model_id,
            operation,
            input_tokens = input,
            output_tokens = output,
            total_tokens = total,
            "recorded token usage"
        );
    }
}
