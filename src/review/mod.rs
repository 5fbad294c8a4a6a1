mod client;
mod parse;
mod verdict;

pub use client::{
    CallFailure, ReviewClient, SamplingParams, COMMENTARY_SAMPLING, MODERATION_SAMPLING,
    MODERATION_USER_PROMPT, POLICY_MARKERS, REASONING_MODEL_PREFIXES, supports_sampling_params,
};
pub use parse::{ParseError, extract_json_payload, parse_verdict};
pub use verdict::{CommentaryResult, ModerationVerdict, ReviewOutcome};
