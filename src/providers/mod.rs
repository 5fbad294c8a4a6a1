#[cfg(feature = "provider-openai-compatible")]
pub mod openai_compatible;

#[cfg(feature = "provider-openai-compatible")]
pub use openai_compatible::OpenAICompatible;
