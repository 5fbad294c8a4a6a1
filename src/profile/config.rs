use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ProviderConfig;
use crate::{DittoError, Result};

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_MODERATION_BATCH_SIZE: usize = 100;
pub const DEFAULT_COMMENTARY_BATCH_SIZE: usize = 5;

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PipelineSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
}

impl PipelineSection {
    fn resolve_prompt(&mut self, base_dir: &Path, section: &str) -> Result<()> {
        let inline = self
            .system_prompt
            .as_deref()
            .filter(|prompt| !prompt.trim().is_empty());
        if inline.is_some() {
            return Ok(());
        }
        let Some(path) = self.system_prompt_path.as_ref() else {
            return Err(DittoError::Config(format!(
                "[{section}] needs system_prompt or system_prompt_path"
            )));
        };
        let path = if path.is_relative() {
            base_dir.join(path)
        } else {
            path.clone()
        };
        let prompt = std::fs::read_to_string(&path).map_err(|err| {
            DittoError::Config(format!(
                "[{section}] failed to read system prompt {}: {err}",
                path.display()
            ))
        })?;
        self.system_prompt = Some(prompt);
        Ok(())
    }

    fn prompt(&self) -> &str {
        self.system_prompt.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StoreSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub provider: ProviderConfig,
    pub moderation: PipelineSection,
    pub commentary: PipelineSection,
    #[serde(default)]
    pub store: StoreSection,
}

impl ReviewConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            DittoError::Config(format!("failed to read {}: {err}", path.display()))
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_toml_str(&raw, base_dir)
    }

    /// Parses a config document, resolving prompt files and the state path
    /// against `base_dir`.
    pub fn from_toml_str(raw: &str, base_dir: &Path) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.moderation.resolve_prompt(base_dir, "moderation")?;
        config.commentary.resolve_prompt(base_dir, "commentary")?;
        if let Some(state_path) = config.store.state_path.as_mut() {
            if state_path.is_relative() {
                *state_path = base_dir.join(&*state_path);
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(DittoError::Config(
                "poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.moderation_model().trim().is_empty() {
            return Err(DittoError::Config("[moderation] model is required".to_string()));
        }
        if self.commentary_model().trim().is_empty() {
            return Err(DittoError::Config("[commentary] model is empty".to_string()));
        }
        for (section, pipeline) in [
            ("moderation", &self.moderation),
            ("commentary", &self.commentary),
        ] {
            if pipeline.prompt().trim().is_empty() {
                return Err(DittoError::Config(format!(
                    "[{section}] system prompt is empty"
                )));
            }
            if pipeline.batch_size == Some(0) {
                return Err(DittoError::Config(format!(
                    "[{section}] batch_size must be positive"
                )));
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn moderation_model(&self) -> &str {
        self.moderation.model.as_deref().unwrap_or_default()
    }

    /// Falls back to the moderation model when the commentary section names none.
    pub fn commentary_model(&self) -> &str {
        self.commentary
            .model
            .as_deref()
            .filter(|model| !model.trim().is_empty())
            .unwrap_or_else(|| self.moderation_model())
    }

    pub fn moderation_prompt(&self) -> &str {
        self.moderation.prompt()
    }

    pub fn commentary_prompt(&self) -> &str {
        self.commentary.prompt()
    }

    pub fn moderation_batch_size(&self) -> usize {
        self.moderation
            .batch_size
            .unwrap_or(DEFAULT_MODERATION_BATCH_SIZE)
    }

    pub fn commentary_batch_size(&self) -> usize {
        self.commentary
            .batch_size
            .unwrap_or(DEFAULT_COMMENTARY_BATCH_SIZE)
    }
}
