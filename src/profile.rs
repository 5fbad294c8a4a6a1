use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::{DittoError, Result};

mod config;
mod env;

pub use config::{PipelineSection, ReviewConfig, StoreSection};
pub use env::{Env, parse_dotenv};

pub const DEFAULT_API_KEY_ENV: &[&str] = &["OPENAI_API_KEY", "OPENAI_COMPAT_API_KEY"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderAuth {
    #[serde(rename = "api_key_env", alias = "env", alias = "api_key")]
    ApiKeyEnv {
        #[serde(default)]
        keys: Vec<String>,
    },
}

fn default_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub auth: Option<ProviderAuth>,
    #[serde(default)]
    pub http_headers: BTreeMap<String, String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            auth: None,
            http_headers: BTreeMap::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Resolves the bearer token for a provider. A missing key yields an empty
/// token so keyless local endpoints keep working.
pub fn resolve_api_key(auth: Option<&ProviderAuth>, env: &Env) -> String {
    match auth {
        Some(ProviderAuth::ApiKeyEnv { keys }) if !keys.is_empty() => keys
            .iter()
            .find_map(|key| env.get(key.trim()))
            .unwrap_or_default(),
        _ => DEFAULT_API_KEY_ENV
            .iter()
            .find_map(|key| env.get(key))
            .unwrap_or_default(),
    }
}

fn header_map_from_pairs(headers: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut out = HeaderMap::new();
    for (name, value) in headers {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| DittoError::Config(format!("invalid http header name {name:?}: {err}")))?;

        let header_value = HeaderValue::from_str(value).map_err(|err| {
            DittoError::Config(format!("invalid http header value for {name:?}: {err}"))
        })?;

        out.insert(header_name, header_value);
    }
    Ok(out)
}

pub(crate) fn build_http_client(
    timeout: Duration,
    headers: &BTreeMap<String, String>,
) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().timeout(timeout);
    if !headers.is_empty() {
        builder = builder.default_headers(header_map_from_pairs(headers)?);
    }
    builder.build().map_err(DittoError::Http)
}
