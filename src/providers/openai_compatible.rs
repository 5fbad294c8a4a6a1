use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::model::LanguageModel;
use crate::profile::{Env, ProviderConfig, build_http_client, resolve_api_key};
use crate::types::{
    ContentPart, FinishReason, GenerateRequest, GenerateResponse, ImageSource, Message, Role,
    Usage, Warning,
};
use crate::{DittoError, Result};

#[derive(Clone)]
pub struct OpenAICompatible {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    default_model: String,
}

impl OpenAICompatible {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: api_key.into(),
            default_model: String::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn from_config(config: &ProviderConfig, env: &Env) -> Result<Self> {
        let api_key = resolve_api_key(config.auth.as_ref(), env);
        let http = build_http_client(config.timeout(), &config.http_headers)?;

        let mut out = Self::new(api_key).with_http_client(http);
        if let Some(base_url) = config.base_url.as_deref().filter(|s| !s.trim().is_empty()) {
            out = out.with_base_url(base_url);
        }
        Ok(out)
    }

    fn chat_completions_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else {
            format!("{base}/chat/completions")
        }
    }

    fn resolve_model<'a>(&'a self, request: &'a GenerateRequest) -> Result<&'a str> {
        if let Some(model) = request.model.as_deref().filter(|m| !m.trim().is_empty()) {
            return Ok(model);
        }
        if !self.default_model.trim().is_empty() {
            return Ok(self.default_model.as_str());
        }
        Err(DittoError::InvalidResponse(
            "openai-compatible model is not set (set request.model or OpenAICompatible::with_model)"
                .to_string(),
        ))
    }

    fn messages_to_chat_messages(messages: &[Message]) -> (Vec<Value>, Vec<Warning>) {
        let mut out = Vec::<Value>::new();
        let mut warnings = Vec::<Warning>::new();

        for message in messages {
            match message.role {
                Role::System => {
                    let mut text = String::new();
                    for part in &message.content {
                        match part {
                            ContentPart::Text { text: chunk } => text.push_str(chunk),
                            ContentPart::Image { .. } => warnings.push(Warning::Unsupported {
                                feature: "system_image".to_string(),
                                details: Some(
                                    "images are only sent in user turns, dropped from system"
                                        .to_string(),
                                ),
                            }),
                        }
                    }
                    if text.trim().is_empty() {
                        continue;
                    }
                    out.push(serde_json::json!({ "role": "system", "content": text }));
                }
                Role::User => {
                    let mut texts = String::new();
                    let mut parts = Vec::<Value>::new();
                    let mut has_image = false;

                    for part in &message.content {
                        match part {
                            ContentPart::Text { text } => {
                                if text.is_empty() {
                                    continue;
                                }
                                texts.push_str(text);
                                parts.push(serde_json::json!({ "type": "text", "text": text }));
                            }
                            ContentPart::Image { source } => {
                                has_image = true;
                                let ImageSource::Url { url: image_url } = source;
                                parts.push(serde_json::json!({
                                    "type": "image_url",
                                    "image_url": { "url": image_url }
                                }));
                            }
                        }
                    }

                    if parts.is_empty() {
                        continue;
                    }

                    if has_image {
                        out.push(serde_json::json!({ "role": "user", "content": parts }));
                    } else {
                        out.push(serde_json::json!({ "role": "user", "content": texts }));
                    }
                }
            }
        }

        (out, warnings)
    }

    fn parse_finish_reason(reason: Option<&str>) -> FinishReason {
        match reason {
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            Some("error") => FinishReason::Error,
            _ => FinishReason::Unknown,
        }
    }

    fn parse_usage(value: &Value) -> Usage {
        let mut usage = Usage::default();
        if let Some(obj) = value.as_object() {
            usage.input_tokens = obj.get("prompt_tokens").and_then(Value::as_u64);
            usage.output_tokens = obj.get("completion_tokens").and_then(Value::as_u64);
            usage.total_tokens = obj.get("total_tokens").and_then(Value::as_u64);
        }
        usage.merge_total();
        usage
    }

    fn build_body(model: &str, request: &GenerateRequest) -> (Map<String, Value>, Vec<Warning>) {
        let (messages, warnings) = Self::messages_to_chat_messages(&request.messages);

        let mut body = Map::<String, Value>::new();
        body.insert("model".to_string(), Value::String(model.to_string()));
        body.insert("messages".to_string(), Value::Array(messages));

        if let Some(temperature) = request.temperature {
            body.insert(
                "temperature".to_string(),
                Value::Number(
                    serde_json::Number::from_f64(temperature as f64).unwrap_or_else(|| 0.into()),
                ),
            );
        }
        if let Some(max_tokens) = request.max_tokens {
            body.insert("max_tokens".to_string(), Value::Number(max_tokens.into()));
        }

        (body, warnings)
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Value>,
}

#[derive(Debug, Deserialize, Default)]
struct ChatChoice {
    #[serde(default)]
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[async_trait]
impl LanguageModel for OpenAICompatible {
    fn provider(&self) -> &str {
        "openai-compatible"
    }

    fn model_id(&self) -> &str {
        self.default_model.as_str()
    }

    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse> {
        let model = self.resolve_model(&request)?;
        let (body, mut warnings) = Self::build_body(model, &request);

        let url = self.chat_completions_url();
        let mut req = self.http.post(url);
        if !self.api_key.trim().is_empty() {
            req = req.bearer_auth(&self.api_key);
        }
        let response = req.json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(DittoError::Api { status, body: text });
        }

        let parsed = response.json::<ChatCompletionsResponse>().await?;
        let choice = parsed.choices.first().ok_or_else(|| {
            DittoError::InvalidResponse("chat/completions response has no choices".to_string())
        })?;

        if let Some(refusal) = choice.message.refusal.as_deref().filter(|r| !r.trim().is_empty()) {
            return Err(DittoError::InvalidResponse(format!(
                "model refused the request: {refusal}"
            )));
        }

        let mut content = Vec::<ContentPart>::new();
        if let Some(text) = choice.message.content.as_deref().filter(|t| !t.is_empty()) {
            content.push(ContentPart::Text {
                text: text.to_string(),
            });
        }

        let usage = parsed
            .usage
            .as_ref()
            .map(Self::parse_usage)
            .unwrap_or_default();
        if usage.is_empty() {
            warnings.push(Warning::Compatibility {
                feature: "usage".to_string(),
                details: "chat/completions response carried no usage block".to_string(),
            });
        }

        let finish_reason = Self::parse_finish_reason(choice.finish_reason.as_deref());

        Ok(GenerateResponse {
            content,
            finish_reason,
            usage,
            warnings,
            provider_metadata: Some(serde_json::json!({ "id": parsed.id, "model": parsed.model })),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_resolves_api_key_and_base_url() -> Result<()> {
        let config = ProviderConfig {
            base_url: Some("http://localhost:1234/v1".to_string()),
            auth: Some(crate::profile::ProviderAuth::ApiKeyEnv {
                keys: vec!["REVIEW_TEST_OPENAI_COMPAT_KEY".to_string()],
            }),
            ..ProviderConfig::default()
        };
        let env = Env {
            dotenv: std::collections::BTreeMap::from([(
                "REVIEW_TEST_OPENAI_COMPAT_KEY".to_string(),
                "sk-test".to_string(),
            )]),
        };

        let client = OpenAICompatible::from_config(&config, &env)?.with_model("test-model");
        assert_eq!(client.provider(), "openai-compatible");
        assert_eq!(client.model_id(), "test-model");
        assert_eq!(client.api_key, "sk-test");
        assert_eq!(
            client.chat_completions_url(),
            "http://localhost:1234/v1/chat/completions"
        );
        Ok(())
    }

    #[test]
    fn user_image_turn_becomes_content_parts() {
        let messages = vec![
            Message::system("policy"),
            Message::user_with_image("Please review this image.", "https://cdn.example/1.png"),
        ];

        let (mapped, warnings) = OpenAICompatible::messages_to_chat_messages(&messages);
        assert!(warnings.is_empty());
        assert_eq!(
            mapped,
            vec![
                serde_json::json!({ "role": "system", "content": "policy" }),
                serde_json::json!({
                    "role": "user",
                    "content": [
                        { "type": "text", "text": "Please review this image." },
                        { "type": "image_url", "image_url": { "url": "https://cdn.example/1.png" } }
                    ]
                }),
            ]
        );
    }

    #[test]
    fn images_in_system_turn_are_dropped_with_a_warning() {
        let mut system = Message::system("policy");
        system.content.push(ContentPart::Image {
            source: ImageSource::Url {
                url: "https://cdn.example/1.png".to_string(),
            },
        });

        let (mapped, warnings) = OpenAICompatible::messages_to_chat_messages(&[system]);
        assert_eq!(
            mapped,
            vec![serde_json::json!({ "role": "system", "content": "policy" })]
        );
        assert!(matches!(
            warnings.as_slice(),
            [Warning::Unsupported { feature, .. }] if feature == "system_image"
        ));
    }

    #[test]
    fn text_only_user_turn_is_a_plain_string() {
        let (mapped, _) =
            OpenAICompatible::messages_to_chat_messages(&[Message::user("a cat photo")]);
        assert_eq!(
            mapped,
            vec![serde_json::json!({ "role": "user", "content": "a cat photo" })]
        );
    }

    #[test]
    fn body_omits_unset_sampling_params() {
        let request: GenerateRequest = vec![Message::user("hi")].into();
        let (body, _) = OpenAICompatible::build_body("o3-mini", &request);
        assert!(!body.contains_key("temperature"));
        assert!(!body.contains_key("max_tokens"));

        let mut request: GenerateRequest = vec![Message::user("hi")].into();
        request.temperature = Some(0.0);
        request.max_tokens = Some(1000);
        let (body, _) = OpenAICompatible::build_body("gpt-4o", &request);
        assert_eq!(body.get("max_tokens"), Some(&Value::from(1000)));
        assert_eq!(body.get("temperature").and_then(Value::as_f64), Some(0.0));
    }

    #[test]
    fn usage_total_is_derived_when_missing() {
        let usage = OpenAICompatible::parse_usage(&serde_json::json!({
            "prompt_tokens": 10,
            "completion_tokens": 4
        }));
        assert_eq!(usage.total_tokens, Some(14));
    }

    #[test]
    fn missing_model_is_an_error() {
        let client = OpenAICompatible::new("");
        let request: GenerateRequest = vec![Message::user("hi")].into();
        assert!(client.resolve_model(&request).is_err());
    }
}
