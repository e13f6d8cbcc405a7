//! Chat-completion providers compared by the evaluation harness
//!
//! Every provider takes a system prompt and one user message and returns
//! the reply text, at temperature 0.

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

use crate::assistant::search::output_text;
use crate::config::{EvalConfig, OpenAiConfig};

use super::prompts::Suite;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("response contained no text")]
    EmptyResponse,
    #[error("{0} is not configured")]
    MissingKey(&'static str),
    #[error("unknown provider {0:?}")]
    Unknown(String),
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Short provider label used in results and metrics
    fn name(&self) -> &str;
    fn model(&self) -> &str;
    async fn complete(&self, system: &str, user: &str) -> Result<String, ProviderError>;
}

/// Provider labels accepted by [`build_providers`]
pub const PROVIDER_NAMES: [&str; 6] = ["openai", "anthropic", "gemini", "deepseek", "mistral", "qwen"];

/// Instantiate the named providers from configuration, sized for `suite`
pub fn build_providers(
    names: &[String],
    openai: &OpenAiConfig,
    eval: &EvalConfig,
    suite: Suite,
) -> Result<Vec<Box<dyn ChatProvider>>, ProviderError> {
    names
        .iter()
        .map(|name| -> Result<Box<dyn ChatProvider>, ProviderError> {
            let provider: Box<dyn ChatProvider> = match name.trim().to_lowercase().as_str() {
                "openai" => Box::new(OpenAiResponses::new(
                    &openai.base_url,
                    require(&openai.api_key, "openai.api_key")?,
                    &eval.openai_model,
                )),
                "anthropic" => Box::new(AnthropicMessages::new(
                    require(&eval.anthropic_api_key, "eval.anthropic_api_key")?,
                    &eval.anthropic_model,
                    suite.max_tokens(),
                )),
                "gemini" => Box::new(GeminiGenerate::new(
                    require(&eval.gemini_api_key, "eval.gemini_api_key")?,
                    &eval.gemini_model,
                )),
                label @ ("deepseek" | "mistral" | "qwen") => {
                    let model = match label {
                        "deepseek" => &eval.deepseek_model,
                        "mistral" => &eval.mistral_model,
                        _ => &eval.qwen_model,
                    };
                    Box::new(TogetherChat::new(
                        label,
                        require(&eval.together_api_key, "eval.together_api_key")?,
                        model,
                    ))
                }
                other => return Err(ProviderError::Unknown(other.to_string())),
            };
            Ok(provider)
        })
        .collect()
}

fn require<'a>(value: &'a str, setting: &'static str) -> Result<&'a str, ProviderError> {
    if value.trim().is_empty() {
        Err(ProviderError::MissingKey(setting))
    } else {
        Ok(value)
    }
}

async fn post_json(request: reqwest::RequestBuilder, body: &Value) -> Result<Value, ProviderError> {
    let response = request.json(body).send().await?;
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(ProviderError::Api {
            status: status.as_u16(),
            message: error_message(&text),
        });
    }
    serde_json::from_str(&text).map_err(|_| ProviderError::EmptyResponse)
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

fn non_empty(text: Option<String>) -> Result<String, ProviderError> {
    match text.map(|t| t.trim().to_string()) {
        Some(t) if !t.is_empty() => Ok(t),
        _ => Err(ProviderError::EmptyResponse),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAI Responses
// ─────────────────────────────────────────────────────────────────────────────

pub struct OpenAiResponses {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiResponses {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChatProvider for OpenAiResponses {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String, ProviderError> {
        let body = json!({
            "model": self.model,
            "instructions": system,
            "input": user,
            "temperature": 0
        });
        let request = self
            .client
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(&self.api_key);
        let value = post_json(request, &body).await?;
        non_empty(output_text(&value))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Anthropic Messages
// ─────────────────────────────────────────────────────────────────────────────

pub struct AnthropicMessages {
    api_key: String,
    model: String,
    max_tokens: u32,
    client: reqwest::Client,
}

impl AnthropicMessages {
    pub fn new(api_key: &str, model: &str, max_tokens: u32) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            max_tokens,
            client: reqwest::Client::new(),
        }
    }

    /// Messages API request body
    pub fn request_body(&self, system: &str, user: &str) -> Value {
        json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": 0,
            "system": system,
            "messages": [{"role": "user", "content": user}]
        })
    }
}

/// Text of the first `text` block of a Messages response
pub fn anthropic_text(response: &Value) -> Option<String> {
    response["content"]
        .as_array()?
        .iter()
        .find(|block| block["type"] == "text")
        .and_then(|block| block["text"].as_str())
        .map(str::to_string)
}

#[async_trait]
impl ChatProvider for AnthropicMessages {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String, ProviderError> {
        let body = self.request_body(system, user);
        let request = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01");
        let value = post_json(request, &body).await?;
        non_empty(anthropic_text(&value))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Gemini generateContent
// ─────────────────────────────────────────────────────────────────────────────

pub struct GeminiGenerate {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl GeminiGenerate {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

/// Concatenated text parts of the first candidate
pub fn gemini_text(response: &Value) -> Option<String> {
    let parts = response["candidates"][0]["content"]["parts"].as_array()?;
    Some(
        parts
            .iter()
            .filter_map(|p| p["text"].as_str())
            .collect::<Vec<_>>()
            .join(""),
    )
}

#[async_trait]
impl ChatProvider for GeminiGenerate {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String, ProviderError> {
        // Gemini gets the instructions inline, ahead of the case
        let body = json!({
            "contents": [{"role": "user", "parts": [{"text": format!("{}\n\n{}", system, user)}]}],
            "generationConfig": {"temperature": 0.0}
        });
        let request = self
            .client
            .post(format!(
                "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
                self.model
            ))
            .header("x-goog-api-key", &self.api_key);
        let value = post_json(request, &body).await?;
        non_empty(gemini_text(&value))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Together chat completions (open-weight models)
// ─────────────────────────────────────────────────────────────────────────────

pub struct TogetherChat {
    label: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl TogetherChat {
    pub fn new(label: &str, api_key: &str, model: &str) -> Self {
        Self {
            label: label.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

/// `choices[0].message.content` of a chat completion
pub fn chat_completion_text(response: &Value) -> Option<String> {
    response["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
}

#[async_trait]
impl ChatProvider for TogetherChat {
    fn name(&self) -> &str {
        &self.label
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String, ProviderError> {
        let body = json!({
            "model": self.model,
            "temperature": 0.0,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user}
            ]
        });
        let request = self
            .client
            .post("https://api.together.xyz/v1/chat/completions")
            .bearer_auth(&self.api_key);
        let value = post_json(request, &body).await?;
        non_empty(chat_completion_text(&value))
    }
}
