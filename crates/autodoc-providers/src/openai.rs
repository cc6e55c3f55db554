//! OpenAI chat completions provider (`primary`).

use async_trait::async_trait;
use autodoc_core::{
    CompletionOptions, CompletionProvider, ProviderError, ProviderKind, ProviderSettings, Result,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::http;

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

const SYSTEM_PROMPT: &str =
    "You are a technical writer. Reply with the complete Markdown document only.";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    key_env: String,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("base_url", &self.base_url)
            .field("has_key", &self.api_key.is_some())
            .finish()
    }
}

impl OpenAiProvider {
    /// `api_key` may be absent; calls then fail with a transport error.
    pub fn new(settings: &ProviderSettings, api_key: Option<String>) -> Result<Self> {
        Ok(Self {
            client: http::client()?,
            base_url: http::trim_base(settings.base_url.as_deref().unwrap_or(OPENAI_API_BASE)),
            api_key,
            key_env: settings.api_key_env.clone(),
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Primary
    }

    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> std::result::Result<String, ProviderError> {
        let Some(key) = self.api_key.as_deref() else {
            return Err(ProviderError::Transport(format!(
                "no API key configured (set ${})",
                self.key_env
            )));
        };

        let body = ChatRequest {
            model: &options.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };
        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %options.model, prompt_chars = prompt.len(), "requesting chat completion");

        let response = self
            .client
            .post(&url)
            .bearer_auth(key)
            .timeout(options.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| http::provider_transport(e, options.timeout))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| http::provider_transport(e, options.timeout))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&text)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| http::excerpt(&text));
            return Err(http::provider_status(status, &message));
        }

        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|e| ProviderError::Malformed(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Malformed("response has no choices".into()))?
            .message
            .content
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(content)
    }
}
