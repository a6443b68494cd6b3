use reqwest::Client;
use serde_json::Value as JsonValue;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::config::Config;
use crate::error::AiError;

pub type CompletionFuture<'a> = Pin<Box<dyn Future<Output = Result<String, AiError>> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq)]
pub enum UserContent {
    Text(String),
    /// Text plus one image sent as a `data:` URL to a vision model.
    TextWithImage { text: String, image_data_url: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: UserContent,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// The external text-generation service. Implementations return the raw
/// message content; interpreting it is the caller's job.
pub trait CompletionClient: Send + Sync {
    fn complete<'a>(&'a self, request: &'a CompletionRequest) -> CompletionFuture<'a>;
}

/// Client for any OpenAI-compatible `chat/completions` endpoint.
#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    api_key: String,
    base_url: String,
    text_model: String,
    image_model: String,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn new(http: Client, config: &Config) -> Self {
        Self {
            http,
            api_key: config.openai_api_key.clone(),
            base_url: config.ai_base_url.trim_end_matches('/').to_string(),
            text_model: config.ai_model.clone(),
            image_model: config.ai_image_model.clone(),
            timeout: Duration::from_secs(config.ai_timeout_secs),
        }
    }

    fn payload(&self, request: &CompletionRequest) -> JsonValue {
        let (model, user) = match &request.user {
            UserContent::Text(text) => (&self.text_model, serde_json::json!(text)),
            UserContent::TextWithImage {
                text,
                image_data_url,
            } => (
                &self.image_model,
                serde_json::json!([
                    {"type": "text", "text": text},
                    {"type": "image_url", "image_url": {"url": image_data_url}}
                ]),
            ),
        };
        serde_json::json!({
            "model": model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": user}
            ],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "stream": false
        })
    }

    async fn chat(&self, request: &CompletionRequest) -> Result<String, AiError> {
        let payload = self.payload(request);
        let res = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let mut body = res.text().await.unwrap_or_default();
            body.truncate(500);
            tracing::error!(status, body = %body, "AI service returned an error status");
            return Err(AiError::Upstream { status, body });
        }

        let body: JsonValue = res.json().await.map_err(|e| self.map_transport(e))?;
        extract_message_content(&body)
    }

    fn map_transport(&self, err: reqwest::Error) -> AiError {
        if err.is_timeout() {
            tracing::error!(timeout_secs = self.timeout.as_secs(), "AI service timed out");
            AiError::Timeout(self.timeout.as_secs())
        } else {
            tracing::error!(error = %err, "AI service request failed");
            AiError::from(err)
        }
    }
}

impl CompletionClient for OpenAiClient {
    fn complete<'a>(&'a self, request: &'a CompletionRequest) -> CompletionFuture<'a> {
        Box::pin(self.chat(request))
    }
}

/// `choices[0].message.content`, or `NoResponse` when it is absent or blank.
pub fn extract_message_content(body: &JsonValue) -> Result<String, AiError> {
    body.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or(AiError::NoResponse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_first_choice_content() {
        let body = json!({"choices": [{"message": {"role": "assistant", "content": " hi "}}]});
        assert_eq!(extract_message_content(&body).unwrap(), "hi");
    }

    #[test]
    fn empty_choices_is_no_response() {
        assert_eq!(
            extract_message_content(&json!({"choices": []})),
            Err(AiError::NoResponse)
        );
        assert_eq!(
            extract_message_content(&json!({"choices": [{"message": {"content": "   "}}]})),
            Err(AiError::NoResponse)
        );
    }
}
