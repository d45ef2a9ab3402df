//! OpenAI-compatible provider (OpenAI, Groq and any server speaking the same API).
//!
//! Covers chat completions, model listing and Whisper-style audio transcription.

use super::{
    http_client, ChatMessage, FinishReason, GenerationParams, ProviderError, ProviderResponse,
    Role, TextProvider, Transcript, TranscriptionProvider,
};
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const GROQ_API_BASE: &str = "https://api.groq.com/openai/v1";

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Name used in logs and error messages, e.g. `openai` or `groq`.
    pub provider_name: String,
    pub api_key: Secret<String>,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

/// Chat-completions text provider.
pub struct OpenAiTextProvider {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiTextProvider {
    pub fn new(config: OpenAiConfig) -> Result<Self, ProviderError> {
        if config.api_key.expose_secret().is_empty() {
            return Err(ProviderError::NotConfigured(format!(
                "{} API key not configured",
                config.provider_name
            )));
        }
        let client = http_client(config.timeout)?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

fn to_api_messages(messages: &[ChatMessage]) -> Vec<ApiMessage> {
    messages
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            };

            let content = if m.images.is_empty() {
                ApiContent::Text(m.content.clone())
            } else {
                let mut parts = vec![ApiContentPart::Text {
                    text: m.content.clone(),
                }];
                parts.extend(m.images.iter().map(|img| ApiContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!(
                            "data:{};base64,{}",
                            img.mime_type,
                            base64::engine::general_purpose::STANDARD.encode(&img.data)
                        ),
                    },
                }));
                ApiContent::Parts(parts)
            };

            ApiMessage {
                role: role.to_string(),
                content,
            }
        })
        .collect()
}

#[async_trait]
impl TextProvider for OpenAiTextProvider {
    fn name(&self) -> &str {
        &self.config.provider_name
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn generate(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<ProviderResponse, ProviderError> {
        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: to_api_messages(messages),
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            response_format: params.json_output.then(|| ResponseFormat {
                kind: "json_object".to_string(),
            }),
        };

        tracing::debug!(
            provider = %self.config.provider_name,
            model = %self.config.model,
            message_count = messages.len(),
            "Sending chat completion request"
        );

        let mut builder = self
            .client
            .post(self.url("chat/completions"))
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&request);
        if let Some(timeout) = params.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(ProviderError::from_reqwest)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(
                &self.config.provider_name,
                status,
                &error_text,
            ));
        }

        let api_response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ApiError(format!("Failed to parse response: {}", e)))?;

        let choice = api_response.choices.into_iter().next();
        let finish_reason = match choice.as_ref().and_then(|c| c.finish_reason.as_deref()) {
            Some("stop") => FinishReason::Complete,
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            Some(_) => FinishReason::Complete,
            None => FinishReason::Error,
        };

        if finish_reason == FinishReason::ContentFilter {
            return Err(ProviderError::ContentFiltered);
        }

        let usage = api_response.usage.unwrap_or_default();

        Ok(ProviderResponse {
            text: choice
                .and_then(|c| c.message.content)
                .filter(|t| !t.is_empty()),
            input_tokens: usage.prompt_tokens.unwrap_or(0),
            output_tokens: usage.completion_tokens.unwrap_or(0),
            finish_reason,
        })
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let response = self
            .client
            .get(self.url("models"))
            .bearer_auth(self.config.api_key.expose_secret())
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(
                &self.config.provider_name,
                status,
                &error_text,
            ));
        }

        let listing: ModelListResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ApiError(format!("Failed to parse model list: {}", e)))?;

        let mut models: Vec<String> = listing.data.into_iter().map(|m| m.id).collect();
        models.sort();
        Ok(models)
    }
}

/// Whisper-style transcription over `/audio/transcriptions`.
pub struct OpenAiTranscriptionProvider {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiTranscriptionProvider {
    pub fn new(config: OpenAiConfig) -> Result<Self, ProviderError> {
        if config.api_key.expose_secret().is_empty() {
            return Err(ProviderError::NotConfigured(format!(
                "{} transcription key not configured",
                config.provider_name
            )));
        }
        let client = http_client(config.timeout)?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl TranscriptionProvider for OpenAiTranscriptionProvider {
    fn name(&self) -> &str {
        &self.config.provider_name
    }

    async fn transcribe(
        &self,
        audio: Vec<u8>,
        file_name: &str,
        mime_type: &str,
        language: &str,
    ) -> Result<Transcript, ProviderError> {
        let part = reqwest::multipart::Part::bytes(audio)
            .file_name(file_name.to_string())
            .mime_str(mime_type)
            .map_err(|e| ProviderError::InvalidRequest(format!("Invalid audio type: {}", e)))?;

        let form = reqwest::multipart::Form::new()
            .text("model", self.config.model.clone())
            .text("language", language.to_string())
            .text("response_format", "json")
            .part("file", part);

        let url = format!(
            "{}/audio/transcriptions",
            self.config.base_url.trim_end_matches('/')
        );

        let response = self
            .client
            .post(url)
            .bearer_auth(self.config.api_key.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(
                &self.config.provider_name,
                status,
                &error_text,
            ));
        }

        let body: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ApiError(format!("Failed to parse transcript: {}", e)))?;

        Ok(Transcript {
            text: body.text.trim().to_string(),
            language: body.language.or_else(|| Some(language.to_string())),
        })
    }
}

// ============================================================================
// API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: ApiContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Parts(Vec<ApiContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct Usage {
    prompt_tokens: Option<i32>,
    completion_tokens: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct ModelListResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
    #[serde(default)]
    language: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::providers::InlineImage;

    #[test]
    fn plain_messages_serialize_as_strings() {
        let messages = to_api_messages(&[
            ChatMessage::system("You are a medical assistant."),
            ChatMessage::user("fever"),
        ]);
        let value = serde_json::to_value(&messages).unwrap();
        assert_eq!(value[0]["role"], "system");
        assert_eq!(value[1]["content"], "fever");
    }

    #[test]
    fn images_become_data_urls() {
        let messages = to_api_messages(&[ChatMessage::user("describe").with_image(InlineImage {
            mime_type: "image/jpeg".into(),
            data: vec![0xff, 0xd8],
        })]);
        let value = serde_json::to_value(&messages).unwrap();
        assert_eq!(value[0]["content"][0]["type"], "text");
        assert_eq!(value[0]["content"][1]["type"], "image_url");
        assert_eq!(
            value[0]["content"][1]["image_url"]["url"],
            "data:image/jpeg;base64,/9g="
        );
    }

    #[test]
    fn json_output_requests_json_object_format() {
        let request = ChatCompletionRequest {
            model: "gpt-4".into(),
            messages: vec![],
            temperature: Some(0.2),
            max_tokens: Some(500),
            response_format: Some(ResponseFormat {
                kind: "json_object".into(),
            }),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["response_format"]["type"], "json_object");
        assert_eq!(value["max_tokens"], 500);
    }

    #[test]
    fn completion_response_parses_without_usage() {
        let response: ChatCompletionResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"ok"},"finish_reason":"stop"}]}"#,
        )
        .unwrap();
        assert_eq!(response.choices[0].message.content.as_deref(), Some("ok"));
        assert!(response.usage.is_none());
    }

    #[test]
    fn base_url_trailing_slash_is_ignored() {
        let provider = OpenAiTextProvider::new(OpenAiConfig {
            provider_name: "groq".into(),
            api_key: Secret::new("key".into()),
            model: "llama".into(),
            base_url: format!("{}/", GROQ_API_BASE),
            timeout: Duration::from_secs(5),
        })
        .unwrap();
        assert_eq!(
            provider.url("chat/completions"),
            "https://api.groq.com/openai/v1/chat/completions"
        );
    }
}
