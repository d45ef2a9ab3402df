//! Gemini AI provider implementation.
//!
//! Implements text generation using Google's Generative Language API.

use super::{
    http_client, ChatMessage, FinishReason, GenerationParams, ProviderError, ProviderResponse,
    Role, TextProvider,
};
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Gemini API base URL.
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini provider configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Secret<String>,
    pub model: String,
    /// Upper bound for any single HTTP call.
    pub timeout: Duration,
}

/// Gemini text provider.
pub struct GeminiTextProvider {
    config: GeminiConfig,
    client: Client,
}

impl GeminiTextProvider {
    pub fn new(config: GeminiConfig) -> Result<Self, ProviderError> {
        if config.api_key.expose_secret().is_empty() {
            return Err(ProviderError::NotConfigured(
                "Gemini API key not configured".to_string(),
            ));
        }
        let client = http_client(config.timeout)?;
        Ok(Self { config, client })
    }

    /// Build the API URL for the given model and method.
    fn api_url(&self, method: &str) -> String {
        format!("{}/models/{}:{}", GEMINI_API_BASE, self.config.model, method)
    }

    /// Build generation config from parameters.
    fn build_generation_config(&self, params: &GenerationParams) -> GenerationConfig {
        GenerationConfig {
            temperature: params.temperature,
            max_output_tokens: params.max_tokens,
            response_mime_type: params
                .json_output
                .then(|| "application/json".to_string()),
        }
    }
}

/// Split chat messages into Gemini's system instruction and turn contents.
fn build_contents(messages: &[ChatMessage]) -> (Option<Content>, Vec<Content>) {
    let system_text: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();

    let system_instruction = (!system_text.is_empty()).then(|| Content {
        role: None,
        parts: vec![ContentPart::Text {
            text: system_text.join("\n\n"),
        }],
    });

    let contents = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| {
            let mut parts: Vec<ContentPart> = m
                .images
                .iter()
                .map(|img| ContentPart::InlineData {
                    inline_data: InlineData {
                        mime_type: img.mime_type.clone(),
                        data: base64::engine::general_purpose::STANDARD.encode(&img.data),
                    },
                })
                .collect();
            parts.push(ContentPart::Text {
                text: m.content.clone(),
            });

            Content {
                role: Some(match m.role {
                    Role::User => "user".to_string(),
                    _ => "model".to_string(),
                }),
                parts,
            }
        })
        .collect();

    (system_instruction, contents)
}

#[async_trait]
impl TextProvider for GeminiTextProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn generate(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<ProviderResponse, ProviderError> {
        let (system_instruction, contents) = build_contents(messages);

        let request = GenerateContentRequest {
            contents,
            system_instruction,
            generation_config: Some(self.build_generation_config(params)),
        };

        tracing::debug!(
            model = %self.config.model,
            message_count = messages.len(),
            json_output = params.json_output,
            "Sending request to Gemini API"
        );

        let mut builder = self
            .client
            .post(self.api_url("generateContent"))
            .header("x-goog-api-key", self.config.api_key.expose_secret())
            .json(&request);
        if let Some(timeout) = params.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e.without_url()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status("Gemini", status, &error_text));
        }

        let api_response: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ApiError(format!("Failed to parse response: {}", e)))?;

        if api_response
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_ref())
            .is_some()
        {
            return Err(ProviderError::ContentFiltered);
        }

        let candidate = api_response.candidates.first();

        // Concatenate every text part of the first candidate
        let text = candidate
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| match p {
                        ContentPart::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect::<String>()
            })
            .filter(|t| !t.is_empty());

        let usage = api_response.usage_metadata.unwrap_or_default();

        let finish_reason = candidate
            .map(|c| match c.finish_reason.as_deref() {
                Some("STOP") => FinishReason::Complete,
                Some("MAX_TOKENS") => FinishReason::Length,
                Some("SAFETY") | Some("PROHIBITED_CONTENT") => FinishReason::ContentFilter,
                _ => FinishReason::Complete,
            })
            .unwrap_or(FinishReason::Error);

        if finish_reason == FinishReason::ContentFilter {
            return Err(ProviderError::ContentFiltered);
        }

        Ok(ProviderResponse {
            text,
            input_tokens: usage.prompt_token_count.unwrap_or(0),
            output_tokens: usage.candidates_token_count.unwrap_or(0),
            finish_reason,
        })
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let response = self
            .client
            .get(format!("{}/models", GEMINI_API_BASE))
            .header("x-goog-api-key", self.config.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e.without_url()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status("Gemini", status, &error_text));
        }

        let listing: ListModelsResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ApiError(format!("Failed to parse model list: {}", e)))?;

        Ok(generation_models(listing))
    }
}

/// Keep models that support `generateContent`, without the `models/` prefix.
fn generation_models(listing: ListModelsResponse) -> Vec<String> {
    listing
        .models
        .into_iter()
        .filter(|m| {
            m.supported_generation_methods
                .iter()
                .any(|method| method == "generateContent")
        })
        .map(|m| m.name.trim_start_matches("models/").to_string())
        .collect()
}

// ============================================================================
// Gemini API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<ContentPart>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum ContentPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<i32>,
    candidates_token_count: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelInfo {
    name: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::providers::InlineImage;

    #[test]
    fn system_messages_become_system_instruction() {
        let messages = vec![
            ChatMessage::system("be brief"),
            ChatMessage::user("hello"),
            ChatMessage::assistant("hi"),
        ];

        let (system, contents) = build_contents(&messages);
        let system = serde_json::to_value(system.unwrap()).unwrap();
        assert_eq!(system["parts"][0]["text"], "be brief");

        let contents = serde_json::to_value(&contents).unwrap();
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
    }

    #[test]
    fn images_are_sent_as_inline_data_before_text() {
        let messages = vec![ChatMessage::user("what is this rash?").with_image(InlineImage {
            mime_type: "image/png".into(),
            data: vec![1, 2, 3],
        })];

        let (_, contents) = build_contents(&messages);
        let value = serde_json::to_value(&contents).unwrap();
        assert_eq!(value[0]["parts"][0]["inlineData"]["mimeType"], "image/png");
        assert_eq!(value[0]["parts"][0]["inlineData"]["data"], "AQID");
        assert_eq!(value[0]["parts"][1]["text"], "what is this rash?");
    }

    #[test]
    fn json_output_sets_response_mime_type() {
        let provider = GeminiTextProvider::new(GeminiConfig {
            api_key: Secret::new("key".into()),
            model: "gemini-2.0-flash".into(),
            timeout: Duration::from_secs(5),
        })
        .unwrap();

        let config = provider.build_generation_config(&GenerationParams {
            temperature: Some(0.2),
            max_tokens: Some(500),
            json_output: true,
            timeout: None,
        });
        let value = serde_json::to_value(config).unwrap();
        assert_eq!(value["responseMimeType"], "application/json");
        assert_eq!(value["maxOutputTokens"], 500);
    }

    #[test]
    fn empty_key_is_rejected() {
        let result = GeminiTextProvider::new(GeminiConfig {
            api_key: Secret::new(String::new()),
            model: "gemini-2.0-flash".into(),
            timeout: Duration::from_secs(5),
        });
        assert!(matches!(result, Err(ProviderError::NotConfigured(_))));
    }

    #[test]
    fn model_listing_keeps_generation_models() {
        let listing: ListModelsResponse = serde_json::from_str(
            r#"{"models":[
                {"name":"models/gemini-2.0-flash","supportedGenerationMethods":["generateContent","countTokens"]},
                {"name":"models/text-embedding-004","supportedGenerationMethods":["embedContent"]}
            ]}"#,
        )
        .unwrap();

        assert_eq!(generation_models(listing), vec!["gemini-2.0-flash".to_string()]);
    }

    #[test]
    fn response_parts_deserialize() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"{\"diagnosis\":"},{"text":"\"Flu\"}"}]},"finishReason":"STOP"}]}"#,
        )
        .unwrap();
        let parts = &response.candidates[0].content.as_ref().unwrap().parts;
        assert_eq!(parts.len(), 2);
    }
}
