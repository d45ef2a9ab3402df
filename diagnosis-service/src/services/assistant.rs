//! Conversational health assistant and image analysis.

use crate::models::ChatTurn;
use crate::services::generator::{language_name, GeneratorSettings};
use crate::services::metrics;
use crate::services::providers::{
    ChatMessage, GenerationParams, InlineImage, ProviderError, Role, TextProvider,
};
use service_core::retry::retry_call;
use std::sync::Arc;
use std::time::Instant;

/// Prior turns forwarded to the model.
pub const MAX_HISTORY_TURNS: usize = 20;

pub const CONNECTION_ERROR_REPLY: &str =
    "⚠️ **Connection Error:** I couldn't reach the AI service. Please try again in a moment.";

const CHAT_SYSTEM_PROMPT: &str = "You are a friendly rural health assistant. You help with \
symptom checks, simple home remedies and emergency advice. Keep answers short and practical, \
use Markdown, and always tell the user to seek a doctor or the nearest health centre when \
symptoms are severe or persistent. Never claim to be a doctor.";

const IMAGE_SYSTEM_PROMPT: &str = "You are a clinical assistant reviewing a photo taken by a \
community health worker. Describe the visible findings, list possible conditions with a \
confidence estimate, and say whether the patient should be referred. Your assessment is \
advisory only.";

#[derive(Clone)]
pub struct ChatAssistant {
    provider: Arc<dyn TextProvider>,
    settings: GeneratorSettings,
}

impl ChatAssistant {
    pub fn new(provider: Arc<dyn TextProvider>, settings: GeneratorSettings) -> Self {
        Self { provider, settings }
    }

    pub fn provider(&self) -> &Arc<dyn TextProvider> {
        &self.provider
    }

    /// Answer `message` in the context of `history`. Failures become a
    /// connection-problem reply.
    #[tracing::instrument(skip_all, fields(history_len = history.len(), language = %language))]
    pub async fn reply(&self, message: &str, history: &[ChatTurn], language: &str) -> String {
        let messages = chat_messages(message, history, language);

        match self.call(&messages, "chat").await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "Chat reply failed");
                CONNECTION_ERROR_REPLY.to_string()
            }
        }
    }

    /// Describe an uploaded clinical photo. Failures are explained in the returned text.
    #[tracing::instrument(skip_all, fields(mime_type = %image.mime_type, bytes = image.data.len()))]
    pub async fn analyze_image(
        &self,
        image: InlineImage,
        notes: Option<&str>,
        language: &str,
    ) -> String {
        let mut prompt = String::from("Analyze this image.");
        if let Some(notes) = notes.map(str::trim).filter(|n| !n.is_empty()) {
            prompt.push_str(&format!("\nHealth worker notes: {}", notes));
        }
        prompt.push_str(&format!("\nRespond in {}.", language_name(language)));

        let messages = vec![
            ChatMessage::system(IMAGE_SYSTEM_PROMPT),
            ChatMessage::user(prompt).with_image(image),
        ];

        match self.call(&messages, "analyze_image").await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "Image analysis failed");
                format!("Image analysis is currently unavailable: {}", e)
            }
        }
    }

    async fn call(
        &self,
        messages: &[ChatMessage],
        operation: &'static str,
    ) -> Result<String, ProviderError> {
        let params = GenerationParams {
            temperature: Some(self.settings.temperature),
            max_tokens: Some(self.settings.max_tokens),
            json_output: false,
            timeout: Some(self.settings.timeout),
        };

        let start = Instant::now();
        let call = retry_call(&self.settings.retry, operation, || {
            self.provider.generate(messages, &params)
        });
        let outcome = tokio::time::timeout(self.settings.timeout, call)
            .await
            .unwrap_or(Err(ProviderError::Timeout(self.settings.timeout)));
        metrics::record_provider_latency(
            self.provider.name(),
            operation,
            start.elapsed().as_secs_f64(),
        );

        let text = outcome
            .map_err(|e| {
                metrics::record_provider_error(self.provider.name(), e.kind());
                e
            })?
            .text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ProviderError::ApiError("empty response from model".to_string()))?;

        Ok(text)
    }
}

/// System prompt, the most recent history turns, then the new message.
///
/// Client-sent system turns are dropped, and leading assistant turns are
/// skipped so the conversation opens with the user.
fn chat_messages(message: &str, history: &[ChatTurn], language: &str) -> Vec<ChatMessage> {
    let system = format!(
        "{} Reply in {}.",
        CHAT_SYSTEM_PROMPT,
        language_name(language)
    );

    let recent = &history[history.len().saturating_sub(MAX_HISTORY_TURNS)..];
    let turns = recent
        .iter()
        .filter(|t| !t.content.trim().is_empty())
        .filter_map(|t| match Role::from_client(&t.role) {
            Role::User => Some(ChatMessage::user(t.content.trim())),
            Role::Assistant => Some(ChatMessage::assistant(t.content.trim())),
            Role::System => None,
        })
        .skip_while(|m| m.role != Role::User);

    std::iter::once(ChatMessage::system(system))
        .chain(turns)
        .chain(std::iter::once(ChatMessage::user(message.trim())))
        .collect()
}
