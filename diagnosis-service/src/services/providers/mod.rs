//! External capability abstractions and implementations.
//!
//! Each remote capability (generative text, entity extraction, speech
//! transcription) sits behind a trait so the pipeline can be wired with real
//! backends at startup and with mocks in tests.

pub mod gemini;
pub mod huggingface;
pub mod mock;
pub mod openai;

use async_trait::async_trait;
use service_core::retry::Retryable;
use std::time::Duration;
use thiserror::Error;

/// Error type for provider operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Content filtered")]
    ContentFiltered,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

impl ProviderError {
    /// Map a non-success HTTP status from a provider into an error.
    pub fn from_status(provider: &str, status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            429 => ProviderError::RateLimited,
            400 | 404 | 422 => {
                ProviderError::InvalidRequest(format!("{} API error {}: {}", provider, status, body))
            }
            _ => ProviderError::ApiError(format!("{} API error {}: {}", provider, status, body)),
        }
    }

    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::NetworkError(format!("request timed out: {}", err))
        } else {
            ProviderError::NetworkError(err.to_string())
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::NotConfigured(_) => "not_configured",
            ProviderError::ApiError(_) => "api_error",
            ProviderError::InvalidRequest(_) => "invalid_request",
            ProviderError::RateLimited => "rate_limited",
            ProviderError::ContentFiltered => "content_filtered",
            ProviderError::NetworkError(_) => "network_error",
            ProviderError::Timeout(_) => "timeout",
        }
    }
}

impl Retryable for ProviderError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited | ProviderError::NetworkError(_) | ProviderError::ApiError(_)
        )
    }
}

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Interpret a client-supplied role; anything that is not the user is the assistant.
    pub fn from_client(role: &str) -> Self {
        match role.trim().to_ascii_lowercase().as_str() {
            "user" => Role::User,
            "system" => Role::System,
            _ => Role::Assistant,
        }
    }
}

/// Binary image attached to a user message.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// One message sent to a generative provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub images: Vec<InlineImage>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            images: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            images: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            images: Vec::new(),
        }
    }

    pub fn with_image(mut self, image: InlineImage) -> Self {
        self.images.push(image);
        self
    }
}

/// Result of a generation call.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    /// Generated text, if any.
    pub text: Option<String>,

    /// Input tokens consumed.
    pub input_tokens: i32,

    /// Output tokens generated.
    pub output_tokens: i32,

    /// Finish reason.
    pub finish_reason: FinishReason,
}

/// Reason why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Complete,
    Length,
    ContentFilter,
    Error,
}

/// Generation parameters for AI requests.
#[derive(Debug, Clone, Default)]
pub struct GenerationParams {
    /// Temperature (0.0 - 2.0).
    pub temperature: Option<f32>,

    /// Maximum output tokens.
    pub max_tokens: Option<i32>,

    /// Ask the provider for a JSON object instead of prose.
    pub json_output: bool,

    /// Per-call deadline passed to the HTTP client.
    pub timeout: Option<Duration>,
}

/// One entity span reported by a token-classification model.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySpan {
    /// Entity category, e.g. `Disease`.
    pub entity_group: String,
    pub word: String,
    pub score: Option<f32>,
}

/// Speech-to-text output.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub text: String,
    pub language: Option<String>,
}

/// Trait for text generation providers (Gemini, OpenAI-compatible).
#[async_trait]
pub trait TextProvider: Send + Sync {
    /// Short provider name for logs and metrics.
    fn name(&self) -> &str;

    /// Configured model identifier.
    fn model(&self) -> &str;

    /// Generate a response for the given conversation.
    async fn generate(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<ProviderResponse, ProviderError>;

    /// Models usable for text generation with the configured credentials.
    async fn list_models(&self) -> Result<Vec<String>, ProviderError>;
}

/// Trait for token-classification (NER) providers.
#[async_trait]
pub trait EntityProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Extract whole-entity spans (sub-tokens already aggregated).
    async fn extract(&self, text: &str) -> Result<Vec<EntitySpan>, ProviderError>;
}

/// Trait for speech transcription providers.
#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Transcribe `audio`; `language` is an ISO-639-1 hint.
    async fn transcribe(
        &self,
        audio: Vec<u8>,
        file_name: &str,
        mime_type: &str,
        language: &str,
    ) -> Result<Transcript, ProviderError>;
}

/// Build a shared HTTP client with a hard request timeout.
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::NotConfigured(format!("Failed to create HTTP client: {}", e)))
}
