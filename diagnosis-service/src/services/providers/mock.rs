//! Mock provider implementations for testing and local development.

use super::{
    ChatMessage, EntityProvider, EntitySpan, FinishReason, GenerationParams, ProviderError,
    ProviderResponse, Role, TextProvider, Transcript, TranscriptionProvider,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Structured diagnosis the mock text provider answers with by default.
pub const MOCK_DIAGNOSIS_JSON: &str = r#"{"diagnosis":"Viral infection","confidence":70,"drugInteractionAlert":"None known","dosageRecommendation":"Paracetamol 500mg every 6 hours as needed","referralAdvice":"See a doctor if fever persists beyond 3 days."}"#;

/// Conditions the mock entity provider recognizes by keyword.
const MOCK_DISEASE_TERMS: &[&str] = &[
    "asthma",
    "cancer",
    "diabetes",
    "hypertension",
    "influenza",
    "malaria",
    "migraine",
    "pneumonia",
    "tuberculosis",
];

/// Mock text provider for testing.
///
/// Scripted replies are consumed in order; the last one repeats once the
/// script is exhausted. Without a script it answers with
/// [`MOCK_DIAGNOSIS_JSON`] for JSON requests and an echo otherwise.
pub struct MockTextProvider {
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    last: Mutex<Option<Result<String, ProviderError>>>,
    delay: Duration,
    calls: AtomicUsize,
    last_messages: Mutex<Vec<ChatMessage>>,
}

impl MockTextProvider {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            last_messages: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with `text`.
    pub fn with_reply(text: impl Into<String>) -> Self {
        Self::with_script(vec![Ok(text.into())])
    }

    /// Always fail with `error`.
    pub fn failing(error: ProviderError) -> Self {
        Self::with_script(vec![Err(error)])
    }

    pub fn with_script(script: Vec<Result<String, ProviderError>>) -> Self {
        let provider = Self::new();
        if let Ok(mut queue) = provider.script.lock() {
            queue.extend(script);
        }
        provider
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Messages received by the most recent call.
    pub fn last_messages(&self) -> Vec<ChatMessage> {
        self.last_messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    fn next_scripted(&self) -> Option<Result<String, ProviderError>> {
        let mut queue = self.script.lock().ok()?;
        let mut last = self.last.lock().ok()?;
        if let Some(next) = queue.pop_front() {
            *last = Some(next.clone());
            Some(next)
        } else {
            last.clone()
        }
    }
}

impl Default for MockTextProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextProvider for MockTextProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-diagnosis"
    }

    async fn generate(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<ProviderResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_messages.lock() {
            *last = messages.to_vec();
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let text = match self.next_scripted() {
            Some(reply) => reply?,
            None if params.json_output => MOCK_DIAGNOSIS_JSON.to_string(),
            None => {
                let prompt = messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.content.as_str())
                    .unwrap_or_default();
                format!("Mock response for: {}", prompt)
            }
        };

        let input_tokens = messages.iter().map(|m| m.content.len() as i32 / 4).sum();

        Ok(ProviderResponse {
            text: Some(text),
            input_tokens,
            output_tokens: 10,
            finish_reason: FinishReason::Complete,
        })
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        Ok(vec!["mock-diagnosis".to_string()])
    }
}

/// Mock entity provider for testing.
pub struct MockEntityProvider {
    outcome: Option<Result<Vec<EntitySpan>, ProviderError>>,
    calls: AtomicUsize,
}

impl MockEntityProvider {
    /// Tag known condition keywords found in the input as `Disease`.
    pub fn new() -> Self {
        Self {
            outcome: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Always return `spans`, regardless of input.
    pub fn with_spans(spans: Vec<EntitySpan>) -> Self {
        Self {
            outcome: Some(Ok(spans)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: ProviderError) -> Self {
        Self {
            outcome: Some(Err(error)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockEntityProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityProvider for MockEntityProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn extract(&self, text: &str) -> Result<Vec<EntitySpan>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }

        let lowered = text.to_lowercase();
        Ok(MOCK_DISEASE_TERMS
            .iter()
            .filter(|term| lowered.contains(*term))
            .map(|term| EntitySpan {
                entity_group: "Disease".to_string(),
                word: term.to_string(),
                score: Some(0.99),
            })
            .collect())
    }
}

/// Mock transcription provider.
pub struct MockTranscriptionProvider {
    text: String,
}

impl MockTranscriptionProvider {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl Default for MockTranscriptionProvider {
    fn default() -> Self {
        Self::new("I have had a fever and headache for two days.")
    }
}

#[async_trait]
impl TranscriptionProvider for MockTranscriptionProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn transcribe(
        &self,
        audio: Vec<u8>,
        _file_name: &str,
        _mime_type: &str,
        language: &str,
    ) -> Result<Transcript, ProviderError> {
        if audio.is_empty() {
            return Err(ProviderError::InvalidRequest("Empty audio".to_string()));
        }
        Ok(Transcript {
            text: self.text.clone(),
            language: Some(language.to_string()),
        })
    }
}
