//! Diagnosis generation over a generative-text capability.
//!
//! Builds the clinical prompt, calls the provider under a soft deadline with
//! retries for transient failures, and turns whatever comes back into a
//! [`GeneratedDiagnosis`]. Nothing here returns an error to the caller.

use crate::config::{LlmConfig, ResponseMode};
use crate::models::{DiagnosisRequest, GeneratedDiagnosis, GenerationOutcome};
use crate::services::metrics;
use crate::services::providers::{ChatMessage, GenerationParams, ProviderError, TextProvider};
use serde::Deserialize;
use serde_json::Value;
use service_core::retry::{retry_call, RetryConfig};
use std::sync::Arc;
use std::time::{Duration, Instant};

const SYSTEM_PROMPT: &str = "You are a clinical decision-support assistant for community health \
workers in rural areas. Your suggestions are advisory and must be confirmed by a qualified clinician.";

const INSTRUCTIONS: &str = "Provide a differential diagnosis with a confidence score (0-100), \
suggested treatment, possible drug interactions, dosage guidance and referral advice.";

const JSON_SHAPE: &str = "Respond only with a JSON object of this exact shape: \
{\"diagnosis\": string, \"confidence\": integer 0-100, \"drugInteractionAlert\": string, \
\"dosageRecommendation\": string, \"referralAdvice\": string}. \
Keep the JSON keys in English.";

/// Human-readable name for a supported language code.
pub fn language_name(code: &str) -> &str {
    match code {
        "en" => "English",
        "hi" => "Hindi",
        "ta" => "Tamil",
        "te" => "Telugu",
        "bn" => "Bengali",
        other => other,
    }
}

/// Tunables for one generator instance.
#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub max_tokens: i32,
    pub temperature: f32,
    /// Soft deadline for the whole call, retries included.
    pub timeout: Duration,
    pub retry: RetryConfig,
    pub response_mode: ResponseMode,
}

impl GeneratorSettings {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_secs),
            retry: RetryConfig::with_max_retries(config.max_retries),
            response_mode: config.response_mode,
        }
    }
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            max_tokens: 500,
            temperature: 0.2,
            timeout: Duration::from_secs(30),
            retry: RetryConfig::with_max_retries(1),
            response_mode: ResponseMode::Structured,
        }
    }
}

#[derive(Clone)]
pub struct DiagnosisGenerator {
    provider: Arc<dyn TextProvider>,
    settings: GeneratorSettings,
}

impl DiagnosisGenerator {
    pub fn new(provider: Arc<dyn TextProvider>, settings: GeneratorSettings) -> Self {
        Self { provider, settings }
    }

    #[tracing::instrument(
        skip(self, request),
        fields(provider = self.provider.name(), model = self.provider.model())
    )]
    pub async fn generate(&self, request: &DiagnosisRequest) -> GeneratedDiagnosis {
        let mode = self.settings.response_mode;
        let messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(build_prompt(request, mode)),
        ];
        let params = GenerationParams {
            temperature: Some(self.settings.temperature),
            max_tokens: Some(self.settings.max_tokens),
            json_output: mode == ResponseMode::Structured,
            timeout: Some(self.settings.timeout),
        };

        let start = Instant::now();
        let call = retry_call(&self.settings.retry, "generate_diagnosis", || {
            self.provider.generate(&messages, &params)
        });
        let outcome = tokio::time::timeout(self.settings.timeout, call).await;
        metrics::record_provider_latency(
            self.provider.name(),
            "generate",
            start.elapsed().as_secs_f64(),
        );

        let response = match outcome {
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.settings.timeout.as_secs_f64(),
                    "Diagnosis generation exceeded deadline"
                );
                let err = ProviderError::Timeout(self.settings.timeout);
                metrics::record_provider_error(self.provider.name(), err.kind());
                return GeneratedDiagnosis::failed(err);
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Diagnosis generation failed");
                metrics::record_provider_error(self.provider.name(), e.kind());
                return GeneratedDiagnosis::failed(e);
            }
            Ok(Ok(response)) => response,
        };

        let Some(text) = response.text.filter(|t| !t.trim().is_empty()) else {
            tracing::warn!("Model returned no text");
            return GeneratedDiagnosis::failed("the model returned an empty response");
        };

        tracing::debug!(
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "Diagnosis generated"
        );

        match mode {
            ResponseMode::Structured => parse_structured(&text),
            ResponseMode::FreeText => free_text(&text),
        }
    }
}

/// Build the user prompt; symptoms, history and vitals are embedded verbatim.
pub fn build_prompt(request: &DiagnosisRequest, mode: ResponseMode) -> String {
    let mut prompt = format!(
        "Patient symptoms: {}\nMedical history: {}\nVital signs: {}\n\n{}\nRespond in {}.",
        request.symptoms,
        request.history.as_deref().unwrap_or("None provided"),
        request.vitals.as_deref().unwrap_or("Not recorded"),
        INSTRUCTIONS,
        language_name(&request.language),
    );

    if mode == ResponseMode::Structured {
        prompt.push('\n');
        prompt.push_str(JSON_SHAPE);
    }
    prompt
}

fn free_text(text: &str) -> GeneratedDiagnosis {
    GeneratedDiagnosis {
        diagnosis: text.trim().to_string(),
        confidence: None,
        drug_interaction_alert: None,
        dosage_recommendation: None,
        referral_advice: None,
        outcome: GenerationOutcome::Generated,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StructuredDiagnosis {
    #[serde(default)]
    diagnosis: Value,
    #[serde(default)]
    confidence: Value,
    #[serde(default, alias = "drug_interaction_alert")]
    drug_interaction_alert: Value,
    #[serde(default, alias = "dosage_recommendation")]
    dosage_recommendation: Value,
    #[serde(default, alias = "referral_advice")]
    referral_advice: Value,
}

/// Parse model output expected to hold the JSON diagnosis object.
///
/// Anything unusable becomes [`GeneratedDiagnosis::fallback`].
pub fn parse_structured(text: &str) -> GeneratedDiagnosis {
    let Some(parsed) = decode_object(text) else {
        tracing::warn!("Model output was not valid diagnosis JSON, using fallback");
        return GeneratedDiagnosis::fallback();
    };

    let Some(diagnosis) = value_text(&parsed.diagnosis) else {
        tracing::warn!("Model output had no diagnosis, using fallback");
        return GeneratedDiagnosis::fallback();
    };

    GeneratedDiagnosis {
        diagnosis,
        confidence: confidence_score(&parsed.confidence),
        drug_interaction_alert: value_text(&parsed.drug_interaction_alert),
        dosage_recommendation: value_text(&parsed.dosage_recommendation),
        referral_advice: value_text(&parsed.referral_advice),
        outcome: GenerationOutcome::Generated,
    }
}

fn decode_object(text: &str) -> Option<StructuredDiagnosis> {
    let body = strip_code_fence(text);
    if let Some(parsed) = object_from_str(body) {
        return Some(parsed);
    }

    // Prose around the object
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    if end <= start {
        return None;
    }
    object_from_str(&body[start..=end])
}

/// Only a JSON object counts; derived struct impls would also take arrays.
fn object_from_str(text: &str) -> Option<StructuredDiagnosis> {
    match serde_json::from_str::<Value>(text).ok()? {
        value @ Value::Object(_) => serde_json::from_value(value).ok(),
        _ => None,
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string, e.g. ```json
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.trim_end().trim_end_matches("```").trim()
}

/// Render a JSON value as display text; blanks and nulls are absent.
fn value_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(value_text)
            .collect::<Vec<_>>()
            .join("; "),
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

/// Coerce a confidence value into 0..=100. Absent or null stays absent;
/// unreadable values count as 0.
fn confidence_score(value: &Value) -> Option<u8> {
    let raw = match value {
        Value::Null => return None,
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    };
    match raw {
        Some(v) if v.is_finite() => Some(v.round().clamp(0.0, 100.0) as u8),
        _ => Some(0),
    }
}
