//! Response bodies for the transcription, image and model-listing endpoints.

use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct TranscriptionResponse {
    /// `None` when the capability failed.
    pub transcript: Option<String>,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ImageAnalysisResponse {
    pub analysis: String,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub provider: String,
    pub models: Vec<String>,
}

/// Trim and lowercase a client language code, defaulting to English.
pub fn normalize_language(language: Option<&str>) -> String {
    language
        .map(|l| l.trim().to_lowercase())
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| "en".to_string())
}
