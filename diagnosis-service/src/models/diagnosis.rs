//! Diagnosis result returned to callers and persisted with each record.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// How the diagnosis text was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationOutcome {
    /// The capability answered and the answer was usable.
    Generated,
    /// The capability answered but its output could not be parsed.
    Fallback,
    /// The capability call itself failed or timed out.
    Failed,
}

impl GenerationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationOutcome::Generated => "generated",
            GenerationOutcome::Fallback => "fallback",
            GenerationOutcome::Failed => "failed",
        }
    }
}

impl fmt::Display for GenerationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the diagnosis generator, before entity extraction is merged in.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedDiagnosis {
    pub diagnosis: String,
    pub confidence: Option<u8>,
    pub drug_interaction_alert: Option<String>,
    pub dosage_recommendation: Option<String>,
    pub referral_advice: Option<String>,
    pub outcome: GenerationOutcome,
}

impl GeneratedDiagnosis {
    /// Substitute used when structured output cannot be parsed.
    pub fn fallback() -> Self {
        Self {
            diagnosis: "Unable to determine diagnosis accurately.".to_string(),
            confidence: Some(0),
            drug_interaction_alert: Some("Unknown".to_string()),
            dosage_recommendation: Some("Consult local guidelines".to_string()),
            referral_advice: Some("Consult specialist if symptoms worsen.".to_string()),
            outcome: GenerationOutcome::Fallback,
        }
    }

    /// Result used when the capability call fails outright.
    pub fn failed(cause: impl fmt::Display) -> Self {
        Self {
            diagnosis: format!("Error during diagnosis generation: {}", cause),
            confidence: Some(0),
            drug_interaction_alert: Some("N/A".to_string()),
            dosage_recommendation: Some("N/A".to_string()),
            referral_advice: Some("N/A".to_string()),
            outcome: GenerationOutcome::Failed,
        }
    }
}

/// Final pipeline output. Built once and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisResult {
    pub extracted_diseases: BTreeSet<String>,
    pub diagnosis: String,
    pub confidence: Option<u8>,
    pub drug_interaction_alert: Option<String>,
    pub dosage_recommendation: Option<String>,
    pub referral_advice: Option<String>,
    #[serde(skip)]
    pub outcome: GenerationOutcome,
}

impl DiagnosisResult {
    pub fn new(generated: GeneratedDiagnosis, extracted_diseases: BTreeSet<String>) -> Self {
        Self {
            extracted_diseases,
            diagnosis: generated.diagnosis,
            confidence: generated.confidence,
            drug_interaction_alert: generated.drug_interaction_alert,
            dosage_recommendation: generated.dosage_recommendation,
            referral_advice: generated.referral_advice,
            outcome: generated.outcome,
        }
    }
}
