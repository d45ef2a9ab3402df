//! Persisted audit record: one row per completed diagnosis call.

use super::{DiagnosisRequest, DiagnosisResult};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A record ready to be appended. The store assigns `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub symptoms: String,
    pub history: Option<String>,
    pub vitals: Option<String>,
    pub language: String,
    pub diagnosis: String,
    pub confidence: Option<u8>,
    pub drug_interaction_alert: Option<String>,
    pub dosage_recommendation: Option<String>,
    pub referral_advice: Option<String>,
    pub extracted_diseases: Vec<String>,
    /// Outcome marker: `generated`, `fallback` or `failed`.
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl NewRecord {
    pub fn from_parts(request: &DiagnosisRequest, result: &DiagnosisResult) -> Self {
        Self {
            symptoms: request.symptoms.clone(),
            history: request.history.clone(),
            vitals: request.vitals.clone(),
            language: request.language.clone(),
            diagnosis: result.diagnosis.clone(),
            confidence: result.confidence,
            drug_interaction_alert: result.drug_interaction_alert.clone(),
            dosage_recommendation: result.dosage_recommendation.clone(),
            referral_advice: result.referral_advice.clone(),
            extracted_diseases: result.extracted_diseases.iter().cloned().collect(),
            status: result.outcome.as_str().to_string(),
            created_at: Utc::now(),
        }
    }
}

/// A stored row as read back from the `records` table.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: i64,
    pub symptoms: String,
    pub history: Option<String>,
    pub vitals: Option<String>,
    pub language: String,
    pub diagnosis: String,
    pub confidence: Option<i64>,
    pub drug_interaction_alert: Option<String>,
    pub dosage_recommendation: Option<String>,
    pub referral_advice: Option<String>,
    /// JSON array text.
    pub extracted_diseases: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl Record {
    pub fn extracted_disease_list(&self) -> Vec<String> {
        serde_json::from_str(&self.extracted_diseases).unwrap_or_default()
    }
}
