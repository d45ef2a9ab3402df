//! Inbound diagnosis payload and its validation.

use serde::Deserialize;

pub const SYMPTOMS_REQUIRED: &str = "Symptoms are required.";
pub const VITALS_NOT_A_NUMBER: &str = "Vitals must be a valid number.";
pub const VITALS_OUT_OF_RANGE: &str = "Vitals temperature must be between 30 and 45 °C.";

/// Plausible body temperature range in Celsius, inclusive.
const MIN_TEMPERATURE_C: f64 = 30.0;
const MAX_TEMPERATURE_C: f64 = 45.0;

const DEFAULT_LANGUAGE: &str = "en";

/// Vital signs as sent by clients: either free text or a bare temperature.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Vitals {
    Number(f64),
    Text(String),
}

/// Raw `POST /diagnose` body. Every field is optional on the wire so that
/// all rule violations can be reported together.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiagnosisPayload {
    #[serde(default)]
    pub symptoms: Option<String>,
    #[serde(default)]
    pub history: Option<String>,
    #[serde(default)]
    pub vitals: Option<Vitals>,
    #[serde(default)]
    pub language: Option<String>,
}

/// A validated, normalized diagnosis request.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosisRequest {
    pub symptoms: String,
    pub history: Option<String>,
    pub vitals: Option<String>,
    pub language: String,
}

impl DiagnosisRequest {
    /// Text handed to the disease extractor.
    pub fn extraction_text(&self) -> String {
        match &self.history {
            Some(history) => format!("{} {}", self.symptoms, history),
            None => self.symptoms.clone(),
        }
    }
}

impl DiagnosisPayload {
    /// Check every rule and either return the normalized request or all
    /// violations in rule order. Pure: no I/O.
    pub fn validate(&self) -> Result<DiagnosisRequest, Vec<String>> {
        let mut errors = Vec::new();

        let symptoms = non_blank(self.symptoms.as_deref());
        if symptoms.is_none() {
            errors.push(SYMPTOMS_REQUIRED.to_string());
        }

        let vitals = match &self.vitals {
            None => None,
            Some(Vitals::Number(value)) => {
                check_temperature(*value, &mut errors);
                Some(format_number(*value))
            }
            Some(Vitals::Text(text)) => match non_blank(Some(text)) {
                None => None,
                Some(trimmed) => {
                    match trimmed.parse::<f64>() {
                        Ok(value) if value.is_finite() => check_temperature(value, &mut errors),
                        _ => errors.push(VITALS_NOT_A_NUMBER.to_string()),
                    }
                    Some(trimmed)
                }
            },
        };

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(DiagnosisRequest {
            symptoms: symptoms.unwrap_or_default(),
            history: non_blank(self.history.as_deref()),
            vitals,
            language: non_blank(self.language.as_deref())
                .map(|l| l.to_ascii_lowercase())
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
        })
    }
}

fn check_temperature(value: f64, errors: &mut Vec<String>) {
    if !(MIN_TEMPERATURE_C..=MAX_TEMPERATURE_C).contains(&value) {
        errors.push(VITALS_OUT_OF_RANGE.to_string());
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}
