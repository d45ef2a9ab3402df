use crate::models::{DiagnosisPayload, DiagnosisResult};
use crate::startup::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use service_core::error::AppError;

pub const INVALID_JSON: &str = "Invalid JSON data.";

/// `POST /diagnose`: validate, then run the full pipeline.
///
/// Only malformed bodies and validation failures are non-200.
#[tracing::instrument(skip_all)]
pub async fn diagnose(
    State(state): State<AppState>,
    payload: Result<Json<DiagnosisPayload>, JsonRejection>,
) -> Result<Json<DiagnosisResult>, AppError> {
    let Json(payload) = payload.map_err(|rejection| {
        tracing::debug!(error = %rejection, "Rejected diagnosis body");
        AppError::BadRequest(anyhow::anyhow!(INVALID_JSON))
    })?;

    let request = payload.validate().map_err(|errors| {
        tracing::info!(count = errors.len(), "Diagnosis request failed validation");
        AppError::InvalidInput(errors)
    })?;

    let result = state.pipeline.run(&request).await;

    Ok(Json(result))
}
