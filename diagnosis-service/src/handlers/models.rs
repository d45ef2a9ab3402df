use crate::models::ModelsResponse;
use crate::startup::AppState;
use axum::{extract::State, Json};
use service_core::error::AppError;

/// `GET /models`: generation models reachable with the configured credentials.
#[tracing::instrument(skip_all)]
pub async fn list_models(State(state): State<AppState>) -> Result<Json<ModelsResponse>, AppError> {
    let provider = state.assistant.provider();

    let models = provider.list_models().await.map_err(|e| {
        tracing::warn!(provider = provider.name(), error = %e, "Model listing failed");
        AppError::BadGateway(e.to_string())
    })?;

    Ok(Json(ModelsResponse {
        provider: provider.name().to_string(),
        models,
    }))
}
