use crate::handlers::diagnose::INVALID_JSON;
use crate::models::{normalize_language, ChatRequest, ChatResponse};
use crate::startup::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use service_core::error::AppError;
use validator::Validate;

pub const MESSAGE_REQUIRED: &str = "Message is required.";

#[tracing::instrument(skip_all)]
pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(request) =
        payload.map_err(|_| AppError::BadRequest(anyhow::anyhow!(INVALID_JSON)))?;

    if request.is_blank() {
        return Err(AppError::InvalidInput(vec![MESSAGE_REQUIRED.to_string()]));
    }
    request.validate()?;

    let language = normalize_language(request.language.as_deref());
    let reply = state
        .assistant
        .reply(&request.message, &request.history, &language)
        .await;

    Ok(Json(ChatResponse { reply }))
}
