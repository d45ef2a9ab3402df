use crate::models::{normalize_language, ImageAnalysisResponse, TranscriptionResponse};
use crate::services::metrics;
use crate::services::providers::InlineImage;
use crate::startup::AppState;
use axum::{
    extract::{Multipart, State},
    Json,
};
use service_core::error::AppError;
use std::time::Instant;

pub const AUDIO_REQUIRED: &str = "Audio file is required.";
pub const IMAGE_REQUIRED: &str = "Image file is required.";
pub const IMAGE_TYPE_INVALID: &str = "Uploaded file must be an image.";

/// One uploaded file pulled out of a multipart body.
struct Upload {
    file_name: String,
    content_type: Option<String>,
    data: Vec<u8>,
}

/// Multipart body split into the named file and plain text fields.
#[derive(Default)]
struct UploadForm {
    file: Option<Upload>,
    language: Option<String>,
    notes: Option<String>,
}

async fn read_form(mut multipart: Multipart, file_field: &str) -> Result<UploadForm, AppError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        AppError::BadRequest(anyhow::anyhow!("Failed to read multipart field: {}", e))
    })? {
        let name = field.name().unwrap_or_default().to_string();

        if name == file_field {
            let file_name = field.file_name().unwrap_or("upload").to_string();
            let content_type = field.content_type().map(str::to_string);
            let data = field.bytes().await.map_err(|e| {
                AppError::BadRequest(anyhow::anyhow!("Failed to read file bytes: {}", e))
            })?;
            form.file = Some(Upload {
                file_name,
                content_type,
                data: data.to_vec(),
            });
            continue;
        }

        let read_text = |e: axum::extract::multipart::MultipartError| {
            AppError::BadRequest(anyhow::anyhow!("Failed to read field '{}': {}", name, e))
        };
        match name.as_str() {
            "language" => form.language = Some(field.text().await.map_err(read_text)?),
            "notes" => form.notes = Some(field.text().await.map_err(read_text)?),
            _ => {}
        }
    }

    Ok(form)
}

/// `POST /transcribe`: speech to text with a language hint.
#[tracing::instrument(skip_all)]
pub async fn transcribe(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<TranscriptionResponse>, AppError> {
    let transcriber = state
        .transcriber
        .clone()
        .ok_or(AppError::ServiceUnavailable)?;

    let form = read_form(multipart, "audio").await?;
    let language = normalize_language(form.language.as_deref());

    let upload = form
        .file
        .filter(|f| !f.data.is_empty())
        .ok_or_else(|| AppError::InvalidInput(vec![AUDIO_REQUIRED.to_string()]))?;
    let mime_type = upload
        .content_type
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let start = Instant::now();
    let result = transcriber
        .transcribe(upload.data, &upload.file_name, &mime_type, &language)
        .await;
    metrics::record_provider_latency(
        transcriber.name(),
        "transcribe",
        start.elapsed().as_secs_f64(),
    );

    let response = match result {
        Ok(transcript) => TranscriptionResponse {
            transcript: Some(transcript.text),
            language: transcript.language.unwrap_or(language),
            error: None,
        },
        Err(e) => {
            tracing::warn!(error = %e, "Transcription failed");
            metrics::record_provider_error(transcriber.name(), e.kind());
            TranscriptionResponse {
                transcript: None,
                language,
                error: Some(e.to_string()),
            }
        }
    };

    Ok(Json(response))
}

/// `POST /analyze-image`: describe a clinical photo.
#[tracing::instrument(skip_all)]
pub async fn analyze_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ImageAnalysisResponse>, AppError> {
    let form = read_form(multipart, "image").await?;
    let language = normalize_language(form.language.as_deref());

    let upload = form
        .file
        .filter(|f| !f.data.is_empty())
        .ok_or_else(|| AppError::InvalidInput(vec![IMAGE_REQUIRED.to_string()]))?;

    let mime_type = match upload.content_type {
        Some(ct) if ct.starts_with("image/") => ct,
        _ => return Err(AppError::InvalidInput(vec![IMAGE_TYPE_INVALID.to_string()])),
    };

    let analysis = state
        .assistant
        .analyze_image(
            InlineImage {
                mime_type,
                data: upload.data,
            },
            form.notes.as_deref(),
            &language,
        )
        .await;

    Ok(Json(ImageAnalysisResponse { analysis }))
}
