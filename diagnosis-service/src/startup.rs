//! Application startup and lifecycle management.
//!
//! Builds the record store and every outbound provider once, wires them into
//! the pipeline, and serves the HTTP router until a shutdown signal arrives.

use crate::config::{
    DiagnosisConfig, HttpConfig, LlmConfig, LlmProviderKind, NerConfig, NerProviderKind,
    TranscriptionConfig, TranscriptionProviderKind,
};
use crate::handlers;
use crate::services::providers::gemini::{GeminiConfig, GeminiTextProvider};
use crate::services::providers::huggingface::{
    HuggingFaceConfig, HuggingFaceEntityProvider, HUGGINGFACE_API_BASE,
};
use crate::services::providers::mock::{
    MockEntityProvider, MockTextProvider, MockTranscriptionProvider,
};
use crate::services::providers::openai::{
    OpenAiConfig, OpenAiTextProvider, OpenAiTranscriptionProvider, GROQ_API_BASE,
    OPENAI_API_BASE,
};
use crate::services::providers::{
    EntityProvider, ProviderError, TextProvider, TranscriptionProvider,
};
use crate::services::{
    ChatAssistant, DiagnosisGenerator, DiagnosisPipeline, DiseaseExtractor, GeneratorSettings,
    RecordLogger, RecordStore, SqliteRecordStore,
};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::{http_request_span, request_id_middleware};
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Timeout for entity extraction calls.
const NER_TIMEOUT: Duration = Duration::from_secs(15);

/// Timeout for transcription calls; audio uploads are slow.
const TRANSCRIPTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: DiagnosisPipeline,
    pub assistant: ChatAssistant,
    /// `None` disables `/transcribe`.
    pub transcriber: Option<Arc<dyn TranscriptionProvider>>,
    pub store: Arc<dyn RecordStore>,
}

impl AppState {
    /// Wire the pipeline and assistant from already-built capabilities.
    pub fn new(
        text_provider: Arc<dyn TextProvider>,
        entity_provider: Option<Arc<dyn EntityProvider>>,
        transcriber: Option<Arc<dyn TranscriptionProvider>>,
        store: Arc<dyn RecordStore>,
        settings: GeneratorSettings,
    ) -> Self {
        let extractor = match entity_provider {
            Some(provider) => DiseaseExtractor::new(provider),
            None => DiseaseExtractor::disabled(),
        };
        let generator = DiagnosisGenerator::new(text_provider.clone(), settings.clone());
        let logger = RecordLogger::new(store.clone());

        Self {
            pipeline: DiagnosisPipeline::new(extractor, generator, logger),
            assistant: ChatAssistant::new(text_provider, settings),
            transcriber,
            store,
        }
    }
}

/// Build the HTTP router with every route and middleware layer.
pub fn build_router(state: AppState, http: &HttpConfig) -> Router {
    let mut router = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/diagnose", post(handlers::diagnose))
        .route("/chat", post(handlers::chat))
        .route("/analyze-image", post(handlers::analyze_image))
        .route("/models", get(handlers::list_models));

    if state.transcriber.is_some() {
        router = router.route("/transcribe", post(handlers::transcribe));
    }

    router
        .layer(DefaultBodyLimit::max(http.max_upload_bytes))
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(http_request_span))
        .layer(cors_layer(&http.cors_allowed_origins))
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}

fn not_configured(what: &str, err: ProviderError) -> AppError {
    AppError::ConfigError(anyhow::anyhow!("Failed to initialize {}: {}", what, err))
}

/// Construct the generative-text provider selected by `LLM_PROVIDER`.
pub fn build_text_provider(config: &LlmConfig) -> Result<Arc<dyn TextProvider>, AppError> {
    let timeout = Duration::from_secs(config.timeout_secs);

    let provider: Arc<dyn TextProvider> = match config.provider {
        LlmProviderKind::Gemini => Arc::new(
            GeminiTextProvider::new(GeminiConfig {
                api_key: config.api_key.clone(),
                model: config.model.clone(),
                timeout,
            })
            .map_err(|e| not_configured("Gemini provider", e))?,
        ),
        LlmProviderKind::OpenAi | LlmProviderKind::Groq => {
            let default_base = if config.provider == LlmProviderKind::Groq {
                GROQ_API_BASE
            } else {
                OPENAI_API_BASE
            };
            Arc::new(
                OpenAiTextProvider::new(OpenAiConfig {
                    provider_name: config.provider.as_str().to_string(),
                    api_key: config.api_key.clone(),
                    model: config.model.clone(),
                    base_url: config
                        .base_url
                        .clone()
                        .unwrap_or_else(|| default_base.to_string()),
                    timeout,
                })
                .map_err(|e| not_configured("chat completion provider", e))?,
            )
        }
        LlmProviderKind::Mock => Arc::new(MockTextProvider::new()),
    };

    tracing::info!(
        provider = provider.name(),
        model = provider.model(),
        "Initialized text provider"
    );
    Ok(provider)
}

/// Construct the entity provider, or `None` when extraction is disabled.
pub fn build_entity_provider(
    config: &NerConfig,
) -> Result<Option<Arc<dyn EntityProvider>>, AppError> {
    let provider: Arc<dyn EntityProvider> = match config.provider {
        NerProviderKind::HuggingFace => Arc::new(
            HuggingFaceEntityProvider::new(HuggingFaceConfig {
                api_key: config.api_key.clone(),
                model: config.model.clone(),
                base_url: config
                    .base_url
                    .clone()
                    .unwrap_or_else(|| HUGGINGFACE_API_BASE.to_string()),
                timeout: NER_TIMEOUT,
            })
            .map_err(|e| not_configured("entity provider", e))?,
        ),
        NerProviderKind::Mock => Arc::new(MockEntityProvider::new()),
        NerProviderKind::Disabled => {
            tracing::warn!("Disease extraction disabled: no NER provider configured");
            return Ok(None);
        }
    };

    tracing::info!(provider = provider.name(), model = %config.model, "Initialized entity provider");
    Ok(Some(provider))
}

/// Construct the transcription provider, or `None` when transcription is off.
pub fn build_transcription_provider(
    config: &TranscriptionConfig,
) -> Result<Option<Arc<dyn TranscriptionProvider>>, AppError> {
    let base = match config.provider {
        TranscriptionProviderKind::OpenAi => OPENAI_API_BASE,
        TranscriptionProviderKind::Groq => GROQ_API_BASE,
        TranscriptionProviderKind::Mock => {
            return Ok(Some(Arc::new(MockTranscriptionProvider::default())));
        }
        TranscriptionProviderKind::Disabled => return Ok(None),
    };

    let provider_name = match config.provider {
        TranscriptionProviderKind::Groq => "groq",
        _ => "openai",
    };

    let provider = OpenAiTranscriptionProvider::new(OpenAiConfig {
        provider_name: provider_name.to_string(),
        api_key: config.api_key.clone(),
        model: config.model.clone(),
        base_url: config.base_url.clone().unwrap_or_else(|| base.to_string()),
        timeout: TRANSCRIPTION_TIMEOUT,
    })
    .map_err(|e| not_configured("transcription provider", e))?;

    tracing::info!(provider = provider_name, model = %config.model, "Initialized transcription provider");
    Ok(Some(Arc::new(provider)))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    server: Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + Unpin>,
    store: Arc<dyn RecordStore>,
}

impl Application {
    /// Build the application with the given configuration.
    ///
    /// Fails before binding when the store cannot be opened or a provider
    /// cannot be constructed.
    pub async fn build(config: DiagnosisConfig) -> Result<Self, AppError> {
        let store = SqliteRecordStore::connect(
            &config.database.url,
            config.database.max_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!("Failed to open record store: {}", e);
            e
        })?;

        store.run_migrations().await.map_err(|e| {
            tracing::error!("Failed to run database migrations: {}", e);
            e
        })?;
        let store: Arc<dyn RecordStore> = Arc::new(store);

        let text_provider = build_text_provider(&config.llm)?;
        let entity_provider = build_entity_provider(&config.ner)?;
        let transcriber = build_transcription_provider(&config.transcription)?;

        let state = AppState::new(
            text_provider,
            entity_provider,
            transcriber,
            store.clone(),
            GeneratorSettings::from_config(&config.llm),
        );

        let app = build_router(state, &config.http);

        let addr = config.common.bind_address();
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(
            port,
            llm_provider = config.llm.provider.as_str(),
            response_mode = ?config.llm.response_mode,
            "Diagnosis service listening"
        );

        let server = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .into_future();

        Ok(Self {
            port,
            server: Box::new(Box::pin(server)),
            store,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.server.await
    }
}
