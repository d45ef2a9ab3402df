#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use diagnosis_service::config::HttpConfig;
use diagnosis_service::models::{NewRecord, Record};
use diagnosis_service::services::providers::mock::{
    MockEntityProvider, MockTextProvider, MockTranscriptionProvider,
};
use diagnosis_service::services::providers::{EntityProvider, TranscriptionProvider};
use diagnosis_service::services::{GeneratorSettings, RecordStore, SqliteRecordStore};
use diagnosis_service::startup::{build_router, AppState};
use http_body_util::BodyExt;
use serde_json::Value;
use service_core::error::AppError;
use service_core::retry::RetryConfig;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

pub const MULTIPART_BOUNDARY: &str = "diagnosis-test-boundary";

/// Router wired with mock capabilities and an in-memory store.
pub struct TestApp {
    pub router: Router,
    pub text: Arc<MockTextProvider>,
    pub entities: Arc<MockEntityProvider>,
    pub store: Arc<dyn RecordStore>,
}

pub struct TestAppBuilder {
    text: MockTextProvider,
    entities: MockEntityProvider,
    store: Option<Arc<dyn RecordStore>>,
    transcriber: Option<Arc<dyn TranscriptionProvider>>,
    max_upload_bytes: usize,
}

impl TestAppBuilder {
    pub fn text(mut self, text: MockTextProvider) -> Self {
        self.text = text;
        self
    }

    pub fn entities(mut self, entities: MockEntityProvider) -> Self {
        self.entities = entities;
        self
    }

    pub fn store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_transcriber(mut self) -> Self {
        self.transcriber = Some(Arc::new(MockTranscriptionProvider::default()));
        self
    }

    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.max_upload_bytes = bytes;
        self
    }

    pub async fn build(self) -> TestApp {
        let store = match self.store {
            Some(store) => store,
            None => memory_store().await,
        };
        let text = Arc::new(self.text);
        let entities = Arc::new(self.entities);
        let entity_provider: Arc<dyn EntityProvider> = entities.clone();

        let state = AppState::new(
            text.clone(),
            Some(entity_provider),
            self.transcriber,
            store.clone(),
            test_settings(),
        );
        let router = build_router(
            state,
            &HttpConfig {
                max_upload_bytes: self.max_upload_bytes,
                cors_allowed_origins: Vec::new(),
            },
        );

        TestApp {
            router,
            text,
            entities,
            store,
        }
    }
}

impl TestApp {
    pub fn builder() -> TestAppBuilder {
        TestAppBuilder {
            text: MockTextProvider::new(),
            entities: MockEntityProvider::new(),
            store: None,
            transcriber: None,
            max_upload_bytes: 1024 * 1024,
        }
    }

    pub async fn spawn() -> Self {
        Self::builder().build().await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router call failed");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("failed to read body")
            .to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    pub async fn post_json(&self, uri: &str, body: &str) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post_multipart(&self, uri: &str, parts: &[MultipartPart<'_>]) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={}", MULTIPART_BOUNDARY),
                )
                .body(Body::from(multipart_body(parts)))
                .unwrap(),
        )
        .await
    }

    pub async fn record_count(&self) -> i64 {
        self.store.count().await.expect("count failed")
    }
}

/// One part of a hand-built multipart body.
pub enum MultipartPart<'a> {
    Text {
        name: &'a str,
        value: &'a str,
    },
    File {
        name: &'a str,
        file_name: &'a str,
        content_type: &'a str,
        data: &'a [u8],
    },
}

pub fn multipart_body(parts: &[MultipartPart<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
        match part {
            MultipartPart::Text { name, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            MultipartPart::File {
                name,
                file_name,
                content_type,
                data,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                        name, file_name, content_type
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());
    body
}

pub async fn memory_store() -> Arc<dyn RecordStore> {
    let store = SqliteRecordStore::connect("sqlite::memory:", 1)
        .await
        .expect("failed to open in-memory store");
    store.run_migrations().await.expect("migrations failed");
    Arc::new(store)
}

/// Generator settings with near-zero backoff so retry paths stay fast.
pub fn test_settings() -> GeneratorSettings {
    GeneratorSettings {
        timeout: Duration::from_secs(5),
        retry: RetryConfig {
            initial_backoff: Duration::from_millis(1),
            add_jitter: false,
            ..RetryConfig::with_max_retries(1)
        },
        ..GeneratorSettings::default()
    }
}

/// Store whose writes always fail.
#[derive(Default)]
pub struct FailingRecordStore {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl RecordStore for FailingRecordStore {
    async fn append(&self, _record: &NewRecord) -> Result<i64, AppError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(AppError::DatabaseError(anyhow::anyhow!("disk I/O error")))
    }

    async fn count(&self) -> Result<i64, AppError> {
        Ok(0)
    }

    async fn recent(&self, _limit: i64) -> Result<Vec<Record>, AppError> {
        Ok(Vec::new())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Err(AppError::DatabaseError(anyhow::anyhow!("store offline")))
    }
}
