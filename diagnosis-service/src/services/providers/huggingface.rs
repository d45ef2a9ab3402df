//! Hosted token-classification over the Hugging Face inference API.

use super::{http_client, EntityProvider, EntitySpan, ProviderError};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const HUGGINGFACE_API_BASE: &str = "https://api-inference.huggingface.co/models";

#[derive(Debug, Clone)]
pub struct HuggingFaceConfig {
    pub api_key: Secret<String>,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

pub struct HuggingFaceEntityProvider {
    config: HuggingFaceConfig,
    client: Client,
}

impl HuggingFaceEntityProvider {
    pub fn new(config: HuggingFaceConfig) -> Result<Self, ProviderError> {
        if config.api_key.expose_secret().is_empty() {
            return Err(ProviderError::NotConfigured(
                "Hugging Face API token not configured".to_string(),
            ));
        }
        let client = http_client(config.timeout)?;
        Ok(Self { config, client })
    }

    fn model_url(&self) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }
}

#[async_trait]
impl EntityProvider for HuggingFaceEntityProvider {
    fn name(&self) -> &str {
        "huggingface"
    }

    #[tracing::instrument(skip(self, text), fields(model = %self.config.model, text_len = text.len()))]
    async fn extract(&self, text: &str) -> Result<Vec<EntitySpan>, ProviderError> {
        let request = TokenClassificationRequest {
            inputs: text,
            parameters: Parameters {
                aggregation_strategy: "simple",
            },
            options: Options {
                wait_for_model: true,
            },
        };

        let response = self
            .client
            .post(self.model_url())
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status("HuggingFace", status, &error_text));
        }

        let entities: Vec<ApiEntity> = response
            .json()
            .await
            .map_err(|e| ProviderError::ApiError(format!("Failed to parse entities: {}", e)))?;

        Ok(entities.into_iter().map(EntitySpan::from).collect())
    }
}

#[derive(Debug, Serialize)]
struct TokenClassificationRequest<'a> {
    inputs: &'a str,
    parameters: Parameters,
    options: Options,
}

#[derive(Debug, Serialize)]
struct Parameters {
    aggregation_strategy: &'static str,
}

#[derive(Debug, Serialize)]
struct Options {
    wait_for_model: bool,
}

#[derive(Debug, Deserialize)]
struct ApiEntity {
    #[serde(alias = "entity")]
    entity_group: String,
    word: String,
    #[serde(default)]
    score: Option<f32>,
}

impl From<ApiEntity> for EntitySpan {
    fn from(e: ApiEntity) -> Self {
        EntitySpan {
            entity_group: e.entity_group,
            word: e.word,
            score: e.score,
        }
    }
}
