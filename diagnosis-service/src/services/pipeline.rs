//! The diagnosis pipeline: extract and generate concurrently, assemble, log.

use crate::models::{DiagnosisRequest, DiagnosisResult, NewRecord};
use crate::services::extractor::DiseaseExtractor;
use crate::services::generator::DiagnosisGenerator;
use crate::services::logger::RecordLogger;
use crate::services::metrics;

#[derive(Clone)]
pub struct DiagnosisPipeline {
    extractor: DiseaseExtractor,
    generator: DiagnosisGenerator,
    logger: RecordLogger,
}

impl DiagnosisPipeline {
    pub fn new(
        extractor: DiseaseExtractor,
        generator: DiagnosisGenerator,
        logger: RecordLogger,
    ) -> Self {
        Self {
            extractor,
            generator,
            logger,
        }
    }

    /// Run a validated request through every stage. Always yields a result.
    #[tracing::instrument(skip(self, request), fields(language = %request.language))]
    pub async fn run(&self, request: &DiagnosisRequest) -> DiagnosisResult {
        let text = request.extraction_text();

        let (diseases, generated) = tokio::join!(
            self.extractor.extract(&text),
            self.generator.generate(request)
        );

        let result = DiagnosisResult::new(generated, diseases);
        metrics::record_diagnosis(result.outcome.as_str());

        tracing::info!(
            outcome = %result.outcome,
            extracted = result.extracted_diseases.len(),
            confidence = ?result.confidence,
            "Diagnosis completed"
        );

        self.logger.log(NewRecord::from_parts(request, &result)).await;

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GenerationOutcome;
    use crate::services::database::{RecordStore, SqliteRecordStore};
    use crate::services::generator::GeneratorSettings;
    use crate::services::providers::mock::{MockEntityProvider, MockTextProvider};
    use crate::services::providers::ProviderError;
    use std::sync::Arc;

    async fn store() -> Arc<SqliteRecordStore> {
        let store = SqliteRecordStore::connect("sqlite::memory:", 1).await.unwrap();
        store.run_migrations().await.unwrap();
        Arc::new(store)
    }

    fn request() -> DiagnosisRequest {
        DiagnosisRequest {
            symptoms: "fever and cough, possible tuberculosis".into(),
            history: Some("diabetes".into()),
            vitals: Some("38.5".into()),
            language: "en".into(),
        }
    }

    #[tokio::test]
    async fn run_merges_stages_and_logs_one_record() {
        let store = store().await;
        let pipeline = DiagnosisPipeline::new(
            DiseaseExtractor::new(Arc::new(MockEntityProvider::new())),
            DiagnosisGenerator::new(Arc::new(MockTextProvider::new()), GeneratorSettings::default()),
            RecordLogger::new(store.clone()),
        );

        let result = pipeline.run(&request()).await;

        assert_eq!(result.diagnosis, "Viral infection");
        assert!(result.extracted_diseases.contains("tuberculosis"));
        assert!(result.extracted_diseases.contains("diabetes"));
        assert_eq!(store.count().await.unwrap(), 1);

        let records = store.recent(1).await.unwrap();
        assert_eq!(records[0].status, "generated");
        assert_eq!(records[0].history.as_deref(), Some("diabetes"));
    }

    #[tokio::test]
    async fn failed_generation_is_still_logged() {
        let store = store().await;
        let pipeline = DiagnosisPipeline::new(
            DiseaseExtractor::disabled(),
            DiagnosisGenerator::new(
                Arc::new(MockTextProvider::failing(ProviderError::InvalidRequest(
                    "bad key".into(),
                ))),
                GeneratorSettings::default(),
            ),
            RecordLogger::new(store.clone()),
        );

        let result = pipeline.run(&request()).await;

        assert_eq!(result.outcome, GenerationOutcome::Failed);
        let records = store.recent(1).await.unwrap();
        assert_eq!(records[0].status, "failed");
        assert!(records[0].diagnosis.starts_with("Error during diagnosis generation"));
    }
}
