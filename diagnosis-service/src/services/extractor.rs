//! Disease extraction over a token-classification capability.

use crate::services::metrics;
use crate::services::providers::{EntityProvider, EntitySpan};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

/// Entity group carrying disease mentions.
const DISEASE_GROUP: &str = "Disease";

/// Word-piece continuation marker.
const SUBWORD_PREFIX: &str = "##";

/// Pulls normalized disease names out of free text.
///
/// Never fails: a missing or failing provider yields an empty set.
#[derive(Clone)]
pub struct DiseaseExtractor {
    provider: Option<Arc<dyn EntityProvider>>,
}

impl DiseaseExtractor {
    pub fn new(provider: Arc<dyn EntityProvider>) -> Self {
        Self {
            provider: Some(provider),
        }
    }

    /// Extractor that always returns an empty set.
    pub fn disabled() -> Self {
        Self { provider: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    #[tracing::instrument(skip(self, text), fields(text_len = text.len()))]
    pub async fn extract(&self, text: &str) -> BTreeSet<String> {
        if text.trim().is_empty() {
            return BTreeSet::new();
        }

        let Some(provider) = &self.provider else {
            return BTreeSet::new();
        };

        let start = Instant::now();
        let result = provider.extract(text).await;
        metrics::record_provider_latency(
            provider.name(),
            "extract",
            start.elapsed().as_secs_f64(),
        );

        match result {
            Ok(spans) => {
                let diseases = normalize_diseases(&spans);
                tracing::debug!(count = diseases.len(), "Extracted diseases");
                diseases
            }
            Err(e) => {
                tracing::warn!(
                    provider = provider.name(),
                    error = %e,
                    "Disease extraction failed, continuing without entities"
                );
                metrics::record_provider_error(provider.name(), e.kind());
                metrics::record_extraction_failure();
                BTreeSet::new()
            }
        }
    }
}

/// Glue `##` fragments onto the span they continue, keep the merged words
/// whose head span is `Disease`, then lowercase, trim and deduplicate.
fn normalize_diseases(spans: &[EntitySpan]) -> BTreeSet<String> {
    // (entity group of the head span, merged word)
    let mut words: Vec<(&str, String)> = Vec::new();

    for span in spans {
        let word = span.word.trim();
        if let Some(rest) = word.strip_prefix(SUBWORD_PREFIX) {
            if let Some((_, previous)) = words.last_mut() {
                previous.push_str(rest);
                continue;
            }
            words.push((span.entity_group.as_str(), rest.to_string()));
        } else {
            words.push((span.entity_group.as_str(), word.to_string()));
        }
    }

    words
        .into_iter()
        .filter(|(group, _)| *group == DISEASE_GROUP)
        .map(|(_, w)| w.trim().to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::providers::mock::MockEntityProvider;
    use crate::services::providers::ProviderError;

    fn span(group: &str, word: &str) -> EntitySpan {
        EntitySpan {
            entity_group: group.to_string(),
            word: word.to_string(),
            score: Some(0.9),
        }
    }

    #[test]
    fn only_disease_spans_are_kept_and_deduplicated() {
        let spans = vec![
            span("Disease", "Diabetes"),
            span("Chemical", "insulin"),
            span("Disease", " diabetes "),
            span("Disease", "Asthma"),
        ];
        let diseases = normalize_diseases(&spans);
        assert_eq!(
            diseases.into_iter().collect::<Vec<_>>(),
            vec!["asthma".to_string(), "diabetes".to_string()]
        );
    }

    #[test]
    fn subword_fragments_join_previous_span() {
        let spans = vec![span("Disease", "tuber"), span("Disease", "##culosis")];
        assert_eq!(
            normalize_diseases(&spans),
            BTreeSet::from(["tuberculosis".to_string()])
        );
    }

    #[test]
    fn fragments_stay_with_the_span_they_continue() {
        let spans = vec![
            span("Disease", "asthma"),
            span("Chemical", "insul"),
            span("Disease", "##in"),
        ];
        assert_eq!(
            normalize_diseases(&spans),
            BTreeSet::from(["asthma".to_string()])
        );
    }

    #[test]
    fn empty_spans_are_dropped() {
        let spans = vec![span("Disease", "   "), span("Disease", "##")];
        assert!(normalize_diseases(&spans).is_empty());
    }

    #[tokio::test]
    async fn blank_text_skips_provider() {
        let provider = Arc::new(MockEntityProvider::new());
        let extractor = DiseaseExtractor::new(provider.clone());

        assert!(extractor.extract("   ").await.is_empty());
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn provider_failure_degrades_to_empty_set() {
        let provider = Arc::new(MockEntityProvider::failing(ProviderError::NetworkError(
            "connection refused".into(),
        )));
        let extractor = DiseaseExtractor::new(provider.clone());

        assert!(extractor.extract("history of diabetes").await.is_empty());
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn disabled_extractor_returns_empty_set() {
        let extractor = DiseaseExtractor::disabled();
        assert!(!extractor.is_enabled());
        assert!(extractor.extract("malaria").await.is_empty());
    }

    #[tokio::test]
    async fn extracts_through_provider() {
        let extractor = DiseaseExtractor::new(Arc::new(MockEntityProvider::new()));
        let diseases = extractor.extract("Known case of Hypertension, diabetes").await;
        assert_eq!(
            diseases,
            BTreeSet::from(["diabetes".to_string(), "hypertension".to_string()])
        );
    }
}
