mod common;

use axum::http::StatusCode;
use common::{FailingRecordStore, TestApp};
use diagnosis_service::services::providers::mock::{MockEntityProvider, MockTextProvider};
use diagnosis_service::services::providers::{EntitySpan, ProviderError};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;

const VIRAL_JSON: &str = r#"{"diagnosis":"Viral infection","confidence":70,"drugInteractionAlert":"None","dosageRecommendation":"Paracetamol 500mg","referralAdvice":"Refer if fever persists"}"#;

fn disease(word: &str) -> EntitySpan {
    EntitySpan {
        entity_group: "Disease".into(),
        word: word.into(),
        score: Some(0.98),
    }
}

#[tokio::test]
async fn diagnose_returns_generated_result_and_logs_one_record() {
    let app = TestApp::builder()
        .text(MockTextProvider::with_reply(VIRAL_JSON))
        .build()
        .await;

    let (status, body) = app
        .post_json(
            "/diagnose",
            r#"{"symptoms":"fever, cough","history":"none","vitals":"38.5"}"#,
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["diagnosis"], "Viral infection");
    assert_eq!(body["confidence"], 70);
    assert_eq!(body["drugInteractionAlert"], "None");
    assert_eq!(body["dosageRecommendation"], "Paracetamol 500mg");
    assert_eq!(body["referralAdvice"], "Refer if fever persists");
    assert!(body["extractedDiseases"].is_array());
    assert_eq!(app.record_count().await, 1);

    let records = app.store.recent(1).await.unwrap();
    assert_eq!(records[0].symptoms, "fever, cough");
    assert_eq!(records[0].vitals.as_deref(), Some("38.5"));
    assert_eq!(records[0].diagnosis, "Viral infection");
    assert_eq!(records[0].status, "generated");
}

#[tokio::test]
async fn blank_symptoms_are_rejected_without_calling_capabilities() {
    let app = TestApp::spawn().await;

    for body in [r#"{"symptoms":"   "}"#, r#"{"symptoms":""}"#, r#"{"history":"asthma"}"#] {
        let (status, response) = app.post_json("/diagnose", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response, json!({ "errors": ["Symptoms are required."] }));
    }

    assert_eq!(app.text.call_count(), 0);
    assert_eq!(app.entities.call_count(), 0);
    assert_eq!(app.record_count().await, 0);
}

#[tokio::test]
async fn out_of_range_vitals_are_rejected() {
    let app = TestApp::spawn().await;

    for vitals in [r#""46""#, r#""29.9""#, "50", "-1"] {
        let body = format!(r#"{{"symptoms":"fever","vitals":{}}}"#, vitals);
        let (status, response) = app.post_json("/diagnose", &body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "vitals {}", vitals);
        assert_eq!(
            response["errors"],
            json!(["Vitals temperature must be between 30 and 45 °C."])
        );
    }

    assert_eq!(app.text.call_count(), 0);
}

#[tokio::test]
async fn non_numeric_vitals_are_rejected() {
    let app = TestApp::spawn().await;

    let (status, response) = app
        .post_json("/diagnose", r#"{"symptoms":"fever","vitals":"high"}"#)
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["errors"], json!(["Vitals must be a valid number."]));
}

#[tokio::test]
async fn all_violations_are_reported_together() {
    let app = TestApp::spawn().await;

    let (status, response) = app
        .post_json("/diagnose", r#"{"symptoms":" ","vitals":"hot"}"#)
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        response["errors"],
        json!(["Symptoms are required.", "Vitals must be a valid number."])
    );
}

#[tokio::test]
async fn malformed_json_is_rejected() {
    let app = TestApp::spawn().await;

    let (status, response) = app.post_json("/diagnose", "{not json").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response, json!({ "error": "Invalid JSON data." }));
    assert_eq!(app.text.call_count(), 0);
}

#[tokio::test]
async fn extracted_diseases_are_normalized_and_deduplicated() {
    let app = TestApp::builder()
        .entities(MockEntityProvider::with_spans(vec![
            disease("tuberculosis"),
            disease("Tuberculosis "),
            EntitySpan {
                entity_group: "Symptom".into(),
                word: "cough".into(),
                score: None,
            },
        ]))
        .build()
        .await;

    let (status, body) = app
        .post_json(
            "/diagnose",
            r#"{"symptoms":"fever and cough, possible tuberculosis"}"#,
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["extractedDiseases"], json!(["tuberculosis"]));
    assert_eq!(app.entities.call_count(), 1);
}

#[tokio::test]
async fn malformed_model_output_yields_fallback_object() {
    let app = TestApp::builder()
        .text(MockTextProvider::with_reply("Sorry, I think it is {maybe flu"))
        .build()
        .await;

    let (status, body) = app
        .post_json("/diagnose", r#"{"symptoms":"fever"}"#)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["diagnosis"], "Unable to determine diagnosis accurately.");
    assert_eq!(body["confidence"], 0);
    assert_eq!(body["drugInteractionAlert"], "Unknown");
    assert_eq!(body["dosageRecommendation"], "Consult local guidelines");
    assert_eq!(body["referralAdvice"], "Consult specialist if symptoms worsen.");

    let records = app.store.recent(1).await.unwrap();
    assert_eq!(records[0].status, "fallback");
}

#[tokio::test]
async fn generation_failure_degrades_to_200() {
    let app = TestApp::builder()
        .text(MockTextProvider::failing(ProviderError::InvalidRequest(
            "API key not valid".into(),
        )))
        .build()
        .await;

    let (status, body) = app
        .post_json("/diagnose", r#"{"symptoms":"headache","vitals":37}"#)
        .await;

    assert_eq!(status, StatusCode::OK);
    let diagnosis = body["diagnosis"].as_str().unwrap();
    assert!(diagnosis.starts_with("Error during diagnosis generation: "));
    assert_eq!(body["confidence"], 0);
    assert_eq!(body["referralAdvice"], "N/A");

    let records = app.store.recent(1).await.unwrap();
    assert_eq!(records[0].status, "failed");
    assert_eq!(records[0].vitals.as_deref(), Some("37.0"));
}

#[tokio::test]
async fn extraction_failure_still_returns_diagnosis() {
    let app = TestApp::builder()
        .entities(MockEntityProvider::failing(ProviderError::RateLimited))
        .build()
        .await;

    let (status, body) = app
        .post_json("/diagnose", r#"{"symptoms":"fever","history":"diabetes"}"#)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["extractedDiseases"], json!([]));
    assert_eq!(body["diagnosis"], "Viral infection");
}

#[tokio::test]
async fn persistence_failure_does_not_change_response() {
    let request = r#"{"symptoms":"fever, cough","history":"none","vitals":"38.5"}"#;

    let healthy = TestApp::builder()
        .text(MockTextProvider::with_reply(VIRAL_JSON))
        .build()
        .await;
    let (healthy_status, healthy_body) = healthy.post_json("/diagnose", request).await;

    let failing_store = Arc::new(FailingRecordStore::default());
    let broken = TestApp::builder()
        .text(MockTextProvider::with_reply(VIRAL_JSON))
        .store(failing_store.clone())
        .build()
        .await;
    let (broken_status, broken_body) = broken.post_json("/diagnose", request).await;

    assert_eq!(healthy_status, broken_status);
    assert_eq!(healthy_body, broken_body);
    assert_eq!(failing_store.attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn each_call_appends_a_new_record() {
    let app = TestApp::spawn().await;

    for _ in 0..3 {
        let (status, _) = app
            .post_json("/diagnose", r#"{"symptoms":"fever"}"#)
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    assert_eq!(app.record_count().await, 3);
}

#[tokio::test]
async fn language_reaches_the_prompt() {
    let app = TestApp::spawn().await;

    let (status, _) = app
        .post_json("/diagnose", r#"{"symptoms":"bukhar","language":"HI"}"#)
        .await;

    assert_eq!(status, StatusCode::OK);
    let messages = app.text.last_messages();
    assert!(messages
        .last()
        .unwrap()
        .content
        .contains("Respond in Hindi."));
}
