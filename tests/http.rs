use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use slog::{o, Logger};
use url::Url;
use warp::http::StatusCode;
use warp::{Filter, Reply};

use backend::db::memory::MemoryDb;
use backend::diagnosis::{Diagnosis, DiagnosisPage};
use backend::environment::{Config, Environment};
use backend::external::Unintegrated;
use backend::routes;
use backend::store::mock::MockStore;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
    message: Option<String>,
}

fn make_environment() -> Environment {
    let logger = Arc::new(Logger::root(slog::Discard, o!()));
    let engines = Arc::new(Unintegrated::new(
        Url::parse("http://localhost:8080/").expect("parse base URL"),
    ));

    Environment::new(
        logger,
        Arc::new(MemoryDb::new()),
        Arc::new(MockStore::new()),
        engines.clone(),
        engines,
        Config::new(true),
    )
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Envelope<T> {
    serde_json::from_slice(body).expect("parse response body as JSON envelope")
}

async fn create_diagnosis<F, R>(api: &F, body: serde_json::Value) -> Diagnosis
where
    F: Filter<Extract = R, Error = warp::Rejection> + Clone + Send + Sync + 'static,
    R: Reply + Send,
{
    let response = warp::test::request()
        .path("/diagnose")
        .method("POST")
        .json(&body)
        .reply(api)
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);

    parse_body::<Diagnosis>(response.body())
        .data
        .expect("get created diagnosis")
}

#[tokio::test]
async fn a_diagnosis_can_be_created_localized_and_retrieved() {
    let api = routes::make_api(make_environment());

    let created = create_diagnosis(
        &api,
        serde_json::json!({
            "voiceInput": { "transcription": "brown spots on the leaves" },
            "imageResult": { "prediction": "leaf blight" },
            "combinedResult": "Leaf blight detected",
        }),
    )
    .await;

    assert_eq!(created.id().as_str().len(), 24);
    assert_eq!(created.language(), "en");
    assert!(created.localized_text().is_none());
    assert!(created.audio_url().is_none());

    let response = warp::test::request()
        .path("/output/localize")
        .method("POST")
        .json(&serde_json::json!({ "diagnosisId": created.id().as_str() }))
        .reply(&api)
        .await;

    assert_eq!(response.status(), StatusCode::OK);

    let envelope = parse_body::<serde_json::Value>(response.body());
    assert!(envelope.success);
    assert!(envelope.message.is_some());

    let data = envelope.data.expect("get localization payload");
    assert_eq!(
        data["localizedText"].as_str(),
        Some("[TW] Leaf blight detected")
    );
    assert!(!data["audioURL"].as_str().expect("get audio URL").is_empty());

    let response = warp::test::request()
        .path(&format!("/diagnose/{}", created.id()))
        .method("GET")
        .reply(&api)
        .await;

    assert_eq!(response.status(), StatusCode::OK);

    let retrieved = parse_body::<Diagnosis>(response.body())
        .data
        .expect("get retrieved diagnosis");
    assert_eq!(retrieved.id(), created.id());
    assert_eq!(retrieved.language(), "tw");
    assert_eq!(retrieved.localized_text(), Some("[TW] Leaf blight detected"));
    assert!(retrieved.audio_url().is_some());
}

#[tokio::test]
async fn the_history_is_paginated_most_recent_first() {
    let api = routes::make_api(make_environment());

    for i in 1..=25 {
        create_diagnosis(
            &api,
            serde_json::json!({ "combinedResult": format!("record {}", i) }),
        )
        .await;
    }

    let response = warp::test::request()
        .path("/diagnose?limit=10&page=1")
        .method("GET")
        .reply(&api)
        .await;

    assert_eq!(response.status(), StatusCode::OK);

    let page = parse_body::<DiagnosisPage>(response.body())
        .data
        .expect("get first page");
    assert_eq!(page.diagnoses.len(), 10);
    assert_eq!(page.diagnoses[0].combined_result(), "record 25");
    assert_eq!(page.pagination.current_page, 1);
    assert_eq!(page.pagination.total_pages, 3);
    assert_eq!(page.pagination.page_count, 10);
    assert_eq!(page.pagination.total_records, 25);

    let response = warp::test::request()
        .path("/diagnose?limit=10&page=3")
        .method("GET")
        .reply(&api)
        .await;

    let page = parse_body::<DiagnosisPage>(response.body())
        .data
        .expect("get last page");
    assert_eq!(page.diagnoses.len(), 5);
    assert_eq!(
        page.diagnoses.last().expect("get oldest record").combined_result(),
        "record 1"
    );
    assert_eq!(page.pagination.page_count, 5);
    assert_eq!(page.pagination.total_pages, 3);
}

#[tokio::test]
async fn the_history_can_be_filtered_by_language() {
    let api = routes::make_api(make_environment());

    for i in 1..=3 {
        create_diagnosis(
            &api,
            serde_json::json!({ "combinedResult": format!("english record {}", i) }),
        )
        .await;
    }
    for i in 1..=2 {
        create_diagnosis(
            &api,
            serde_json::json!({
                "combinedResult": format!("twi record {}", i),
                "language": "tw",
            }),
        )
        .await;
    }

    let response = warp::test::request()
        .path("/diagnose?language=tw")
        .method("GET")
        .reply(&api)
        .await;

    assert_eq!(response.status(), StatusCode::OK);

    let page = parse_body::<DiagnosisPage>(response.body())
        .data
        .expect("get filtered page");
    assert_eq!(page.pagination.total_records, 2);
    assert!(page.diagnoses.iter().all(|d| d.language() == "tw"));

    let response = warp::test::request()
        .path("/diagnose")
        .method("GET")
        .reply(&api)
        .await;

    let page = parse_body::<DiagnosisPage>(response.body())
        .data
        .expect("get unfiltered page");
    assert_eq!(page.pagination.total_records, 5);
}

#[tokio::test]
async fn errors_use_the_same_envelope_as_successes() {
    let api = routes::make_api(make_environment());

    let response = warp::test::request()
        .path("/diagnose/not-a-valid-id")
        .method("GET")
        .reply(&api)
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let envelope = parse_body::<serde_json::Value>(response.body());
    assert!(!envelope.success);
    assert!(envelope.data.is_none());
    assert!(!envelope.error.expect("get error description").is_empty());
}

#[tokio::test]
async fn responses_carry_a_server_timing_header() {
    let api = routes::make_api(make_environment());

    let response = warp::test::request().path("/health").method("GET").reply(&api).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("server-timing"));
}
