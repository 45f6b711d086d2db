use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use serde_json::{json, Value};

use serial_api::{
    db::{MemoryStore, WorkRecord},
    routes::{create_router, AppState},
    services::ScoringConfig,
};

async fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.add_category(1, "玄幻").await;
    store.add_category(2, "都市").await;
    for id in 1..=30 {
        let category = if id % 2 == 0 { 2 } else { 1 };
        store
            .add_work(
                WorkRecord::new(id, format!("Work {}", id), Some(category))
                    .tags("仙侠, 穿越")
                    .counts(id * 100, id, 60 - id),
            )
            .await;
    }
    store
}

fn user_id_header() -> HeaderName {
    HeaderName::from_static("x-user-id")
}

fn create_test_server(store: MemoryStore) -> TestServer {
    let state = AppState::new(Arc::new(store), ScoringConfig::default());
    TestServer::new(create_router(state)).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let server = create_test_server(MemoryStore::new());
    let response = server.get("/health").await;
    response.assert_status_ok();
    response.assert_json(&json!({ "status": "healthy" }));
}

#[tokio::test]
async fn test_recommendations_require_user() {
    let server = create_test_server(MemoryStore::new());

    let response = server.get("/api/v1/recommendations").await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    let response = server
        .get("/api/v1/recommendations")
        .add_header(user_id_header(), HeaderValue::from_static("nobody"))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_cold_start_feed_shape() {
    let server = create_test_server(seeded_store().await);

    let response = server
        .get("/api/v1/recommendations")
        .add_header(user_id_header(), HeaderValue::from_static("7"))
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["meta"]["is_personalized"], false);
    assert_eq!(body["meta"]["has_search_history"], false);
    assert_eq!(body["favorite_type_works"], json!([]));
    assert_eq!(body["search_similar_works"], json!([]));

    let ranked = body["favorite_rank_works"].as_array().unwrap();
    assert!(!ranked.is_empty());
    let first = &ranked[0];
    assert_eq!(first["tags"], json!(["仙侠", "穿越"]));
    assert!(first["rating"].is_null());
    assert!(first.get("author_name").is_some());
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let server = create_test_server(MemoryStore::new());
    let id = "6f1c2b52-6a3e-4b8f-9d4e-0f6b2a1c3d4e";

    let response = server
        .get("/health")
        .add_header(
            HeaderName::from_static("x-request-id"),
            HeaderValue::from_static(id),
        )
        .await;
    assert_eq!(response.header("x-request-id"), id);
}

#[tokio::test]
async fn test_unknown_route_is_json_not_found() {
    let server = create_test_server(MemoryStore::new());

    let response = server.get("/api/v1/nowhere").await;
    response.assert_status(StatusCode::NOT_FOUND);

    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("/api/v1/nowhere"));
}

#[tokio::test]
async fn test_feedback_personalizes_feed() {
    let store = seeded_store().await;
    let server = create_test_server(store.clone());

    let response = server
        .post("/api/v1/recommendations/feedback")
        .add_header(user_id_header(), HeaderValue::from_static("7"))
        .json(&json!({ "work_id": "4", "event": "collect", "weight": 2, "source": "home" }))
        .await;
    response.assert_status_ok();
    response.assert_json(&json!({ "success": true }));

    let rows = store.feedback_rows(7).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].weight, 2.0);

    let body: Value = server
        .get("/api/v1/recommendations")
        .add_header(user_id_header(), HeaderValue::from_static("7"))
        .await
        .json();
    assert_eq!(body["meta"]["is_personalized"], true);
    assert_eq!(body["meta"]["top_categories"][0]["name"], "都市");
    assert_eq!(body["meta"]["top_tags"], json!(["仙侠", "穿越"]));
    assert!(!body["favorite_type_works"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_feedback_rejects_unknown_event() {
    let server = create_test_server(seeded_store().await);

    let response = server
        .post("/api/v1/recommendations/feedback")
        .add_header(user_id_header(), HeaderValue::from_static("7"))
        .json(&json!({ "work_id": 4, "event": "share" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("unknown feedback event"));
}

#[tokio::test]
async fn test_search_history_round_trip() {
    let server = create_test_server(seeded_store().await);

    for keyword in ["Work 3", "#仙侠", "work 3"] {
        let response = server
            .post("/api/v1/search/history")
            .add_header(user_id_header(), HeaderValue::from_static("9"))
            .json(&json!({ "keyword": keyword }))
            .await;
        response.assert_status(StatusCode::CREATED);
    }

    let history: Vec<Value> = server
        .get("/api/v1/search/history")
        .add_header(user_id_header(), HeaderValue::from_static("9"))
        .await
        .json();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["keyword"], "work 3");
    assert_eq!(history[1]["search_type"], 3);

    let limited: Vec<Value> = server
        .get("/api/v1/search/history")
        .add_query_param("limit", 1)
        .add_header(user_id_header(), HeaderValue::from_static("9"))
        .await
        .json();
    assert_eq!(limited.len(), 1);

    let body: Value = server
        .get("/api/v1/recommendations")
        .add_header(user_id_header(), HeaderValue::from_static("9"))
        .await
        .json();
    assert_eq!(body["meta"]["has_search_history"], true);
    assert_eq!(body["search_similar_works"][0]["work_id"], 3);
}

#[tokio::test]
async fn test_blank_search_is_rejected() {
    let server = create_test_server(MemoryStore::new());
    let response = server
        .post("/api/v1/search/history")
        .add_header(user_id_header(), HeaderValue::from_static("9"))
        .json(&json!({ "keyword": "   " }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}
