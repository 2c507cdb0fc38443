//! Shared fixtures for the HTTP-level tests.
#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use bigdecimal::BigDecimal;
use lead_compliance_api::config::Config;
use lead_compliance_api::handlers::{api_router, AppState};
use lead_compliance_api::memory_store::MemoryStore;
use lead_compliance_api::models::ListRouting;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const API_KEY: &str = "test-api-key";
pub const CLEAN_PHONE: &str = "6507769592";

/// Synergy, TCPA and phone validation all answer "clean".
pub async fn mock_clean_checkers(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/rtb/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "rejection_reason": null
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/scrub/phone/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "results": { "clean": 1, "status_array": [] }
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rpvWebService/Turbo.php"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "connected",
            "phone_type": "Mobile"
        })))
        .mount(server)
        .await;
}

pub fn routing(list_id: &str, dialer_type: i32, vertical: Option<&str>) -> ListRouting {
    ListRouting {
        list_id: list_id.to_string(),
        campaign_id: Some("camp-1".to_string()),
        cadence_id: Some("cad-1".to_string()),
        token: Some("list-token".to_string()),
        bid: BigDecimal::from_str("12.50").unwrap(),
        active: true,
        vertical: vertical.map(str::to_string),
        dialer_type,
    }
}

pub fn test_app_with_config(config: Config) -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(config, store.clone()).unwrap();
    (api_router(Arc::new(state)), store)
}

/// Router over a fresh memory store, with every external service pointed at
/// `server`.
pub fn test_app(server: &MockServer) -> (Router, Arc<MemoryStore>) {
    test_app_with_config(Config::for_base_url(&server.uri()))
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {}", API_KEY))
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", API_KEY))
        .body(Body::empty())
        .unwrap()
}

pub async fn send_raw(app: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, String) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, _, body) = send_raw(app, request).await;
    let json = serde_json::from_str(&body).unwrap_or(Value::Null);
    (status, json)
}

/// Waits for the background rejection logger to write `count` records.
pub async fn wait_for_rejections(store: &MemoryStore, count: usize) -> bool {
    for _ in 0..50 {
        if store.rejections().await.len() >= count {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    false
}
