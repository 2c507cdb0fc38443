/// CSV batch compliance, bulk TrustedForm claims and lead export
mod common;

use axum::body::Body;
use axum::http::{header, Request};
use common::*;
use lead_compliance_api::batch::{batch_policy, run_batch, MISSING_PHONE_REASON};
use lead_compliance_api::checkers::InternalDncChecker;
use lead_compliance_api::csv_records::{parse_csv, PHONE_ALIASES};
use lead_compliance_api::csv_records::lookup_field;
use lead_compliance_api::engine::ComplianceEngine;
use lead_compliance_api::memory_store::MemoryStore;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BATCH_CSV: &str = "\
First Name,Last Name,Phone Number,State
Ana,Silva,(650) 776-9592,TX
Bo,Test,999-999-9999,OK
Cy,NoPhone,,FL
";

fn internal_dnc_engine() -> ComplianceEngine {
    let store = Arc::new(MemoryStore::new());
    ComplianceEngine::new(vec![Arc::new(InternalDncChecker::new(store))])
}

#[tokio::test]
async fn test_batch_splits_compliant_and_failed_records() {
    let parsed = parse_csv(BATCH_CSV).unwrap();
    let report = run_batch(&internal_dnc_engine(), parsed, &batch_policy())
        .await
        .unwrap();

    assert_eq!(report.summary.total_records, 3);
    assert_eq!(report.summary.compliant_records, 1);
    assert_eq!(report.summary.non_compliant_records, 2);
    assert_eq!(report.summary.compliance_rate, "33.3");
    assert_eq!(report.summary.failure_reasons[MISSING_PHONE_REASON], 1);
    assert_eq!(report.summary.failure_reasons["Test number blocked"], 1);

    // Input order survives the worker pool
    assert_eq!(report.non_compliant_details[0].record.get("first_name"), Some("Bo"));
    assert_eq!(report.non_compliant_details[1].record.get("first_name"), Some("Cy"));

    // The compliant CSV reads back as the same record
    let reparsed = parse_csv(&report.compliant_csv).unwrap();
    assert_eq!(reparsed.records.len(), 1);
    assert_eq!(
        lookup_field(&reparsed.records[0], PHONE_ALIASES),
        Some("(650) 776-9592")
    );
    assert_eq!(reparsed.records[0], report.compliant_records[0]);
}

#[tokio::test]
async fn test_empty_batch_is_rejected() {
    let parsed = parse_csv("phone,state\n").unwrap();
    assert!(run_batch(&internal_dnc_engine(), parsed, &batch_policy())
        .await
        .is_err());
}

#[tokio::test]
async fn test_batch_endpoint_accepts_raw_csv() {
    let server = MockServer::start().await;
    mock_clean_checkers(&server).await;
    let (app, _store) = test_app(&server);

    let request = Request::builder()
        .method("POST")
        .uri("/api/compliance/batch")
        .header(header::CONTENT_TYPE, "text/csv")
        .header(header::AUTHORIZATION, format!("Bearer {}", API_KEY))
        .body(Body::from(BATCH_CSV))
        .unwrap();
    let (status, body) = send(&app, request).await;

    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["summary"]["totalRecords"], 3);
    assert_eq!(body["summary"]["compliantRecords"], 1);
    assert!(body["compliantCSV"]
        .as_str()
        .unwrap()
        .contains("\"(650) 776-9592\""));
}

#[tokio::test]
async fn test_bulk_claim_reports_successes_and_failures() {
    let server = MockServer::start().await;
    let good = "b".repeat(40);
    let refused = "c".repeat(40);

    Mock::given(method("POST"))
        .and(path(format!("/{}", good)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "outcome": "success" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/{}", refused)))
        .respond_with(ResponseTemplate::new(410).set_body_json(json!({ "message": "Certificate expired" })))
        .mount(&server)
        .await;

    let (app, _store) = test_app(&server);
    let (status, body) = send(
        &app,
        post_json(
            "/api/trustedform/bulk-claim",
            json!({
                "csvData": [
                    { "certificate_url": format!("https://cert.trustedform.com/{}", good), "phone": "650-776-9592" },
                    { "certificate_url": format!("https://cert.trustedform.com/{}", refused) },
                    { "phone": "6507769592" }
                ]
            }),
        ),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["summary"]["totalProcessed"], 3);
    assert_eq!(body["summary"]["successful"], 1);
    assert_eq!(body["summary"]["failed"], 2);
    assert_eq!(body["summary"]["failureReasons"]["Certificate expired"], 1);
    assert_eq!(body["summary"]["failureReasons"]["Missing certificate URL"], 1);
    assert_eq!(body["successfulClaims"][0]["phone"], CLEAN_PHONE);
}

#[tokio::test]
async fn test_bulk_claim_requires_records() {
    let server = MockServer::start().await;
    let (app, _store) = test_app(&server);

    let (status, _) = send(&app, post_json("/api/trustedform/bulk-claim", json!({}))).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_export_returns_recent_leads_as_csv() {
    let server = MockServer::start().await;
    let (app, store) = test_app(&server);
    let now = chrono::Utc::now();
    store.add_lead_at(CLEAN_PHONE, Some("L100"), now).await;
    store.add_lead_at("2125550100", Some("L200"), now).await;
    store
        .add_lead_at("2125550101", Some("L100"), now - chrono::Duration::days(90))
        .await;

    let (status, headers, body) = send_raw(&app, get("/api/leads/export?list_id=L100&days=30")).await;

    assert_eq!(status, 200);
    assert_eq!(headers[header::CONTENT_TYPE], "text/csv; charset=utf-8");
    let lines: Vec<&str> = body.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("\"id\",\"phone\""));
    assert!(lines[1].contains(CLEAN_PHONE));
}

#[tokio::test]
async fn test_export_requires_api_key() {
    let server = MockServer::start().await;
    let (app, _store) = test_app(&server);

    let request = Request::builder()
        .uri("/api/leads/export")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, 401);
}

fn csv_batch_request(body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/compliance/batch")
        .header(header::CONTENT_TYPE, "text/csv")
        .header(header::AUTHORIZATION, format!("Bearer {}", API_KEY))
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_batch_endpoint_accepts_uploads_above_two_megabytes() {
    let server = MockServer::start().await;
    mock_clean_checkers(&server).await;
    let (app, _store) = test_app(&server);

    let notes = "x".repeat(3 * 1024 * 1024);
    let body = format!("phone,state,notes\n6507769592,TX,{}\n", notes);
    let (status, body) = send(&app, csv_batch_request(body)).await;

    assert_eq!(status, 200);
    assert_eq!(body["summary"]["totalRecords"], 1);
    assert_eq!(body["summary"]["compliantRecords"], 1);
}

#[tokio::test]
async fn test_batch_endpoint_rejects_uploads_above_limit() {
    let server = MockServer::start().await;
    let (app, _store) = test_app(&server);

    let body = "x".repeat(lead_compliance_api::handlers::MAX_BODY_BYTES + 1);
    let (status, _, _) = send_raw(&app, csv_batch_request(body)).await;

    assert_eq!(status, 413);
}
