/// Integration tests with mocked external APIs
/// Exercises checkers, dialer forwarding and postbacks through the router
/// without hitting real external services
mod common;

use bigdecimal::BigDecimal;
use common::*;
use lead_compliance_api::models::{DncEntry, LeadStatus};
use lead_compliance_api::store::LeadRepository;
use serde_json::json;
use std::str::FromStr;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_compliance_check_all_clean() {
    let server = MockServer::start().await;
    mock_clean_checkers(&server).await;
    let (app, _store) = test_app(&server);

    let (status, body) = send(
        &app,
        post_json("/api/compliance/check", json!({ "phone": "(650) 776-9592" })),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["phoneNumber"], CLEAN_PHONE);
    assert_eq!(body["isCompliant"], true);

    let sources: Vec<&str> = body["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["source"].as_str().unwrap())
        .collect();
    assert_eq!(
        sources,
        vec![
            "Internal DNC",
            "Synergy DNC",
            "TCPA Litigator List",
            "Phone Validation"
        ]
    );
}

#[tokio::test]
async fn test_tcpa_litigator_flags_number() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/scrub/phone/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": { "clean": 0, "status_array": ["Litigator"] }
        })))
        .with_priority(1)
        .mount(&server)
        .await;
    mock_clean_checkers(&server).await;

    let (app, _store) = test_app(&server);
    let (status, body) = send(
        &app,
        post_json("/api/compliance/check", json!({ "phone": CLEAN_PHONE })),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["isCompliant"], false);
    let tcpa = &body["results"][2];
    assert_eq!(tcpa["source"], "TCPA Litigator List");
    assert_eq!(tcpa["reasons"], json!(["Litigator"]));
}

#[tokio::test]
async fn test_checker_outage_blocks_for_safety() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/rtb/ping"))
        .respond_with(ResponseTemplate::new(503))
        .with_priority(1)
        .mount(&server)
        .await;
    mock_clean_checkers(&server).await;

    let (app, _store) = test_app(&server);
    let (status, body) = send(
        &app,
        post_json("/api/compliance/check", json!({ "phone": CLEAN_PHONE })),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["isCompliant"], false);
    assert_eq!(
        body["results"][1]["reasons"],
        json!(["Synergy DNC check failed - blocked for safety"])
    );
}

#[tokio::test]
async fn test_internal_dnc_entry_rejects_pre_ping() {
    let server = MockServer::start().await;
    mock_clean_checkers(&server).await;
    let (app, store) = test_app(&server);

    store
        .add_dnc_entry(DncEntry {
            phone_number: CLEAN_PHONE.to_string(),
            reason: Some("Customer request".to_string()),
            source: Some("manual".to_string()),
            status: "active".to_string(),
        })
        .await;

    let (status, body) = send(
        &app,
        post_json(
            "/api/leads/pre-ping",
            json!({ "phone": CLEAN_PHONE, "state": "TX" }),
        ),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["accepted"], false);
    assert_eq!(
        body["rejection_reasons"],
        json!(["Internal DNC: Customer request"])
    );
}

#[tokio::test]
async fn test_submit_lead_forwards_to_internal_dialer() {
    let server = MockServer::start().await;
    mock_clean_checkers(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/webhooks/lead-postback"))
        .and(query_param("list_id", "L100"))
        .and(query_param("token", "list-token"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let (app, store) = test_app(&server);
    store.add_routing(routing("L100", 1, Some("aca"))).await;

    let (status, body) = send(
        &app,
        post_json(
            "/api/leads",
            json!({
                "phone": "+1 650-776-9592",
                "firstName": "Ana",
                "email": " Ana@Example.COM ",
                "state": "tx",
                "zip": "75001",
                "list_id": "L100"
            }),
        ),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["accepted"], true);
    assert_eq!(body["status"], "success");

    let leads = store.leads().await;
    assert_eq!(leads.len(), 1);
    let lead = &leads[0];
    assert_eq!(lead.phone, CLEAN_PHONE);
    assert_eq!(lead.email.as_deref(), Some("ana@example.com"));
    assert_eq!(lead.state.as_deref(), Some("TX"));
    assert_eq!(lead.status, LeadStatus::Success.as_str());
    assert_eq!(lead.bid_amount, Some(BigDecimal::from_str("12.50").unwrap()));
    assert_eq!(body["lead_id"], lead.id.to_string());
}

#[tokio::test]
async fn test_submit_lead_dialer_failure_marks_rejected() {
    let server = MockServer::start().await;
    mock_clean_checkers(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/webhooks/lead-postback"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let (app, store) = test_app(&server);
    store.add_routing(routing("L100", 1, Some("aca"))).await;

    let (status, body) = send(
        &app,
        post_json(
            "/api/leads",
            json!({ "phone": CLEAN_PHONE, "state": "TX", "list_id": "L100" }),
        ),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["accepted"], true);
    assert_eq!(body["status"], "rejected");
    assert_eq!(store.leads().await[0].status, LeadStatus::Rejected.as_str());
}

#[tokio::test]
async fn test_submit_lead_injects_into_pitch_bpo() {
    let server = MockServer::start().await;
    mock_clean_checkers(&server).await;

    Mock::given(method("GET"))
        .and(path("/HttpImport/InjectLead.php"))
        .and(query_param("token", "pitch-token"))
        .and(query_param("PrimaryPhone", CLEAN_PHONE))
        .and(query_param("adv_SubID", "P200"))
        .and(query_param("adv_SubID2", "sub-9"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>OK</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let (app, store) = test_app(&server);
    store.add_routing(routing("P200", 2, Some("aca"))).await;

    let (status, body) = send(
        &app,
        post_json(
            "/api/leads",
            json!({
                "phone": CLEAN_PHONE,
                "state": "WI",
                "list_id": "P200",
                "subid": "sub-9"
            }),
        ),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["status"], "success");
}

#[tokio::test]
async fn test_submit_lead_unknown_list_is_not_found() {
    let server = MockServer::start().await;
    mock_clean_checkers(&server).await;
    let (app, store) = test_app(&server);

    let (status, _body) = send(
        &app,
        post_json(
            "/api/leads",
            json!({ "phone": CLEAN_PHONE, "state": "TX", "list_id": "nope" }),
        ),
    )
    .await;

    assert_eq!(status, 404);
    assert!(store.leads().await.is_empty());
}

#[tokio::test]
async fn test_rejected_submission_is_not_stored() {
    let server = MockServer::start().await;
    mock_clean_checkers(&server).await;
    let (app, store) = test_app(&server);
    store.add_routing(routing("L100", 1, Some("aca"))).await;

    let (status, body) = send(
        &app,
        post_json(
            "/api/leads",
            json!({ "phone": CLEAN_PHONE, "state": "CA", "list_id": "L100" }),
        ),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["accepted"], false);
    assert_eq!(
        body["rejection_reasons"],
        json!(["State CA not allowed for internal dialer"])
    );
    assert!(store.leads().await.is_empty());
}

#[tokio::test]
async fn test_trustedform_refusal_rejects_submission() {
    let server = MockServer::start().await;
    mock_clean_checkers(&server).await;

    let cert_id = "a".repeat(40);
    Mock::given(method("POST"))
        .and(path(format!("/{}", cert_id)))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "message": "Certificate not found"
        })))
        .mount(&server)
        .await;

    let (app, store) = test_app(&server);
    store.add_routing(routing("L100", 1, Some("aca"))).await;

    let (status, body) = send(
        &app,
        post_json(
            "/api/leads",
            json!({
                "phone": CLEAN_PHONE,
                "state": "TX",
                "list_id": "L100",
                "trusted_form_cert_url": format!("https://cert.trustedform.com/{}", cert_id)
            }),
        ),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["accepted"], false);
    assert_eq!(
        body["rejection_reasons"],
        json!(["TrustedForm: Certificate not found"])
    );
}

#[tokio::test]
async fn test_policy_postback_updates_lead() {
    let server = MockServer::start().await;
    let (app, store) = test_app(&server);
    let lead_id = store.add_lead_at(CLEAN_PHONE, Some("L100"), chrono::Utc::now()).await;

    let (status, body) = send(
        &app,
        post_json(
            "/api/policy-postback",
            json!({ "lead_id": lead_id.to_string(), "policy_status": "Issued" }),
        ),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["policy_status"], "issued");
    assert!(!body["policy_postback_date"].is_null());

    let lead = store
        .find_lead(&lead_compliance_api::store::LeadLookup::Id(lead_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(lead.policy_status.as_deref(), Some("issued"));

    let postbacks = store.postbacks().await;
    assert_eq!(postbacks.len(), 1);
    assert_eq!(postbacks[0].policy_status, "issued");
}

#[tokio::test]
async fn test_policy_postback_by_phone_and_missing_lead() {
    let server = MockServer::start().await;
    let (app, store) = test_app(&server);
    store.add_lead_at(CLEAN_PHONE, None, chrono::Utc::now()).await;

    let (status, body) = send(
        &app,
        post_json(
            "/api/policy-postback",
            json!({ "phone": "1-650-776-9592", "policy_status": "whatever" }),
        ),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["policy_status"], "pending");

    let (status, _) = send(
        &app,
        post_json(
            "/api/policy-postback",
            json!({ "phone": "2125550000", "policy_status": "paid" }),
        ),
    )
    .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_policy_postback_requires_configured_key() {
    let server = MockServer::start().await;
    let mut config = lead_compliance_api::config::Config::for_base_url(&server.uri());
    config.postback_api_key = Some("postback-secret".to_string());
    let (app, store) = test_app_with_config(config);
    let lead_id = store.add_lead_at(CLEAN_PHONE, None, chrono::Utc::now()).await;

    let (status, _) = send(
        &app,
        post_json(
            "/api/policy-postback",
            json!({ "lead_id": lead_id.to_string(), "policy_status": "paid", "api_key": "wrong" }),
        ),
    )
    .await;
    assert_eq!(status, 401);

    let (status, _) = send(
        &app,
        post_json(
            "/api/policy-postback",
            json!({ "lead_id": lead_id.to_string(), "policy_status": "paid", "api_key": "postback-secret" }),
        ),
    )
    .await;
    assert_eq!(status, 200);
}
