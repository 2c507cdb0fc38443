use crate::auth::{bearer_token, ApiKeyValidator};
use crate::batch::{batch_policy, run_batch, BatchReport};
use crate::bulk_claim::{run_bulk_claim, BulkClaimOptions, BulkClaimReport};
use crate::checkers::{ComplianceChecker, RetainRequest, TrustedFormChecker, TrustedFormClient};
use crate::config::Config;
use crate::csv_records::{leads_to_csv, parse_csv, CsvRecord};
use crate::dialer_client::DialerClient;
use crate::duplicate::{DuplicateLookup, DUPLICATE_WINDOW_DAYS};
use crate::engine::ComplianceEngine;
use crate::errors::{AppError, ResultExt};
use crate::models::*;
use crate::normalize::{normalize_email, normalize_phone, normalize_postal, to_national_us};
use crate::postback_handler::policy_postback;
use crate::pre_ping::{PrePingService, StateAllowLists};
use crate::rejection_log::RejectionLogger;
use crate::routing_cache::VerticalCache;
use crate::store::{DncStore, LeadRepository, RejectionStore, RoutingStore};
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tower_http::limit::RequestBodyLimitLayer;

const SUBMIT_ENDPOINT: &str = "/api/leads";
const MAX_EXPORT_DAYS: i64 = 365;

/// Request body cap. CSV batches need more than axum's 2 MB extractor default.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    pub leads: Arc<dyn LeadRepository>,
    pub routings: Arc<dyn RoutingStore>,
    /// State, duplicate and compliance checks shared by pre-ping and submission.
    pub pre_ping: PrePingService,
    pub dialer: DialerClient,
    /// Present when `TRUSTEDFORM_API_KEY` is configured.
    pub trustedform: Option<TrustedFormClient>,
    pub api_keys: ApiKeyValidator,
}

impl AppState {
    /// Wires every service over one store. Spawns the rejection logger, so
    /// this must run inside the Tokio runtime.
    pub fn new<S>(config: Config, store: Arc<S>) -> Result<Self, AppError>
    where
        S: LeadRepository + RoutingStore + DncStore + RejectionStore + 'static,
    {
        let leads: Arc<dyn LeadRepository> = store.clone();
        let routings: Arc<dyn RoutingStore> = store.clone();
        let dnc: Arc<dyn DncStore> = store.clone();
        let rejections: Arc<dyn RejectionStore> = store;

        let engine = ComplianceEngine::from_config(&config, dnc)?;
        let duplicates = DuplicateLookup::new(leads.clone(), VerticalCache::new(routings.clone()));
        let (logger, _worker) = RejectionLogger::spawn(rejections, config.rejection_queue_capacity);

        let trustedform = match &config.trustedform_api_key {
            Some(key) => Some(TrustedFormClient::new(
                config.trustedform_base_url.clone(),
                key.clone(),
                std::time::Duration::from_secs(config.checker_timeout_secs),
            )?),
            None => {
                tracing::warn!("TRUSTEDFORM_API_KEY not set - certificate checks disabled");
                None
            }
        };

        if config.postback_api_key.is_none() {
            tracing::warn!("POLICY_POSTBACK_API_KEY not set - policy postbacks are unauthenticated");
        }

        Ok(Self {
            pre_ping: PrePingService::new(
                duplicates,
                engine,
                logger,
                StateAllowLists::from_config(&config),
            ),
            dialer: DialerClient::from_config(&config)?,
            api_keys: ApiKeyValidator::new(&config.api_keys),
            trustedform,
            leads,
            routings,
            config,
        })
    }
}

/// Every route, with the body limit but without rate limiting.
pub fn api_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(with_body_limit(api_routes(state)))
}

/// Raises the extractor limit and enforces [`MAX_BODY_BYTES`] on the raw body.
pub fn with_body_limit(router: Router) -> Router {
    router
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
}

/// Authenticated API routes. `/health` is kept out so it can bypass rate
/// limiting.
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/leads", post(submit_lead))
        .route("/api/leads/pre-ping", get(pre_ping_get).post(pre_ping_post))
        .route("/api/leads/export", get(export_leads))
        .route("/api/leads/dedupe-stats", get(dedupe_stats))
        .route("/api/compliance/check", post(compliance_check))
        .route("/api/compliance/batch", post(compliance_batch))
        .route("/api/trustedform/bulk-claim", post(bulk_claim))
        .route("/api/policy-postback", post(policy_postback))
        .with_state(state)
}

fn require_api_key(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    if state.api_keys.is_valid(bearer_token(headers)) {
        Ok(())
    } else {
        tracing::warn!("Rejected request with invalid or missing API key");
        Err(AppError::Unauthorized("Invalid or missing API key".to_string()))
    }
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "lead-compliance-api",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

// ============ Pre-Ping ============

fn pre_ping_failure(status: StatusCode, error: &str, reason: &str, started: Instant) -> Response {
    (
        status,
        Json(json!({
            "success": false,
            "accepted": false,
            "error": error,
            "rejection_reasons": [reason],
            "processing_time_ms": started.elapsed().as_millis() as u64,
        })),
    )
        .into_response()
}

async fn run_pre_ping(state: &AppState, headers: &HeaderMap, request: PrePingRequest) -> Response {
    let started = Instant::now();

    if !state.api_keys.is_valid(bearer_token(headers)) {
        return pre_ping_failure(
            StatusCode::UNAUTHORIZED,
            "Invalid or missing API key",
            "Authentication failed",
            started,
        );
    }

    match state.pre_ping.evaluate(&request).await {
        Ok(response) => {
            let result = if response.accepted { "accepted" } else { "rejected" };
            (
                StatusCode::OK,
                [
                    ("X-Processing-Time", response.processing_time_ms.to_string()),
                    ("X-Pre-Ping-Result", result.to_string()),
                ],
                Json(response),
            )
                .into_response()
        }
        Err(AppError::BadRequest(_)) => pre_ping_failure(
            StatusCode::BAD_REQUEST,
            "Phone number is required",
            "Missing phone number",
            started,
        ),
        Err(e) => {
            tracing::error!("Pre-ping validation error: {}", e);
            pre_ping_failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Pre-ping validation failed",
                "System error during validation",
                started,
            )
        }
    }
}

/// POST /api/leads/pre-ping
///
/// Body errors answer with the pre-ping envelope rather than axum's plain text.
pub async fn pre_ping_post(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<PrePingRequest>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(request)) => run_pre_ping(&state, &headers, request).await,
        Err(rejection) => {
            tracing::warn!("Rejected pre-ping body: {}", rejection.body_text());
            pre_ping_failure(
                rejection.status(),
                "Invalid request body",
                &rejection.body_text(),
                Instant::now(),
            )
        }
    }
}

/// GET /api/leads/pre-ping
///
/// Without a `phone` parameter this describes the endpoint and needs no key.
pub async fn pre_ping_get(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(request): Query<PrePingRequest>,
) -> Response {
    if request.phone.as_deref().map_or(true, |p| p.trim().is_empty()) {
        return Json(json!({
            "endpoint": "pre-ping",
            "status": "active",
            "description": "Lead pre-validation endpoint - supports both GET (query params) and POST (JSON body)",
            "timestamp": Utc::now().to_rfc3339(),
            "usage": {
                "GET": "Use query parameters: ?phone=1234567890&state=TX&dialer_type=pitch_bpo",
                "POST": "Send JSON body with phone, state, and other optional fields"
            }
        }))
        .into_response();
    }

    run_pre_ping(&state, &headers, request).await
}

// ============ Lead Submission ============

/// POST /api/leads
///
/// Runs the pre-ping checks (plus TrustedForm when a certificate is given),
/// stores the lead with the routing bid and forwards it to the dialer.
pub async fn submit_lead(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<SubmitLeadRequest>,
) -> Result<Json<SubmitLeadResponse>, AppError> {
    require_api_key(&state, &headers)?;

    let phone = payload
        .phone
        .as_deref()
        .map(|p| to_national_us(&normalize_phone(p)))
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing phone number".to_string()))?;
    let list_id = payload
        .list_id
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .ok_or_else(|| AppError::BadRequest("list_id is required".to_string()))?;

    let routing = state
        .routings
        .find_active_routing(list_id)
        .await
        .context("Routing lookup")?
        .ok_or_else(|| AppError::NotFound(format!("No active routing for list {}", list_id)))?;

    let email = payload
        .email
        .as_deref()
        .map(normalize_email)
        .filter(|e| !e.is_empty());
    let cert_url = payload
        .trusted_form_cert_url
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());

    let check_request = PrePingRequest {
        phone: Some(phone.clone()),
        state: payload.state.clone(),
        email: email.clone(),
        first_name: payload.first_name.clone(),
        last_name: payload.last_name.clone(),
        list_id: Some(list_id.to_string()),
        dialer_type: Some(routing.dialer().as_str().to_string()),
    };
    let decision = state
        .pre_ping
        .evaluate_for(&check_request, SUBMIT_ENDPOINT, cert_url.is_some())
        .await?;
    let mut rejection_reasons = decision.rejection_reasons;

    if let (Some(cert_url), Some(client)) = (cert_url, &state.trustedform) {
        let checker = TrustedFormChecker::for_lead(
            client.clone(),
            RetainRequest {
                email: email.clone(),
                phone: Some(phone.clone()),
                reference: Some(list_id.to_string()),
                vendor: None,
            },
        );
        match checker.check(cert_url).await {
            Ok(result) if result.is_compliant => {}
            Ok(result) => rejection_reasons.push(format!(
                "{}: {}",
                result.source,
                result.reasons.join(", ")
            )),
            Err(e) => {
                tracing::error!("TrustedForm check failed, rejecting: {}", e);
                rejection_reasons.push(format!(
                    "{} check failed - blocked for safety",
                    checker.name()
                ));
            }
        }
    }

    if !rejection_reasons.is_empty() {
        tracing::info!("Lead for list {} rejected: {:?}", list_id, rejection_reasons);
        return Ok(Json(SubmitLeadResponse {
            success: true,
            accepted: false,
            lead_id: None,
            status: None,
            rejection_reasons,
            bid: None,
        }));
    }

    let lead = state
        .leads
        .insert_lead(&NewLead {
            phone,
            email,
            first_name: payload.first_name.clone(),
            last_name: payload.last_name.clone(),
            address: payload.address.clone(),
            city: payload.city.clone(),
            state: payload.state.as_deref().map(|s| s.trim().to_uppercase()),
            zip_code: payload.zip_code.as_deref().map(normalize_postal),
            list_id: Some(list_id.to_string()),
            campaign_id: routing.campaign_id.clone(),
            cadence_id: routing.cadence_id.clone(),
            bid_amount: Some(routing.bid.clone()),
            trusted_form_cert_url: cert_url.map(str::to_string),
        })
        .await
        .context("Insert lead")?;
    tracing::info!("Stored lead {} for list {}", lead.id, list_id);

    let status = match state
        .dialer
        .forward(&lead, &routing, payload.subid.as_deref())
        .await
    {
        Ok(forward) => {
            tracing::info!("Lead {} forwarded to {} ({})", lead.id, forward.dialer, forward.status);
            LeadStatus::Success
        }
        Err(e) => {
            tracing::error!("Failed to forward lead {}: {}", lead.id, e);
            LeadStatus::Rejected
        }
    };

    if let Err(e) = state.leads.update_lead_status(lead.id, status).await {
        tracing::error!("Failed to record status for lead {}: {}", lead.id, e);
    }

    Ok(Json(SubmitLeadResponse {
        success: true,
        accepted: true,
        lead_id: Some(lead.id),
        status: Some(status),
        rejection_reasons: Vec::new(),
        bid: lead.bid_amount,
    }))
}

// ============ Export & Stats ============

#[derive(Debug, Deserialize)]
pub struct ExportParams {
    pub list_id: Option<String>,
    pub days: Option<i64>,
}

/// GET /api/leads/export
pub async fn export_leads(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<ExportParams>,
) -> Result<Response, AppError> {
    require_api_key(&state, &headers)?;

    let days = params
        .days
        .unwrap_or(DUPLICATE_WINDOW_DAYS)
        .clamp(1, MAX_EXPORT_DAYS);
    let since = Utc::now() - Duration::days(days);
    let list_id = params.list_id.as_deref().filter(|l| !l.trim().is_empty());

    let leads = state
        .leads
        .leads_since(since, list_id)
        .await
        .context("Lead export")?;
    tracing::info!("Exporting {} leads from the last {} days", leads.len(), days);

    let body = leads_to_csv(&leads)?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"leads-{}d.csv\"", days),
            ),
        ],
        body,
    )
        .into_response())
}

/// GET /api/leads/dedupe-stats
pub async fn dedupe_stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    require_api_key(&state, &headers)?;

    let stats = state.pre_ping.duplicates().verticals().stats().await;
    Ok(Json(json!({
        "success": true,
        "window_days": DUPLICATE_WINDOW_DAYS,
        "vertical_cache": stats,
    })))
}

// ============ Compliance ============

#[derive(Debug, Deserialize)]
pub struct ComplianceCheckRequest {
    #[serde(alias = "phoneNumber")]
    pub phone: Option<String>,
}

/// POST /api/compliance/check
pub async fn compliance_check(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ComplianceCheckRequest>,
) -> Result<Json<ComplianceReport>, AppError> {
    require_api_key(&state, &headers)?;

    let phone = request
        .phone
        .as_deref()
        .map(normalize_phone)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing phone number".to_string()))?;

    Ok(Json(state.pre_ping.engine().check_phone_number(&phone).await))
}

/// POST /api/compliance/batch
///
/// Body is the CSV file itself.
pub async fn compliance_batch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<BatchReport>, AppError> {
    require_api_key(&state, &headers)?;

    let parsed = parse_csv(&body)?;
    let report = run_batch(state.pre_ping.engine(), parsed, &batch_policy()).await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct BulkClaimRequest {
    #[serde(rename = "csvData")]
    pub csv_data: Option<Vec<CsvRecord>>,
}

/// POST /api/trustedform/bulk-claim
pub async fn bulk_claim(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<BulkClaimRequest>,
) -> Result<Json<BulkClaimReport>, AppError> {
    require_api_key(&state, &headers)?;

    let records = request.csv_data.ok_or_else(|| {
        AppError::BadRequest("Invalid CSV data. Expected an array of records.".to_string())
    })?;
    let client = state
        .trustedform
        .as_ref()
        .ok_or_else(|| AppError::Unavailable("TrustedForm is not configured".to_string()))?;

    let options = BulkClaimOptions::for_record_count(records.len());
    let report = run_bulk_claim(client, records, options).await?;
    Ok(Json(report))
}

