use crate::auth::constant_time_compare;
use crate::errors::{AppError, ResultExt};
use crate::handlers::AppState;
use crate::models::{Lead, PolicyPostbackRequest, PolicyPostbackResponse};
use crate::normalize::{normalize_email, normalize_phone, to_national_us};
use crate::store::LeadLookup;
use axum::{extract::State, http::HeaderMap, Json};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

const POLICY_STATUSES: &[&str] = &["pending", "issued", "paid", "cancelled", "rejected"];
const DEFAULT_POLICY_STATUS: &str = "pending";

/// Policy Postback Handler
///
/// Receives policy status updates from the dialer for a lead we forwarded.
/// The lead is identified by id, then email, then phone.
///
/// Authentication: when POLICY_POSTBACK_API_KEY is set, the body `api_key`
/// or the X-Webhook-Token header must match it.
pub async fn policy_postback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<PolicyPostbackRequest>,
) -> Result<Json<PolicyPostbackResponse>, AppError> {
    tracing::info!("Received policy postback");

    validate_postback_key(&state, &headers, payload.api_key.as_deref())?;

    let lookup = lead_lookup(&payload)?;
    let policy_status = normalize_policy_status(payload.policy_status.as_deref());

    let lead = state
        .leads
        .find_lead(&lookup)
        .await
        .context("Finding lead for policy postback")?
        .ok_or_else(|| AppError::NotFound("Lead not found".to_string()))?;

    let postback_date = postback_date_for(&lead, policy_status, Utc::now());
    let updated = state
        .leads
        .update_policy_status(lead.id, policy_status, postback_date)
        .await?;

    // Audit rows never fail the postback
    let audit = json!({
        "lead_id": payload.lead_id,
        "compliance_lead_id": payload.compliance_lead_id,
        "email": payload.email,
        "phone": payload.phone,
        "policy_status": payload.policy_status,
    });
    if let Err(e) = state
        .leads
        .record_policy_postback(
            updated.id,
            payload.compliance_lead_id.as_deref(),
            policy_status,
            &audit,
        )
        .await
    {
        tracing::error!("Failed to record policy postback for lead {}: {}", updated.id, e);
    }

    tracing::info!("Lead {} policy status set to {}", updated.id, policy_status);

    Ok(Json(PolicyPostbackResponse {
        success: true,
        lead_id: updated.id,
        policy_status: policy_status.to_string(),
        policy_postback_date: updated.policy_postback_date,
    }))
}

fn validate_postback_key(
    state: &AppState,
    headers: &HeaderMap,
    body_key: Option<&str>,
) -> Result<(), AppError> {
    // No key configured: accepted (warned at startup)
    let Some(ref expected) = state.config.postback_api_key else {
        return Ok(());
    };

    let provided = body_key.or_else(|| {
        headers
            .get("X-Webhook-Token")
            .and_then(|v| v.to_str().ok())
    });

    match provided {
        Some(key) if constant_time_compare(key, expected) => Ok(()),
        Some(_) => {
            tracing::warn!("Invalid policy postback key received");
            Err(AppError::Unauthorized("Invalid postback key".to_string()))
        }
        None => Err(AppError::Unauthorized("Missing postback key".to_string())),
    }
}

/// Id first, then email, then phone.
fn lead_lookup(payload: &PolicyPostbackRequest) -> Result<LeadLookup, AppError> {
    let non_empty = |v: &Option<String>| {
        v.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    if let Some(raw) = non_empty(&payload.compliance_lead_id).or_else(|| non_empty(&payload.lead_id)) {
        let id = Uuid::parse_str(&raw)
            .map_err(|_| AppError::BadRequest(format!("Invalid lead id '{}'", raw)))?;
        return Ok(LeadLookup::Id(id));
    }

    if let Some(email) = non_empty(&payload.email).map(|e| normalize_email(&e)) {
        return Ok(LeadLookup::Email(email));
    }

    if let Some(phone) = non_empty(&payload.phone)
        .map(|p| to_national_us(&normalize_phone(&p)))
        .filter(|p| !p.is_empty())
    {
        return Ok(LeadLookup::Phone(phone));
    }

    Err(AppError::BadRequest(
        "One of lead_id, compliance_lead_id, email or phone is required".to_string(),
    ))
}

/// Lowercased known status; anything else is `pending`.
pub fn normalize_policy_status(raw: Option<&str>) -> &'static str {
    let Some(raw) = raw.map(|s| s.trim().to_lowercase()) else {
        return DEFAULT_POLICY_STATUS;
    };
    // "canceled" is common from the dialer side
    let raw = if raw == "canceled" { "cancelled".to_string() } else { raw };

    POLICY_STATUSES
        .iter()
        .find(|s| **s == raw)
        .copied()
        .unwrap_or(DEFAULT_POLICY_STATUS)
}

/// New postback date, or `None` to keep the stored one.
fn postback_date_for(lead: &Lead, status: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if status == "issued" || lead.policy_postback_date.is_none() {
        Some(now)
    } else {
        None
    }
}
