//! Pre-ping decision: state allow-list, duplicate lookup and the compliance
//! engine, combined into one accept/reject answer.

use crate::config::Config;
use crate::duplicate::{DuplicateLookup, DUPLICATE_WINDOW_DAYS};
use crate::engine::ComplianceEngine;
use crate::errors::AppError;
use crate::models::{
    CheckOutcome, DialerType, DuplicateCheckResult, PrePingChecks, PrePingRequest,
    PrePingResponse, RejectionReason, RejectionRecord,
};
use crate::normalize::normalize_phone;
use crate::rejection_log::{sanitized_metadata, RejectionLogger};
use serde_json::json;
use std::time::Instant;

pub const PRE_PING_ENDPOINT: &str = "/api/leads/pre-ping";

/// Bid quoted to an accepted pre-ping.
pub const DEFAULT_ESTIMATED_BID: f64 = 0.50;

/// Allowed states per dialer, uppercase two-letter codes.
#[derive(Debug, Clone)]
pub struct StateAllowLists {
    pub internal: Vec<String>,
    pub pitch_bpo: Vec<String>,
}

impl StateAllowLists {
    pub fn from_config(config: &Config) -> Self {
        Self {
            internal: config.internal_allowed_states.clone(),
            pitch_bpo: config.pitch_bpo_allowed_states.clone(),
        }
    }

    pub fn for_dialer(&self, dialer: DialerType) -> &[String] {
        match dialer {
            DialerType::Internal => &self.internal,
            DialerType::PitchBpo => &self.pitch_bpo,
        }
    }
}

pub fn check_state_compliance(
    state: Option<&str>,
    dialer: DialerType,
    allow_lists: &StateAllowLists,
) -> CheckOutcome {
    let Some(state) = state.map(str::trim).filter(|s| !s.is_empty()) else {
        return CheckOutcome::fail("State is required");
    };

    let state = state.to_uppercase();
    let allowed = allow_lists.for_dialer(dialer);

    if allowed.iter().any(|s| *s == state) {
        CheckOutcome::pass()
    } else {
        CheckOutcome::fail(format!("State {} not allowed for {} dialer", state, dialer))
            .with_details(json!({ "allowedStates": allowed, "dialerType": dialer }))
    }
}

fn field_count(request: &PrePingRequest) -> usize {
    [
        request.phone.is_some(),
        request.state.is_some(),
        request.email.is_some(),
        request.first_name.is_some(),
        request.last_name.is_some(),
        request.list_id.is_some(),
        request.dialer_type.is_some(),
    ]
    .iter()
    .filter(|present| **present)
    .count()
}

/// Everything a pre-ping (or a lead submission) needs to reach a decision.
#[derive(Clone)]
pub struct PrePingService {
    duplicates: DuplicateLookup,
    engine: ComplianceEngine,
    rejections: RejectionLogger,
    allow_lists: StateAllowLists,
}

impl PrePingService {
    pub fn new(
        duplicates: DuplicateLookup,
        engine: ComplianceEngine,
        rejections: RejectionLogger,
        allow_lists: StateAllowLists,
    ) -> Self {
        Self {
            duplicates,
            engine,
            rejections,
            allow_lists,
        }
    }

    pub fn duplicates(&self) -> &DuplicateLookup {
        &self.duplicates
    }

    pub fn engine(&self) -> &ComplianceEngine {
        &self.engine
    }

    pub async fn evaluate(&self, request: &PrePingRequest) -> Result<PrePingResponse, AppError> {
        self.evaluate_for(request, PRE_PING_ENDPOINT, false).await
    }

    /// Runs every step, even after an earlier one rejected. `endpoint` and
    /// `has_trustedform` only feed the rejection log.
    pub async fn evaluate_for(
        &self,
        request: &PrePingRequest,
        endpoint: &str,
        has_trustedform: bool,
    ) -> Result<PrePingResponse, AppError> {
        let started = Instant::now();

        let phone = request
            .phone
            .as_deref()
            .map(normalize_phone)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AppError::BadRequest("Missing phone number".to_string()))?;
        let list_id = request
            .list_id
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty());
        let dialer = DialerType::parse_lenient(request.dialer_type.as_deref());

        tracing::info!(
            "Pre-ping for list {}, state {:?}, dialer {}",
            list_id.unwrap_or("none"),
            request.state,
            dialer
        );

        let mut rejection_reasons = Vec::new();

        // State
        let state = check_state_compliance(request.state.as_deref(), dialer, &self.allow_lists);
        if let Some(reason) = state.reason.as_ref().filter(|_| !state.is_compliant) {
            tracing::info!("State check failed: {}", reason);
            rejection_reasons.push(reason.clone());
        }

        // Duplicate
        let lookup = match list_id {
            Some(list_id) => {
                self.duplicates
                    .check_for_duplicate_lead_in_vertical(&phone, list_id)
                    .await
            }
            None => self.duplicates.check_for_duplicate_lead(&phone).await,
        };

        let duplicate = match lookup {
            Ok(DuplicateCheckResult {
                is_duplicate: true,
                details: Some(details),
            }) => {
                rejection_reasons.push(format!(
                    "Duplicate lead (last seen {} days ago, vertical: {}, check: {})",
                    details.days_ago,
                    details.vertical.as_deref().unwrap_or("unknown"),
                    details.check_type
                ));

                self.rejections.log(RejectionRecord {
                    phone: phone.clone(),
                    incoming_list_id: list_id.unwrap_or("unknown").to_string(),
                    matched_lead_id: details.matched_lead_id.clone(),
                    matched_list_id: details.list_id.clone(),
                    rejection_reason: RejectionReason::Duplicate,
                    rejection_type: Some(details.check_type.as_str().to_string()),
                    incoming_vertical: details.vertical.clone(),
                    matched_vertical: details.vertical.clone(),
                    days_since_original: Some(details.days_ago),
                    endpoint: endpoint.to_string(),
                    rejection_details: serde_json::to_value(&details).ok(),
                    request_metadata: sanitized_metadata(
                        list_id,
                        request.state.as_deref(),
                        dialer,
                        request.email.is_some(),
                        has_trustedform,
                        field_count(request),
                    ),
                });

                CheckOutcome::fail(format!(
                    "Duplicate lead found within {} days",
                    DUPLICATE_WINDOW_DAYS
                ))
                .with_details(serde_json::to_value(&details).unwrap_or_default())
            }
            Ok(_) => CheckOutcome::pass(),
            Err(e) => {
                tracing::error!("Duplicate check failed, rejecting: {}", e);
                rejection_reasons.push("Unable to verify duplicate status".to_string());
                CheckOutcome::fail("Duplicate check error")
            }
        };

        // Compliance
        let report = self.engine.check_phone_number(&phone).await;
        let results = serde_json::to_value(&report.results).unwrap_or_default();
        let compliance = if report.is_compliant {
            CheckOutcome::pass().with_details(results)
        } else {
            let summary = report.failure_summary();
            tracing::info!("Compliance checks failed: {}", summary);
            rejection_reasons.push(if summary.is_empty() {
                "Compliance validation failed".to_string()
            } else {
                summary
            });
            CheckOutcome::fail("Failed compliance checks").with_details(results)
        };

        let accepted = rejection_reasons.is_empty();
        let processing_time_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            "Pre-ping {} in {}ms ({} reasons)",
            if accepted { "accepted" } else { "rejected" },
            processing_time_ms,
            rejection_reasons.len()
        );

        Ok(PrePingResponse {
            success: true,
            accepted,
            rejection_reasons,
            estimated_bid: if accepted { DEFAULT_ESTIMATED_BID } else { 0.0 },
            checks: PrePingChecks {
                duplicate,
                state,
                compliance,
            },
            processing_time_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_INTERNAL_STATES;
    use crate::memory_store::MemoryStore;
    use crate::routing_cache::VerticalCache;
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    fn allow_lists() -> StateAllowLists {
        let states: Vec<String> = DEFAULT_INTERNAL_STATES.iter().map(|s| s.to_string()).collect();
        StateAllowLists {
            internal: states.iter().filter(|s| *s != "WI").cloned().collect(),
            pitch_bpo: states,
        }
    }

    fn service(store: Arc<MemoryStore>) -> (PrePingService, tokio::sync::mpsc::Receiver<RejectionRecord>) {
        let (logger, rx) = RejectionLogger::channel(16);
        let duplicates = DuplicateLookup::new(store.clone(), VerticalCache::new(store));
        (
            PrePingService::new(duplicates, ComplianceEngine::new(vec![]), logger, allow_lists()),
            rx,
        )
    }

    fn request(phone: &str, state: &str) -> PrePingRequest {
        PrePingRequest {
            phone: Some(phone.to_string()),
            state: Some(state.to_string()),
            dialer_type: Some("internal".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn state_is_checked_against_the_dialer_list() {
        let lists = allow_lists();
        assert!(check_state_compliance(Some("tx"), DialerType::Internal, &lists).is_compliant);

        let missing = check_state_compliance(None, DialerType::Internal, &lists);
        assert_eq!(missing.reason.as_deref(), Some("State is required"));

        let wi = check_state_compliance(Some("WI"), DialerType::Internal, &lists);
        assert_eq!(
            wi.reason.as_deref(),
            Some("State WI not allowed for internal dialer")
        );
        assert!(check_state_compliance(Some("WI"), DialerType::PitchBpo, &lists).is_compliant);
    }

    #[tokio::test]
    async fn clean_lead_is_accepted_with_default_bid() {
        let (service, _rx) = service(Arc::new(MemoryStore::new()));

        let response = service.evaluate(&request("6507769592", "TX")).await.unwrap();
        assert!(response.accepted);
        assert!(response.rejection_reasons.is_empty());
        assert_eq!(response.estimated_bid, 0.50);
    }

    #[tokio::test]
    async fn every_step_contributes_reasons() {
        let store = Arc::new(MemoryStore::new());
        store
            .add_lead_at("6507769592", None, Utc::now() - Duration::days(2))
            .await;
        let (service, mut rx) = service(store);

        let response = service.evaluate(&request("650-776-9592", "CA")).await.unwrap();
        assert!(!response.accepted);
        assert_eq!(response.estimated_bid, 0.0);
        assert_eq!(response.rejection_reasons.len(), 2);
        assert_eq!(
            response.rejection_reasons[0],
            "State CA not allowed for internal dialer"
        );
        assert_eq!(
            response.rejection_reasons[1],
            "Duplicate lead (last seen 2 days ago, vertical: unknown, check: global)"
        );

        let logged = rx.try_recv().unwrap();
        assert_eq!(logged.incoming_list_id, "unknown");
        assert_eq!(logged.endpoint, PRE_PING_ENDPOINT);
        assert_eq!(logged.days_since_original, Some(2));
    }

    #[tokio::test]
    async fn unavailable_store_rejects() {
        let store = Arc::new(MemoryStore::new());
        store.set_unavailable(true);
        let (service, _rx) = service(store);

        let response = service.evaluate(&request("6507769592", "TX")).await.unwrap();
        assert!(!response.accepted);
        assert_eq!(
            response.rejection_reasons,
            vec!["Unable to verify duplicate status".to_string()]
        );
    }

    #[tokio::test]
    async fn missing_phone_is_a_bad_request() {
        let (service, _rx) = service(Arc::new(MemoryStore::new()));
        let err = service
            .evaluate(&PrePingRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
