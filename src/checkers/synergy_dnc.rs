use super::{build_http_client, ensure_success, ComplianceChecker};
use crate::errors::AppError;
use crate::models::ComplianceCheckResult;
use crate::normalize::normalize_phone;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

/// Synergy real-time-bidding ping, used as a DNC lookup.
#[derive(Clone)]
pub struct SynergyDncChecker {
    client: reqwest::Client,
    url: String,
}

impl SynergyDncChecker {
    pub fn new(url: String, timeout: Duration) -> Result<Self, AppError> {
        Ok(Self {
            client: build_http_client(timeout)?,
            url,
        })
    }
}

#[async_trait]
impl ComplianceChecker for SynergyDncChecker {
    fn name(&self) -> &str {
        "Synergy DNC"
    }

    async fn check(&self, identifier: &str) -> Result<ComplianceCheckResult, AppError> {
        let phone = normalize_phone(identifier);

        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "caller_id": phone }))
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Synergy DNC request failed: {}", e)))?;

        let data: Value = ensure_success(response, "Synergy DNC")
            .await?
            .json()
            .await
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to parse Synergy DNC response: {}", e))
            })?;

        let on_dnc = data.get("rejection_reason").and_then(|v| v.as_str()) == Some("internal_dnc");
        tracing::debug!("Synergy DNC lookup complete, on list: {}", on_dnc);

        let result = if on_dnc {
            ComplianceCheckResult::non_compliant(
                self.name(),
                vec!["Number found on Synergy DNC list (rejection_reason: internal_dnc)".to_string()],
            )
        } else {
            ComplianceCheckResult::compliant(self.name())
        };

        Ok(result.with_raw(data))
    }
}
