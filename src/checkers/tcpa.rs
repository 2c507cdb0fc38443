use super::{build_http_client, ensure_success, ComplianceChecker};
use crate::errors::AppError;
use crate::models::ComplianceCheckResult;
use crate::normalize::normalize_phone;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ScrubResults {
    clean: Option<i64>,
    #[serde(default)]
    status_array: Vec<String>,
    status: Option<String>,
}

/// TCPA litigator list scrub.
#[derive(Clone)]
pub struct TcpaChecker {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl TcpaChecker {
    pub fn new(
        base_url: String,
        username: String,
        password: String,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        Ok(Self {
            client: build_http_client(timeout)?,
            base_url,
            username,
            password,
        })
    }
}

#[async_trait]
impl ComplianceChecker for TcpaChecker {
    fn name(&self) -> &str {
        "TCPA Litigator List"
    }

    async fn check(&self, identifier: &str) -> Result<ComplianceCheckResult, AppError> {
        let phone = normalize_phone(identifier);
        if phone.len() < 10 || phone.len() > 15 {
            return Ok(ComplianceCheckResult::non_compliant(
                self.name(),
                vec!["Invalid phone number format".to_string()],
            ));
        }

        let url = format!("{}/scrub/phone/", self.base_url);
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .form(&[
                ("type", r#"["tcpa","dnc"]"#),
                ("phone_number", phone.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("TCPA request failed: {}", e)))?;

        let data: Value = ensure_success(response, "TCPA Litigator List")
            .await?
            .json()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Failed to parse TCPA response: {}", e)))?;

        let results: ScrubResults = data
            .get("results")
            .cloned()
            .ok_or_else(|| {
                AppError::ExternalApiError("TCPA response missing 'results'".to_string())
            })
            .and_then(|r| {
                serde_json::from_value(r).map_err(|e| {
                    AppError::ExternalApiError(format!("Unexpected TCPA results shape: {}", e))
                })
            })?;

        let result = if results.clean == Some(1) {
            ComplianceCheckResult::compliant(self.name())
        } else {
            let reasons = if results.status_array.is_empty() {
                vec![results
                    .status
                    .unwrap_or_else(|| "Unknown reason".to_string())]
            } else {
                results.status_array
            };
            ComplianceCheckResult::non_compliant(self.name(), reasons)
        };

        Ok(result.with_raw(data))
    }
}
