use super::{build_http_client, ComplianceChecker};
use crate::errors::AppError;
use crate::models::ComplianceCheckResult;
use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::OnceLock;
use std::time::Duration;

pub const DEFAULT_VENDOR: &str = "Compliance Engine";

/// Pulls the 40-hex-digit certificate id out of a certificate URL (or a bare id).
pub fn extract_certificate_id(certificate: &str) -> Option<String> {
    static CERT_ID: OnceLock<Option<Regex>> = OnceLock::new();
    CERT_ID
        .get_or_init(|| Regex::new(r"(?i)\b([a-f0-9]{40})\b").ok())
        .as_ref()?
        .captures(certificate.trim())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase())
}

/// Lead data matched against the certificate, plus retention metadata.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetainRequest {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub reference: Option<String>,
    pub vendor: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetainOutcome {
    /// Certificate claimed; carries the response body.
    Retained(Value),
    /// TrustedForm refused the claim (expired, not found, mismatch).
    Refused(Vec<String>),
}

/// Client for the TrustedForm certificate retain API.
#[derive(Clone)]
pub struct TrustedFormClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl TrustedFormClient {
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> Result<Self, AppError> {
        Ok(Self {
            client: build_http_client(timeout)?,
            base_url,
            api_key,
        })
    }

    /// Claims a certificate. 4xx responses (other than 429) are a refusal;
    /// 429, 5xx and transport failures are errors so callers can retry.
    pub async fn retain(
        &self,
        certificate: &str,
        request: &RetainRequest,
    ) -> Result<RetainOutcome, AppError> {
        let cert_id = extract_certificate_id(certificate).ok_or_else(|| {
            AppError::BadRequest("Invalid TrustedForm certificate URL".to_string())
        })?;

        let url = format!("{}/{}", self.base_url, cert_id);
        let body = json!({
            "match_lead": {
                "email": request.email,
                "phone": request.phone,
            },
            "retain": {
                "reference": request.reference,
                "vendor": request.vendor.as_deref().unwrap_or(DEFAULT_VENDOR),
            }
        });

        let response = self
            .client
            .post(&url)
            .basic_auth("API", Some(&self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("TrustedForm request failed: {}", e)))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let data: Value = serde_json::from_str(&text).unwrap_or(Value::String(text));

        if status.is_success() {
            return Ok(RetainOutcome::Retained(data));
        }

        if status.is_client_error() && status != reqwest::StatusCode::TOO_MANY_REQUESTS {
            let reasons = refusal_reasons(&data)
                .unwrap_or_else(|| vec![format!("TrustedForm returned {}", status)]);
            tracing::info!("TrustedForm refused certificate {}: {:?}", cert_id, reasons);
            return Ok(RetainOutcome::Refused(reasons));
        }

        Err(AppError::ExternalApiError(format!(
            "TrustedForm returned {}: {}",
            status, data
        )))
    }
}

fn refusal_reasons(data: &Value) -> Option<Vec<String>> {
    if let Some(message) = data.get("message").and_then(|m| m.as_str()) {
        return Some(vec![message.to_string()]);
    }
    let errors = data.get("errors")?;
    match errors {
        Value::Array(items) => Some(
            items
                .iter()
                .map(|e| e.as_str().map(str::to_string).unwrap_or_else(|| e.to_string()))
                .collect(),
        ),
        Value::String(s) => Some(vec![s.clone()]),
        other => Some(vec![other.to_string()]),
    }
}

/// Verifies (and retains) a TrustedForm certificate. The identifier is the
/// certificate URL.
pub struct TrustedFormChecker {
    client: TrustedFormClient,
    request: RetainRequest,
}

impl TrustedFormChecker {
    pub fn new(client: TrustedFormClient) -> Self {
        Self {
            client,
            request: RetainRequest::default(),
        }
    }

    /// Matches the certificate against this lead's email and phone.
    pub fn for_lead(client: TrustedFormClient, request: RetainRequest) -> Self {
        Self { client, request }
    }
}

#[async_trait]
impl ComplianceChecker for TrustedFormChecker {
    fn name(&self) -> &str {
        "TrustedForm"
    }

    async fn check(&self, identifier: &str) -> Result<ComplianceCheckResult, AppError> {
        if extract_certificate_id(identifier).is_none() {
            return Ok(ComplianceCheckResult::non_compliant(
                self.name(),
                vec!["Invalid TrustedForm certificate URL".to_string()],
            ));
        }

        match self.client.retain(identifier, &self.request).await? {
            RetainOutcome::Retained(data) => {
                Ok(ComplianceCheckResult::compliant(self.name()).with_raw(data))
            }
            RetainOutcome::Refused(reasons) => {
                Ok(ComplianceCheckResult::non_compliant(self.name(), reasons))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_id_from_url() {
        let url = "https://cert.trustedform.com/2605EC3870EA310C85270A62A2F766B8BFA3976F";
        assert_eq!(
            extract_certificate_id(url).as_deref(),
            Some("2605ec3870ea310c85270a62a2f766b8bfa3976f")
        );
    }

    #[test]
    fn rejects_malformed_certificates() {
        assert!(extract_certificate_id("https://cert.trustedform.com/abc").is_none());
        assert!(extract_certificate_id("").is_none());
    }

    #[test]
    fn refusal_reasons_read_message_or_errors() {
        assert_eq!(
            refusal_reasons(&json!({"message": "Certificate expired"})),
            Some(vec!["Certificate expired".to_string()])
        );
        assert_eq!(
            refusal_reasons(&json!({"errors": ["not found", "no match"]})),
            Some(vec!["not found".to_string(), "no match".to_string()])
        );
        assert_eq!(refusal_reasons(&json!({})), None);
    }
}
