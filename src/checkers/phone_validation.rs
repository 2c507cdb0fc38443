use super::{build_http_client, ensure_success, ComplianceChecker};
use crate::errors::AppError;
use crate::models::ComplianceCheckResult;
use crate::normalize::{is_plausible_us_phone, to_national_us};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Line statuses that fail validation. Matched case-insensitively against
/// `status`, and as a substring of `error_text`.
pub const REJECTED_STATUSES: &[&str] = &[
    "disconnected",
    "disconnected-70",
    "unreachable",
    "invalid phone",
    "restricted",
    "ERROR",
    "ERROR bad phone number",
    "ERROR missing token",
    "unauthorized",
    "invalid-format",
    "invalid-phone",
    "bad-zip-code",
    "busy",
];

/// RealPhoneValidation Turbo line check.
#[derive(Clone)]
pub struct PhoneValidationChecker {
    client: reqwest::Client,
    url: String,
    token: String,
}

/// Interpreted Turbo response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineVerdict {
    Valid,
    RejectedStatus(String),
    Voip,
}

/// Applies the rejected-status list, then the VoIP rule.
pub fn interpret_line_status(status: &str, error_text: &str, phone_type: &str) -> LineVerdict {
    let status_lower = status.to_lowercase();
    let error_lower = error_text.to_lowercase();

    let rejected = REJECTED_STATUSES.iter().any(|s| {
        let s = s.to_lowercase();
        status_lower == s || (!error_lower.is_empty() && error_lower.contains(&s))
    });

    if rejected {
        LineVerdict::RejectedStatus(status.to_string())
    } else if phone_type.eq_ignore_ascii_case("voip") {
        LineVerdict::Voip
    } else {
        LineVerdict::Valid
    }
}

impl PhoneValidationChecker {
    pub fn new(url: String, token: String, timeout: Duration) -> Result<Self, AppError> {
        Ok(Self {
            client: build_http_client(timeout)?,
            url,
            token,
        })
    }
}

#[async_trait]
impl ComplianceChecker for PhoneValidationChecker {
    fn name(&self) -> &str {
        "Phone Validation"
    }

    async fn check(&self, identifier: &str) -> Result<ComplianceCheckResult, AppError> {
        let phone = to_national_us(identifier);
        if phone.len() < 10 || !is_plausible_us_phone(&phone) {
            return Ok(ComplianceCheckResult::non_compliant(
                self.name(),
                vec!["Invalid phone number format".to_string()],
            ));
        }

        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("output", "json"),
                ("phone", phone.as_str()),
                ("token", self.token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                AppError::ExternalApiError(format!("Phone validation request failed: {}", e))
            })?;

        let data: Value = ensure_success(response, "RealPhoneValidation")
            .await?
            .json()
            .await
            .map_err(|e| {
                AppError::ExternalApiError(format!(
                    "Failed to parse phone validation response: {}",
                    e
                ))
            })?;

        let field = |name: &str| {
            data.get(name)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        let status = field("status");
        let error_text = field("error_text");
        let phone_type = field("phone_type");

        if status.is_empty() && error_text.is_empty() {
            return Err(AppError::ExternalApiError(
                "Phone validation response missing status".to_string(),
            ));
        }

        let result = match interpret_line_status(&status, &error_text, &phone_type) {
            LineVerdict::Valid => ComplianceCheckResult::compliant(self.name()),
            LineVerdict::RejectedStatus(s) => ComplianceCheckResult::non_compliant(
                self.name(),
                vec![format!("Rejected status: {}", s)],
            ),
            LineVerdict::Voip => ComplianceCheckResult::non_compliant(
                self.name(),
                vec!["VoIP numbers are not allowed".to_string()],
            ),
        };

        Ok(result.with_raw(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connected_mobile_is_valid() {
        assert_eq!(
            interpret_line_status("connected", "", "Mobile"),
            LineVerdict::Valid
        );
        assert_eq!(
            interpret_line_status("connected-75", "", "Landline"),
            LineVerdict::Valid
        );
    }

    #[test]
    fn rejected_status_is_case_insensitive() {
        assert_eq!(
            interpret_line_status("Disconnected", "", "Mobile"),
            LineVerdict::RejectedStatus("Disconnected".to_string())
        );
    }

    #[test]
    fn error_text_can_reject() {
        assert_eq!(
            interpret_line_status("", "ERROR missing token", ""),
            LineVerdict::RejectedStatus(String::new())
        );
    }

    #[test]
    fn voip_is_rejected() {
        assert_eq!(
            interpret_line_status("connected", "", "VoIP"),
            LineVerdict::Voip
        );
    }
}
