//! External compliance checkers.
//!
//! Each checker wraps one lookup. Transport failures, non-success statuses
//! and unparseable payloads are returned as errors, never as a compliant
//! result; the engine decides what an error means.

pub mod internal_dnc;
pub mod phone_validation;
pub mod synergy_dnc;
pub mod tcpa;
pub mod trustedform;

pub use internal_dnc::InternalDncChecker;
pub use phone_validation::PhoneValidationChecker;
pub use synergy_dnc::SynergyDncChecker;
pub use tcpa::TcpaChecker;
pub use trustedform::{RetainOutcome, RetainRequest, TrustedFormChecker, TrustedFormClient};

use crate::errors::AppError;
use crate::models::ComplianceCheckResult;
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait ComplianceChecker: Send + Sync {
    /// Source label used in results and rejection reasons.
    fn name(&self) -> &str;

    async fn check(&self, identifier: &str) -> Result<ComplianceCheckResult, AppError>;
}

/// HTTP client with the per-call timeout shared by every remote checker.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, AppError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::InternalError(format!("Failed to create HTTP client: {}", e)))
}

/// Turns a non-2xx response into an `ExternalApiError` naming the service.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
    service: &str,
) -> Result<reqwest::Response, AppError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(AppError::ExternalApiError(format!(
        "{} returned {}: {}",
        service, status, error_text
    )))
}
