use crate::checkers::{
    ComplianceChecker, InternalDncChecker, PhoneValidationChecker, SynergyDncChecker,
    TcpaChecker,
};
use crate::config::Config;
use crate::errors::AppError;
use crate::models::{ComplianceCheckResult, ComplianceReport};
use crate::retry::RetryPolicy;
use crate::store::DncStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Runs every registered checker against a phone number and AND-combines the
/// results. A checker that errors counts as non-compliant.
#[derive(Clone)]
pub struct ComplianceEngine {
    checkers: Vec<Arc<dyn ComplianceChecker>>,
    retry: RetryPolicy,
}

impl ComplianceEngine {
    pub fn new(checkers: Vec<Arc<dyn ComplianceChecker>>) -> Self {
        Self {
            checkers,
            retry: RetryPolicy::single_attempt(),
        }
    }

    /// Phone checkers in registration order: Internal DNC, Synergy DNC, then
    /// TCPA and phone validation when their credentials are configured.
    pub fn from_config(config: &Config, dnc: Arc<dyn DncStore>) -> Result<Self, AppError> {
        let timeout = Duration::from_secs(config.checker_timeout_secs);
        let mut checkers: Vec<Arc<dyn ComplianceChecker>> = vec![
            Arc::new(InternalDncChecker::new(dnc)),
            Arc::new(SynergyDncChecker::new(config.synergy_dnc_url.clone(), timeout)?),
        ];

        match (&config.tcpa_username, &config.tcpa_password) {
            (Some(username), Some(password)) => checkers.push(Arc::new(TcpaChecker::new(
                config.tcpa_base_url.clone(),
                username.clone(),
                password.clone(),
                timeout,
            )?)),
            _ => tracing::warn!("TCPA_USERNAME/TCPA_PASSWORD not set - TCPA check disabled"),
        }

        match &config.phone_validation_api_key {
            Some(token) => checkers.push(Arc::new(PhoneValidationChecker::new(
                config.phone_validation_url.clone(),
                token.clone(),
                timeout,
            )?)),
            None => tracing::warn!(
                "REAL_PHONE_VALIDATION_API_KEY not set - phone validation disabled"
            ),
        }

        let engine = Self::new(checkers);
        tracing::info!("Compliance checkers: {}", engine.checker_names().join(", "));
        Ok(engine)
    }

    /// Retries each checker under `retry` before treating it as failed.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn checker_names(&self) -> Vec<String> {
        self.checkers.iter().map(|c| c.name().to_string()).collect()
    }

    /// Checkers run sequentially, in registration order. Every checker runs
    /// even after one fails.
    pub async fn check_phone_number(&self, phone: &str) -> ComplianceReport {
        let mut results = Vec::with_capacity(self.checkers.len());

        for checker in &self.checkers {
            let outcome = self.retry.run(|| checker.check(phone)).await;

            let result = match outcome {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!("{} check failed, blocking: {}", checker.name(), e);
                    ComplianceCheckResult::non_compliant(
                        checker.name(),
                        vec![format!("{} check failed - blocked for safety", checker.name())],
                    )
                }
            };

            if !result.is_compliant {
                tracing::info!("{} flagged number: {:?}", result.source, result.reasons);
            }
            results.push(result);
        }

        let is_compliant = results.iter().all(|r| r.is_compliant);

        ComplianceReport {
            phone_number: phone.to_string(),
            is_compliant,
            results,
            timestamp: Utc::now(),
        }
    }
}
