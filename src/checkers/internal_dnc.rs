use super::ComplianceChecker;
use crate::errors::{AppError, ResultExt};
use crate::models::ComplianceCheckResult;
use crate::normalize::to_national_us;
use crate::store::DncStore;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

/// Always blocked, regardless of table contents.
pub const TEST_BLOCKED_NUMBER: &str = "9999999999";

/// Looks the number up in the `dnc_entries` table.
pub struct InternalDncChecker {
    store: Arc<dyn DncStore>,
}

impl InternalDncChecker {
    pub fn new(store: Arc<dyn DncStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ComplianceChecker for InternalDncChecker {
    fn name(&self) -> &str {
        "Internal DNC"
    }

    async fn check(&self, identifier: &str) -> Result<ComplianceCheckResult, AppError> {
        let phone = to_national_us(identifier);

        if phone == TEST_BLOCKED_NUMBER {
            return Ok(ComplianceCheckResult::non_compliant(
                self.name(),
                vec!["Test number blocked".to_string()],
            ));
        }

        let entry = self
            .store
            .find_active_entry(&phone)
            .await
            .context("Internal DNC lookup")?;

        match entry {
            Some(entry) => {
                tracing::info!("Number found on internal DNC list");
                let reason = entry
                    .reason
                    .clone()
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| "No reason provided".to_string());
                Ok(
                    ComplianceCheckResult::non_compliant(self.name(), vec![reason]).with_raw(
                        json!({
                            "source": entry.source,
                            "status": entry.status,
                        }),
                    ),
                )
            }
            None => Ok(ComplianceCheckResult::compliant(self.name())),
        }
    }
}
