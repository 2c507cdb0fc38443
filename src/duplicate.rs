use crate::errors::{AppError, ResultExt};
use crate::models::{CheckType, DuplicateCheckResult, DuplicateDetails, PriorLead};
use crate::normalize::to_national_us;
use crate::routing_cache::VerticalCache;
use crate::store::LeadRepository;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Trailing window in which a repeat phone counts as a duplicate.
pub const DUPLICATE_WINDOW_DAYS: i64 = 30;

/// Duplicate-lead lookup over recent leads, optionally scoped to the
/// vertical of the incoming list.
#[derive(Clone)]
pub struct DuplicateLookup {
    leads: Arc<dyn LeadRepository>,
    verticals: VerticalCache,
}

fn details_for(
    prior: &PriorLead,
    table: &str,
    vertical: Option<String>,
    list_id: Option<String>,
    check_type: CheckType,
    now: DateTime<Utc>,
) -> DuplicateDetails {
    DuplicateDetails {
        original_submission_date: prior.created_at,
        days_ago: (now - prior.created_at).num_days().max(0),
        found_in_table: table.to_string(),
        vertical,
        matched_lead_id: Some(prior.id.clone()),
        list_id,
        check_type,
    }
}

impl DuplicateLookup {
    pub fn new(leads: Arc<dyn LeadRepository>, verticals: VerticalCache) -> Self {
        Self { leads, verticals }
    }

    pub fn verticals(&self) -> &VerticalCache {
        &self.verticals
    }

    /// Most recent lead (or legacy contact) with this phone in the window.
    pub async fn check_for_duplicate_lead(
        &self,
        phone: &str,
    ) -> Result<DuplicateCheckResult, AppError> {
        self.global_check(phone, CheckType::Global, None).await
    }

    /// Most recent lead with this phone whose list shares `list_id`'s
    /// vertical. Falls back to the global check when the list has no vertical;
    /// routing store errors are returned.
    pub async fn check_for_duplicate_lead_in_vertical(
        &self,
        phone: &str,
        list_id: &str,
    ) -> Result<DuplicateCheckResult, AppError> {
        let phone = to_national_us(phone);
        if phone.len() < 10 {
            return Ok(DuplicateCheckResult::not_duplicate());
        }

        let Some(vertical) = self
            .verticals
            .vertical_for(list_id)
            .await
            .context("Resolving incoming list vertical")?
        else {
            tracing::warn!(
                "No vertical for list {}, falling back to global duplicate check",
                list_id
            );
            return self
                .global_check(&phone, CheckType::Fallback, Some(list_id))
                .await;
        };

        let now = Utc::now();
        let since = now - Duration::days(DUPLICATE_WINDOW_DAYS);
        let recent = self
            .leads
            .recent_leads_by_phone(&phone, since)
            .await
            .context("Vertical duplicate lookup")?;

        for prior in &recent {
            let Some(prior_list) = prior.list_id.as_deref() else {
                continue;
            };
            let prior_vertical = if prior_list == list_id {
                Some(vertical.clone())
            } else {
                self.verticals
                    .vertical_for(prior_list)
                    .await
                    .context("Resolving prior lead vertical")?
            };

            if prior_vertical.as_deref() == Some(vertical.as_str()) {
                tracing::info!(
                    "Duplicate found in vertical {} (lead {})",
                    vertical,
                    prior.id
                );
                return Ok(DuplicateCheckResult::duplicate(details_for(
                    prior,
                    "leads",
                    Some(vertical),
                    Some(prior_list.to_string()),
                    CheckType::VerticalSpecific,
                    now,
                )));
            }
        }

        Ok(DuplicateCheckResult::not_duplicate())
    }

    async fn global_check(
        &self,
        phone: &str,
        check_type: CheckType,
        incoming_list: Option<&str>,
    ) -> Result<DuplicateCheckResult, AppError> {
        let phone = to_national_us(phone);
        if phone.len() < 10 {
            return Ok(DuplicateCheckResult::not_duplicate());
        }

        let now = Utc::now();
        let since = now - Duration::days(DUPLICATE_WINDOW_DAYS);

        let recent = self
            .leads
            .recent_leads_by_phone(&phone, since)
            .await
            .context("Global duplicate lookup")?;

        if let Some(prior) = recent.first() {
            let list_id = match check_type {
                CheckType::Fallback => incoming_list.map(str::to_string),
                _ => prior.list_id.clone(),
            };
            return Ok(DuplicateCheckResult::duplicate(details_for(
                prior, "leads", None, list_id, check_type, now,
            )));
        }

        let contact = self
            .leads
            .recent_contact_by_phone(&phone, since)
            .await
            .context("Contact duplicate lookup")?;

        Ok(match contact {
            Some(prior) => DuplicateCheckResult::duplicate(details_for(
                &prior,
                "contacts",
                None,
                incoming_list.map(str::to_string),
                check_type,
                now,
            )),
            None => DuplicateCheckResult::not_duplicate(),
        })
    }
}
