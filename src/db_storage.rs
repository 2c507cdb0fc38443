use crate::errors::{AppError, ResultExt};
use crate::models::{
    DncEntry, Lead, LeadStatus, ListRouting, NewLead, PriorLead, RejectionRecord,
};
use crate::store::{DncStore, LeadLookup, LeadRepository, RejectionStore, RoutingStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

const LEAD_COLUMNS: &str = r#"
    id, phone, email, first_name, last_name, address, city, state, zip_code,
    list_id, campaign_id, cadence_id, bid_amount, status, policy_status,
    policy_postback_date, trusted_form_cert_url, created_at, updated_at
"#;

/// Postgres-backed storage for leads, routings, DNC entries and rejections.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LeadRepository for PgStore {
    async fn recent_leads_by_phone(
        &self,
        phone: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<PriorLead>, AppError> {
        sqlx::query_as::<_, PriorLead>(
            r#"
            SELECT id::text AS id, list_id, created_at
            FROM leads
            WHERE phone = $1 AND created_at >= $2
            ORDER BY created_at DESC
            "#,
        )
        .bind(phone)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .context("Querying recent leads by phone")
    }

    async fn recent_contact_by_phone(
        &self,
        phone: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<PriorLead>, AppError> {
        sqlx::query_as::<_, PriorLead>(
            r#"
            SELECT id::text AS id, NULL::text AS list_id, created_at
            FROM contacts
            WHERE phone = $1 AND created_at >= $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(phone)
        .bind(since)
        .fetch_optional(&self.pool)
        .await
        .context("Querying recent contacts by phone")
    }

    async fn insert_lead(&self, lead: &NewLead) -> Result<Lead, AppError> {
        let sql = format!(
            r#"
            INSERT INTO leads (
                phone, email, first_name, last_name, address, city, state, zip_code,
                list_id, campaign_id, cadence_id, bid_amount, status, trusted_form_cert_url
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING {}
            "#,
            LEAD_COLUMNS
        );

        sqlx::query_as::<_, Lead>(&sql)
            .bind(&lead.phone)
            .bind(&lead.email)
            .bind(&lead.first_name)
            .bind(&lead.last_name)
            .bind(&lead.address)
            .bind(&lead.city)
            .bind(&lead.state)
            .bind(&lead.zip_code)
            .bind(&lead.list_id)
            .bind(&lead.campaign_id)
            .bind(&lead.cadence_id)
            .bind(&lead.bid_amount)
            .bind(LeadStatus::New.as_str())
            .bind(&lead.trusted_form_cert_url)
            .fetch_one(&self.pool)
            .await
            .context("Inserting lead")
    }

    async fn update_lead_status(&self, id: Uuid, status: LeadStatus) -> Result<(), AppError> {
        sqlx::query("UPDATE leads SET status = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .with_context(|| format!("Updating status of lead {}", id))?;
        Ok(())
    }

    async fn find_lead(&self, lookup: &LeadLookup) -> Result<Option<Lead>, AppError> {
        let (filter, value) = match lookup {
            LeadLookup::Id(id) => ("id::text = $1", id.to_string()),
            LeadLookup::Email(email) => ("email = $1", email.clone()),
            LeadLookup::Phone(phone) => ("phone = $1", phone.clone()),
        };
        let sql = format!(
            "SELECT {} FROM leads WHERE {} ORDER BY created_at DESC LIMIT 1",
            LEAD_COLUMNS, filter
        );

        sqlx::query_as::<_, Lead>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .context("Looking up lead")
    }

    async fn update_policy_status(
        &self,
        id: Uuid,
        policy_status: &str,
        postback_date: Option<DateTime<Utc>>,
    ) -> Result<Lead, AppError> {
        let sql = format!(
            r#"
            UPDATE leads
            SET policy_status = $2,
                policy_postback_date = COALESCE($3, policy_postback_date),
                updated_at = now()
            WHERE id = $1
            RETURNING {}
            "#,
            LEAD_COLUMNS
        );

        sqlx::query_as::<_, Lead>(&sql)
            .bind(id)
            .bind(policy_status)
            .bind(postback_date)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Updating policy status of lead {}", id))?
            .ok_or_else(|| AppError::NotFound(format!("Lead {} not found", id)))
    }

    async fn record_policy_postback(
        &self,
        lead_id: Uuid,
        compliance_lead_id: Option<&str>,
        policy_status: &str,
        payload: &Value,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO policy_postbacks (lead_id, compliance_lead_id, policy_status, payload)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(lead_id)
        .bind(compliance_lead_id)
        .bind(policy_status)
        .bind(payload)
        .execute(&self.pool)
        .await
        .context("Recording policy postback")?;
        Ok(())
    }

    async fn leads_since(
        &self,
        since: DateTime<Utc>,
        list_id: Option<&str>,
    ) -> Result<Vec<Lead>, AppError> {
        let sql = format!(
            r#"
            SELECT {}
            FROM leads
            WHERE created_at >= $1 AND ($2::text IS NULL OR list_id = $2)
            ORDER BY created_at DESC
            "#,
            LEAD_COLUMNS
        );

        sqlx::query_as::<_, Lead>(&sql)
            .bind(since)
            .bind(list_id)
            .fetch_all(&self.pool)
            .await
            .context("Loading leads for export")
    }
}

#[async_trait]
impl RoutingStore for PgStore {
    async fn find_active_routing(&self, list_id: &str) -> Result<Option<ListRouting>, AppError> {
        sqlx::query_as::<_, ListRouting>(
            r#"
            SELECT list_id, campaign_id, cadence_id, token, bid, active, vertical, dialer_type
            FROM list_routings
            WHERE list_id = $1 AND active = true
            LIMIT 1
            "#,
        )
        .bind(list_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Loading routing for list {}", list_id))
    }
}

#[async_trait]
impl DncStore for PgStore {
    async fn find_active_entry(&self, phone: &str) -> Result<Option<DncEntry>, AppError> {
        sqlx::query_as::<_, DncEntry>(
            r#"
            SELECT phone_number, reason, source, status
            FROM dnc_entries
            WHERE phone_number = $1 AND status = 'active'
            LIMIT 1
            "#,
        )
        .bind(phone)
        .fetch_optional(&self.pool)
        .await
        .context("Querying internal DNC list")
    }
}

#[async_trait]
impl RejectionStore for PgStore {
    async fn insert_rejection(&self, record: &RejectionRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO lead_rejections (
                phone, incoming_list_id, matched_lead_id, matched_list_id,
                rejection_reason, rejection_type, incoming_vertical, matched_vertical,
                days_since_original, endpoint, rejection_details, request_metadata
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(&record.phone)
        .bind(&record.incoming_list_id)
        .bind(&record.matched_lead_id)
        .bind(&record.matched_list_id)
        .bind(record.rejection_reason.as_str())
        .bind(&record.rejection_type)
        .bind(&record.incoming_vertical)
        .bind(&record.matched_vertical)
        .bind(record.days_since_original.map(|d| d as i32))
        .bind(&record.endpoint)
        .bind(&record.rejection_details)
        .bind(&record.request_metadata)
        .execute(&self.pool)
        .await
        .context("Inserting lead rejection")?;
        Ok(())
    }
}
