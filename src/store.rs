//! Storage seams. [`crate::db_storage::PgStore`] is the Postgres
//! implementation; [`crate::memory_store::MemoryStore`] backs tests and the
//! offline batch tool.

use crate::errors::AppError;
use crate::models::{
    DncEntry, Lead, LeadStatus, ListRouting, NewLead, PriorLead, RejectionRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

/// How a policy postback identifies its lead, in order of preference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeadLookup {
    Id(Uuid),
    Email(String),
    Phone(String),
}

#[async_trait]
pub trait LeadRepository: Send + Sync {
    /// Leads with this phone created at or after `since`, newest first.
    async fn recent_leads_by_phone(
        &self,
        phone: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<PriorLead>, AppError>;

    /// Most recent legacy contact with this phone created at or after `since`.
    async fn recent_contact_by_phone(
        &self,
        phone: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<PriorLead>, AppError>;

    async fn insert_lead(&self, lead: &NewLead) -> Result<Lead, AppError>;

    async fn update_lead_status(&self, id: Uuid, status: LeadStatus) -> Result<(), AppError>;

    async fn find_lead(&self, lookup: &LeadLookup) -> Result<Option<Lead>, AppError>;

    /// Sets `policy_status`, and `policy_postback_date` when `postback_date`
    /// is given. Returns the updated lead.
    async fn update_policy_status(
        &self,
        id: Uuid,
        policy_status: &str,
        postback_date: Option<DateTime<Utc>>,
    ) -> Result<Lead, AppError>;

    /// Audit trail row for a received postback.
    async fn record_policy_postback(
        &self,
        lead_id: Uuid,
        compliance_lead_id: Option<&str>,
        policy_status: &str,
        payload: &Value,
    ) -> Result<(), AppError>;

    /// Leads created at or after `since`, newest first, optionally for one list.
    async fn leads_since(
        &self,
        since: DateTime<Utc>,
        list_id: Option<&str>,
    ) -> Result<Vec<Lead>, AppError>;
}

#[async_trait]
pub trait RoutingStore: Send + Sync {
    /// Active routing for a list, if any.
    async fn find_active_routing(&self, list_id: &str) -> Result<Option<ListRouting>, AppError>;
}

#[async_trait]
pub trait DncStore: Send + Sync {
    /// Active DNC entry for a normalized phone number, if any.
    async fn find_active_entry(&self, phone: &str) -> Result<Option<DncEntry>, AppError>;
}

#[async_trait]
pub trait RejectionStore: Send + Sync {
    async fn insert_rejection(&self, record: &RejectionRecord) -> Result<(), AppError>;
}
