use crate::errors::AppError;
use crate::models::{
    DncEntry, Lead, LeadStatus, ListRouting, NewLead, PriorLead, RejectionRecord,
};
use crate::store::{DncStore, LeadLookup, LeadRepository, RejectionStore, RoutingStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RecordedPostback {
    pub lead_id: Uuid,
    pub compliance_lead_id: Option<String>,
    pub policy_status: String,
    pub payload: Value,
}

/// In-process storage with the same semantics as [`crate::db_storage::PgStore`].
///
/// `set_unavailable(true)` makes every call fail with a database error;
/// `set_routings_unavailable(true)` fails only routing lookups.
#[derive(Default)]
pub struct MemoryStore {
    leads: RwLock<Vec<Lead>>,
    contacts: RwLock<Vec<(String, PriorLead)>>,
    routings: RwLock<HashMap<String, ListRouting>>,
    dnc: RwLock<Vec<DncEntry>>,
    rejections: RwLock<Vec<RejectionRecord>>,
    postbacks: RwLock<Vec<RecordedPostback>>,
    unavailable: AtomicBool,
    routings_unavailable: AtomicBool,
    routing_lookups: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_routings_unavailable(&self, unavailable: bool) {
        self.routings_unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), AppError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseError(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    pub async fn add_routing(&self, routing: ListRouting) {
        self.routings
            .write()
            .await
            .insert(routing.list_id.clone(), routing);
    }

    /// Inserts a lead with an explicit creation time. Returns its id.
    pub async fn add_lead_at(
        &self,
        phone: &str,
        list_id: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.leads.write().await.push(Lead {
            id,
            phone: phone.to_string(),
            email: None,
            first_name: None,
            last_name: None,
            address: None,
            city: None,
            state: None,
            zip_code: None,
            list_id: list_id.map(|s| s.to_string()),
            campaign_id: None,
            cadence_id: None,
            bid_amount: None,
            status: LeadStatus::New.as_str().to_string(),
            policy_status: None,
            policy_postback_date: None,
            trusted_form_cert_url: None,
            created_at,
            updated_at: None,
        });
        id
    }

    pub async fn add_contact_at(&self, phone: &str, created_at: DateTime<Utc>) -> String {
        let id = Uuid::new_v4().to_string();
        self.contacts.write().await.push((
            phone.to_string(),
            PriorLead {
                id: id.clone(),
                list_id: None,
                created_at,
            },
        ));
        id
    }

    pub async fn add_dnc_entry(&self, entry: DncEntry) {
        self.dnc.write().await.push(entry);
    }

    pub async fn leads(&self) -> Vec<Lead> {
        self.leads.read().await.clone()
    }

    pub async fn rejections(&self) -> Vec<RejectionRecord> {
        self.rejections.read().await.clone()
    }

    pub async fn postbacks(&self) -> Vec<RecordedPostback> {
        self.postbacks.read().await.clone()
    }

    /// Number of routing lookups served, for cache assertions.
    pub fn routing_lookups(&self) -> usize {
        self.routing_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LeadRepository for MemoryStore {
    async fn recent_leads_by_phone(
        &self,
        phone: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<PriorLead>, AppError> {
        self.check_available()?;
        let mut matches: Vec<PriorLead> = self
            .leads
            .read()
            .await
            .iter()
            .filter(|l| l.phone == phone && l.created_at >= since)
            .map(|l| PriorLead {
                id: l.id.to_string(),
                list_id: l.list_id.clone(),
                created_at: l.created_at,
            })
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matches)
    }

    async fn recent_contact_by_phone(
        &self,
        phone: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<PriorLead>, AppError> {
        self.check_available()?;
        Ok(self
            .contacts
            .read()
            .await
            .iter()
            .filter(|(p, c)| p == phone && c.created_at >= since)
            .map(|(_, c)| c.clone())
            .max_by_key(|c| c.created_at))
    }

    async fn insert_lead(&self, lead: &NewLead) -> Result<Lead, AppError> {
        self.check_available()?;
        let stored = Lead {
            id: Uuid::new_v4(),
            phone: lead.phone.clone(),
            email: lead.email.clone(),
            first_name: lead.first_name.clone(),
            last_name: lead.last_name.clone(),
            address: lead.address.clone(),
            city: lead.city.clone(),
            state: lead.state.clone(),
            zip_code: lead.zip_code.clone(),
            list_id: lead.list_id.clone(),
            campaign_id: lead.campaign_id.clone(),
            cadence_id: lead.cadence_id.clone(),
            bid_amount: lead.bid_amount.clone(),
            status: LeadStatus::New.as_str().to_string(),
            policy_status: None,
            policy_postback_date: None,
            trusted_form_cert_url: lead.trusted_form_cert_url.clone(),
            created_at: Utc::now(),
            updated_at: None,
        };
        self.leads.write().await.push(stored.clone());
        Ok(stored)
    }

    async fn update_lead_status(&self, id: Uuid, status: LeadStatus) -> Result<(), AppError> {
        self.check_available()?;
        let mut leads = self.leads.write().await;
        let lead = leads
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Lead {} not found", id)))?;
        lead.status = status.as_str().to_string();
        lead.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn find_lead(&self, lookup: &LeadLookup) -> Result<Option<Lead>, AppError> {
        self.check_available()?;
        let leads = self.leads.read().await;
        Ok(leads
            .iter()
            .filter(|l| match lookup {
                LeadLookup::Id(id) => l.id == *id,
                LeadLookup::Email(email) => l.email.as_deref() == Some(email.as_str()),
                LeadLookup::Phone(phone) => l.phone == *phone,
            })
            .max_by_key(|l| l.created_at)
            .cloned())
    }

    async fn update_policy_status(
        &self,
        id: Uuid,
        policy_status: &str,
        postback_date: Option<DateTime<Utc>>,
    ) -> Result<Lead, AppError> {
        self.check_available()?;
        let mut leads = self.leads.write().await;
        let lead = leads
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Lead {} not found", id)))?;
        lead.policy_status = Some(policy_status.to_string());
        if postback_date.is_some() {
            lead.policy_postback_date = postback_date;
        }
        lead.updated_at = Some(Utc::now());
        Ok(lead.clone())
    }

    async fn record_policy_postback(
        &self,
        lead_id: Uuid,
        compliance_lead_id: Option<&str>,
        policy_status: &str,
        payload: &Value,
    ) -> Result<(), AppError> {
        self.check_available()?;
        self.postbacks.write().await.push(RecordedPostback {
            lead_id,
            compliance_lead_id: compliance_lead_id.map(|s| s.to_string()),
            policy_status: policy_status.to_string(),
            payload: payload.clone(),
        });
        Ok(())
    }

    async fn leads_since(
        &self,
        since: DateTime<Utc>,
        list_id: Option<&str>,
    ) -> Result<Vec<Lead>, AppError> {
        self.check_available()?;
        let mut leads: Vec<Lead> = self
            .leads
            .read()
            .await
            .iter()
            .filter(|l| l.created_at >= since)
            .filter(|l| list_id.map_or(true, |id| l.list_id.as_deref() == Some(id)))
            .cloned()
            .collect();
        leads.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(leads)
    }
}

#[async_trait]
impl RoutingStore for MemoryStore {
    async fn find_active_routing(&self, list_id: &str) -> Result<Option<ListRouting>, AppError> {
        self.check_available()?;
        if self.routings_unavailable.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseError(sqlx::Error::PoolTimedOut));
        }
        self.routing_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .routings
            .read()
            .await
            .get(list_id)
            .filter(|r| r.active)
            .cloned())
    }
}

#[async_trait]
impl DncStore for MemoryStore {
    async fn find_active_entry(&self, phone: &str) -> Result<Option<DncEntry>, AppError> {
        self.check_available()?;
        Ok(self
            .dnc
            .read()
            .await
            .iter()
            .find(|e| e.phone_number == phone && e.status == "active")
            .cloned())
    }
}

#[async_trait]
impl RejectionStore for MemoryStore {
    async fn insert_rejection(&self, record: &RejectionRecord) -> Result<(), AppError> {
        self.check_available()?;
        self.rejections.write().await.push(record.clone());
        Ok(())
    }
}
