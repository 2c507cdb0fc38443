use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

// ============ Database Models ============

/// Lifecycle of a stored lead: created as `new`, then set from the dialer
/// forwarding outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadStatus {
    New,
    Success,
    Rejected,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Success => "success",
            LeadStatus::Rejected => "rejected",
        }
    }
}

/// Downstream dialer a list routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialerType {
    #[default]
    Internal,
    PitchBpo,
}

impl DialerType {
    /// Maps the `list_routings.dialer_type` column (1 = internal, 2 = Pitch BPO).
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(DialerType::Internal),
            2 => Some(DialerType::PitchBpo),
            _ => None,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            DialerType::Internal => 1,
            DialerType::PitchBpo => 2,
        }
    }

    /// Parses a request value. Anything other than `pitch_bpo` selects the
    /// internal dialer.
    pub fn parse_lenient(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()) {
            Some(ref s) if s == "pitch_bpo" => DialerType::PitchBpo,
            _ => DialerType::Internal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DialerType::Internal => "internal",
            DialerType::PitchBpo => "pitch_bpo",
        }
    }
}

impl fmt::Display for DialerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row of the `leads` table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub phone: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub list_id: Option<String>,
    pub campaign_id: Option<String>,
    pub cadence_id: Option<String>,
    /// Routing bid at the time the lead was created. Never recomputed.
    pub bid_amount: Option<BigDecimal>,
    pub status: String,
    pub policy_status: Option<String>,
    pub policy_postback_date: Option<DateTime<Utc>>,
    pub trusted_form_cert_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Fields needed to insert a lead.
#[derive(Debug, Clone, Default)]
pub struct NewLead {
    pub phone: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub list_id: Option<String>,
    pub campaign_id: Option<String>,
    pub cadence_id: Option<String>,
    pub bid_amount: Option<BigDecimal>,
    pub trusted_form_cert_url: Option<String>,
}

/// Minimal projection of an earlier lead (or legacy contact) with the same phone.
#[derive(Debug, Clone, FromRow)]
pub struct PriorLead {
    pub id: String,
    pub list_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A row of the read-only `list_routings` table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ListRouting {
    pub list_id: String,
    pub campaign_id: Option<String>,
    pub cadence_id: Option<String>,
    pub token: Option<String>,
    pub bid: BigDecimal,
    pub active: bool,
    pub vertical: Option<String>,
    pub dialer_type: i32,
}

impl ListRouting {
    /// Unknown codes fall back to the internal dialer.
    pub fn dialer(&self) -> DialerType {
        DialerType::from_code(self.dialer_type).unwrap_or_default()
    }
}

/// A row of the `dnc_entries` table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DncEntry {
    pub phone_number: String,
    pub reason: Option<String>,
    pub source: Option<String>,
    pub status: String,
}

// ============ Compliance Results ============

/// Outcome of a single checker call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceCheckResult {
    pub source: String,
    pub is_compliant: bool,
    pub reasons: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<Value>,
}

impl ComplianceCheckResult {
    pub fn compliant(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            is_compliant: true,
            reasons: Vec::new(),
            raw_response: None,
        }
    }

    pub fn non_compliant(source: impl Into<String>, reasons: Vec<String>) -> Self {
        Self {
            source: source.into(),
            is_compliant: false,
            reasons,
            raw_response: None,
        }
    }

    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw_response = Some(raw);
        self
    }
}

/// Aggregated result of every configured checker for one phone number.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceReport {
    pub phone_number: String,
    pub is_compliant: bool,
    pub results: Vec<ComplianceCheckResult>,
    pub timestamp: DateTime<Utc>,
}

impl ComplianceReport {
    /// `"<source>: <reasons>"` for each failed check, joined with `"; "`.
    pub fn failure_summary(&self) -> String {
        self.results
            .iter()
            .filter(|r| !r.is_compliant)
            .map(|r| {
                let reasons = if r.reasons.is_empty() {
                    "Non-compliant".to_string()
                } else {
                    r.reasons.join(", ")
                };
                format!("{}: {}", r.source, reasons)
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// How a duplicate was matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckType {
    VerticalSpecific,
    Global,
    Fallback,
}

impl CheckType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckType::VerticalSpecific => "vertical-specific",
            CheckType::Global => "global",
            CheckType::Fallback => "fallback",
        }
    }
}

impl fmt::Display for CheckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateDetails {
    pub original_submission_date: DateTime<Utc>,
    pub days_ago: i64,
    /// `leads` or `contacts`.
    pub found_in_table: String,
    pub vertical: Option<String>,
    pub matched_lead_id: Option<String>,
    pub list_id: Option<String>,
    pub check_type: CheckType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateCheckResult {
    pub is_duplicate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<DuplicateDetails>,
}

impl DuplicateCheckResult {
    pub fn not_duplicate() -> Self {
        Self {
            is_duplicate: false,
            details: None,
        }
    }

    pub fn duplicate(details: DuplicateDetails) -> Self {
        Self {
            is_duplicate: true,
            details: Some(details),
        }
    }
}

// ============ Pre-Ping ============

/// Body of `POST /api/leads/pre-ping`, or the query string of its `GET` twin.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrePingRequest {
    pub phone: Option<String>,
    pub state: Option<String>,
    pub email: Option<String>,
    #[serde(rename = "firstName", alias = "first_name", default)]
    pub first_name: Option<String>,
    #[serde(rename = "lastName", alias = "last_name", default)]
    pub last_name: Option<String>,
    pub list_id: Option<String>,
    pub dialer_type: Option<String>,
}

/// Result of one pre-ping step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckOutcome {
    pub is_compliant: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl CheckOutcome {
    pub fn pass() -> Self {
        Self {
            is_compliant: true,
            reason: None,
            details: None,
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            is_compliant: false,
            reason: Some(reason.into()),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrePingChecks {
    pub duplicate: CheckOutcome,
    pub state: CheckOutcome,
    pub compliance: CheckOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrePingResponse {
    pub success: bool,
    pub accepted: bool,
    pub rejection_reasons: Vec<String>,
    pub estimated_bid: f64,
    pub checks: PrePingChecks,
    pub processing_time_ms: u64,
}

// ============ Lead Submission ============

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitLeadRequest {
    pub phone: Option<String>,
    #[serde(alias = "firstName")]
    pub first_name: Option<String>,
    #[serde(alias = "lastName")]
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    #[serde(alias = "zip", alias = "zipCode")]
    pub zip_code: Option<String>,
    pub list_id: Option<String>,
    #[serde(alias = "trustedform_cert_url", alias = "trustedFormCertUrl")]
    pub trusted_form_cert_url: Option<String>,
    pub subid: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitLeadResponse {
    pub success: bool,
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<LeadStatus>,
    pub rejection_reasons: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bid: Option<BigDecimal>,
}

// ============ Rejection Log ============

/// Why a pre-ping or submission was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    Duplicate,
    Compliance,
    Dnc,
    State,
    PhoneValidation,
    Other,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::Duplicate => "duplicate",
            RejectionReason::Compliance => "compliance",
            RejectionReason::Dnc => "dnc",
            RejectionReason::State => "state",
            RejectionReason::PhoneValidation => "phone_validation",
            RejectionReason::Other => "other",
        }
    }
}

/// A row for the `lead_rejections` table. `request_metadata` never carries PII.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectionRecord {
    pub phone: String,
    pub incoming_list_id: String,
    pub matched_lead_id: Option<String>,
    pub matched_list_id: Option<String>,
    pub rejection_reason: RejectionReason,
    pub rejection_type: Option<String>,
    pub incoming_vertical: Option<String>,
    pub matched_vertical: Option<String>,
    pub days_since_original: Option<i64>,
    pub endpoint: String,
    pub rejection_details: Option<Value>,
    pub request_metadata: Value,
}

// ============ Policy Postback ============

#[derive(Debug, Clone, Deserialize)]
pub struct PolicyPostbackRequest {
    pub lead_id: Option<String>,
    pub compliance_lead_id: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub policy_status: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PolicyPostbackResponse {
    pub success: bool,
    pub lead_id: Uuid,
    pub policy_status: String,
    pub policy_postback_date: Option<DateTime<Utc>>,
}
