//! Bulk TrustedForm certificate claiming.

use crate::admission::{process_with_failsafe, ChunkPolicy};
use crate::checkers::trustedform::extract_certificate_id;
use crate::checkers::{RetainOutcome, RetainRequest, TrustedFormClient};
use crate::csv_records::{lookup_field, CsvRecord, CERT_ALIASES, EMAIL_ALIASES};
use crate::errors::AppError;
use crate::normalize::normalize_phone;
use crate::retry::RetryPolicy;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;

/// Claiming stops admitting records after this many failures in a row.
pub const MAX_CONSECUTIVE_FAILURES: usize = 10;

pub const BULK_CLAIM_REFERENCE: &str = "bulk-claim-csv";
pub const BULK_CLAIM_VENDOR: &str = "compliance-system-bulk";

/// Phone columns for bulk claims. `match_lead` appears in TrustedForm exports.
const CLAIM_PHONE_ALIASES: &[&str] = &[
    "phone",
    "Phone",
    "phone_number",
    "PhoneNumber",
    "match_lead",
];

#[derive(Debug, Clone, Copy)]
pub struct BulkClaimOptions {
    pub policy: ChunkPolicy,
    pub retry: RetryPolicy,
    pub max_consecutive_failures: usize,
}

impl BulkClaimOptions {
    pub fn for_record_count(records: usize) -> Self {
        Self {
            policy: ChunkPolicy::for_record_count(records),
            retry: RetryPolicy::default(),
            max_consecutive_failures: MAX_CONSECUTIVE_FAILURES,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResult {
    /// 1-based position in the submitted data.
    pub row: usize,
    pub certificate_url: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkClaimSummary {
    pub total_processed: usize,
    pub successful: usize,
    pub failed: usize,
    /// Records never attempted because claiming stopped early.
    pub skipped: usize,
    pub processing_time_seconds: f64,
    pub failure_reasons: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkClaimReport {
    pub success: bool,
    pub summary: BulkClaimSummary,
    pub successful_claims: Vec<ClaimResult>,
    pub failed_claims: Vec<ClaimResult>,
}

async fn claim_record(
    client: &TrustedFormClient,
    retry: RetryPolicy,
    row: usize,
    record: &CsvRecord,
) -> Result<ClaimResult, ClaimResult> {
    let mut result = ClaimResult {
        row,
        certificate_url: lookup_field(record, CERT_ALIASES).unwrap_or("").to_string(),
        phone: lookup_field(record, CLAIM_PHONE_ALIASES).map(normalize_phone),
        email: lookup_field(record, EMAIL_ALIASES).map(str::to_string),
        success: false,
        error: None,
        claimed_at: None,
    };

    if result.certificate_url.is_empty() {
        result.error = Some("Missing certificate URL".to_string());
        return Err(result);
    }

    // Malformed URLs never succeed on retry
    if extract_certificate_id(&result.certificate_url).is_none() {
        result.error = Some("Invalid TrustedForm certificate URL".to_string());
        return Err(result);
    }

    let request = RetainRequest {
        email: result.email.clone(),
        phone: result.phone.clone(),
        reference: Some(BULK_CLAIM_REFERENCE.to_string()),
        vendor: Some(BULK_CLAIM_VENDOR.to_string()),
    };

    let outcome = retry
        .run(|| client.retain(&result.certificate_url, &request))
        .await;

    match outcome {
        Ok(RetainOutcome::Retained(_)) => {
            result.success = true;
            result.claimed_at = Some(Utc::now());
            Ok(result)
        }
        Ok(RetainOutcome::Refused(reasons)) => {
            result.error = Some(if reasons.is_empty() {
                "Certificate claim failed".to_string()
            } else {
                reasons.join("; ")
            });
            Err(result)
        }
        Err(e) => {
            tracing::warn!("Claim for row {} failed: {}", row, e);
            result.error = Some(match e {
                AppError::BadRequest(msg) | AppError::ExternalApiError(msg) => msg,
                other => other.to_string(),
            });
            Err(result)
        }
    }
}

pub async fn run_bulk_claim(
    client: &TrustedFormClient,
    records: Vec<CsvRecord>,
    options: BulkClaimOptions,
) -> Result<BulkClaimReport, AppError> {
    let total = records.len();
    let started = Instant::now();
    tracing::info!(
        "Starting bulk TrustedForm claim for {} records ({} workers)",
        total,
        options.policy.concurrency
    );

    let worker_client = client.clone();
    let retry = options.retry;
    let indexed: Vec<(usize, CsvRecord)> = records
        .into_iter()
        .enumerate()
        .map(|(i, r)| (i + 1, r))
        .collect();

    let outcome = process_with_failsafe(
        indexed,
        &options.policy,
        options.max_consecutive_failures,
        move |(row, record)| {
            let client = worker_client.clone();
            async move { claim_record(&client, retry, row, &record).await }
        },
    )
    .await?;

    if outcome.stopped_early() {
        tracing::warn!(
            "Stopped bulk claim after {} consecutive failures, {} records skipped",
            options.max_consecutive_failures,
            outcome.skipped.len()
        );
    }

    let skipped = outcome.skipped.len();
    let mut successful_claims = Vec::new();
    let mut failed_claims = Vec::new();
    let mut failure_reasons: BTreeMap<String, usize> = BTreeMap::new();

    for result in outcome.completed {
        match result {
            Ok(claim) => successful_claims.push(claim),
            Err(claim) => {
                let reason = claim
                    .error
                    .clone()
                    .unwrap_or_else(|| "Unknown error".to_string());
                *failure_reasons.entry(reason).or_default() += 1;
                failed_claims.push(claim);
            }
        }
    }

    let processing_time_seconds = (started.elapsed().as_secs_f64() * 10.0).round() / 10.0;
    tracing::info!(
        "Bulk claim completed in {:.1}s: {} successful, {} failed",
        processing_time_seconds,
        successful_claims.len(),
        failed_claims.len()
    );

    Ok(BulkClaimReport {
        success: true,
        summary: BulkClaimSummary {
            total_processed: successful_claims.len() + failed_claims.len(),
            successful: successful_claims.len(),
            failed: failed_claims.len(),
            skipped,
            processing_time_seconds,
            failure_reasons,
        },
        successful_claims,
        failed_claims,
    })
}
