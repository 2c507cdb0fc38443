//! CSV batch compliance over the engine.

use crate::admission::{process_in_chunks, ChunkPolicy};
use crate::csv_records::{lookup_field, records_to_csv, CsvRecord, ParsedCsv, PHONE_ALIASES};
use crate::engine::ComplianceEngine;
use crate::errors::AppError;
use crate::models::ComplianceCheckResult;
use crate::normalize::normalize_phone;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;

pub const MISSING_PHONE_REASON: &str = "Missing phone number";

/// Workers for a batch upload. The checkers are cheap lookups, so there are
/// no pauses.
pub fn batch_policy() -> ChunkPolicy {
    ChunkPolicy {
        chunk_size: 500,
        ..ChunkPolicy::unthrottled(20)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOutcome {
    pub record: CsvRecord,
    pub is_compliant: bool,
    pub failure_reasons: Vec<String>,
    pub checks: Vec<ComplianceCheckResult>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total_records: usize,
    pub compliant_records: usize,
    pub non_compliant_records: usize,
    /// Percentage with one decimal, e.g. `"66.7"`.
    pub compliance_rate: String,
    pub processing_time_seconds: String,
    pub failure_reasons: BTreeMap<String, usize>,
    pub column_mappings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NonCompliantDetail {
    pub record: CsvRecord,
    pub failure_reasons: Vec<String>,
    pub checks: Vec<ComplianceCheckResult>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub success: bool,
    pub summary: BatchSummary,
    pub compliant_records: Vec<CsvRecord>,
    pub non_compliant_details: Vec<NonCompliantDetail>,
    #[serde(rename = "compliantCSV")]
    pub compliant_csv: String,
}

fn failure_reasons(results: &[ComplianceCheckResult]) -> Vec<String> {
    results
        .iter()
        .filter(|r| !r.is_compliant)
        .flat_map(|r| {
            if r.reasons.is_empty() {
                vec![format!("{}: Non-compliant", r.source)]
            } else {
                r.reasons.clone()
            }
        })
        .collect()
}

/// Checks one record. Records without a phone never reach the engine.
pub async fn check_record(engine: &ComplianceEngine, record: CsvRecord) -> RecordOutcome {
    let phone = lookup_field(&record, PHONE_ALIASES)
        .map(normalize_phone)
        .filter(|p| !p.is_empty());

    let Some(phone) = phone else {
        return RecordOutcome {
            record,
            is_compliant: false,
            failure_reasons: vec![MISSING_PHONE_REASON.to_string()],
            checks: Vec::new(),
        };
    };

    let report = engine.check_phone_number(&phone).await;
    RecordOutcome {
        failure_reasons: failure_reasons(&report.results),
        is_compliant: report.is_compliant,
        checks: report.results,
        record,
    }
}

pub fn compliance_rate(compliant: usize, total: usize) -> String {
    if total == 0 {
        return "0.0".to_string();
    }
    format!("{:.1}", compliant as f64 / total as f64 * 100.0)
}

/// Runs every record through the engine, preserving input order.
pub async fn run_batch(
    engine: &ComplianceEngine,
    parsed: ParsedCsv,
    policy: &ChunkPolicy,
) -> Result<BatchReport, AppError> {
    let ParsedCsv { records, mappings } = parsed;
    if records.is_empty() {
        return Err(AppError::BadRequest("No records found in CSV".to_string()));
    }

    let total = records.len();
    let started = Instant::now();
    tracing::info!(
        "Starting batch compliance check for {} records ({} workers)",
        total,
        policy.concurrency
    );
    for mapping in &mappings {
        tracing::debug!("{}", mapping.describe());
    }

    let worker_engine = engine.clone();
    let outcomes = process_in_chunks(records, policy, move |record| {
        let engine = worker_engine.clone();
        async move { check_record(&engine, record).await }
    })
    .await?;

    let mut compliant_records = Vec::new();
    let mut non_compliant_details = Vec::new();
    let mut reason_counts: BTreeMap<String, usize> = BTreeMap::new();

    for outcome in outcomes {
        if outcome.is_compliant {
            compliant_records.push(outcome.record);
        } else {
            for reason in &outcome.failure_reasons {
                *reason_counts.entry(reason.clone()).or_default() += 1;
            }
            non_compliant_details.push(NonCompliantDetail {
                record: outcome.record,
                failure_reasons: outcome.failure_reasons,
                checks: outcome.checks,
            });
        }
    }

    let processing_time_seconds = format!("{:.1}", started.elapsed().as_secs_f64());
    let summary = BatchSummary {
        total_records: total,
        compliant_records: compliant_records.len(),
        non_compliant_records: non_compliant_details.len(),
        compliance_rate: compliance_rate(compliant_records.len(), total),
        processing_time_seconds,
        failure_reasons: reason_counts,
        column_mappings: mappings.iter().map(|m| m.describe()).collect(),
    };

    tracing::info!(
        "Batch complete in {}s: {}/{} compliant ({}%)",
        summary.processing_time_seconds,
        summary.compliant_records,
        total,
        summary.compliance_rate
    );

    Ok(BatchReport {
        success: true,
        compliant_csv: records_to_csv(&compliant_records)?,
        summary,
        compliant_records,
        non_compliant_details,
    })
}
