//! Offline CSV compliance check.
//!
//! Usage: `batch_check <input.csv> [compliant.csv]`
//!
//! Runs every record through the configured checkers (same environment as
//! the API server) and writes the compliant records to the output file.

use lead_compliance_api::batch::{batch_policy, run_batch};
use lead_compliance_api::config::Config;
use lead_compliance_api::csv_records::parse_csv;
use lead_compliance_api::db::Database;
use lead_compliance_api::db_storage::PgStore;
use lead_compliance_api::engine::ComplianceEngine;
use lead_compliance_api::retry::RetryPolicy;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let input = args
        .next()
        .ok_or_else(|| anyhow::anyhow!("usage: batch_check <input.csv> [compliant.csv]"))?;
    let output = args.next().unwrap_or_else(|| "compliant.csv".to_string());

    let config = Config::from_env()?;
    let db = Database::new(&config.database_url).await?;
    let store = Arc::new(PgStore::new(db.pool.clone()));

    // Offline runs can afford a retry per checker
    let engine = ComplianceEngine::from_config(&config, store)?
        .with_retry(RetryPolicy::new(2, Duration::from_millis(500)));

    let text = tokio::fs::read_to_string(&input).await?;
    let parsed = parse_csv(&text)?;
    tracing::info!("Loaded {} records from {}", parsed.records.len(), input);

    let report = run_batch(&engine, parsed, &batch_policy()).await?;
    tokio::fs::write(&output, &report.compliant_csv).await?;

    tracing::info!(
        "{}/{} records compliant ({}%), written to {}",
        report.summary.compliant_records,
        report.summary.total_records,
        report.summary.compliance_rate,
        output
    );
    for (reason, count) in &report.summary.failure_reasons {
        tracing::info!("  {}: {}", reason, count);
    }

    Ok(())
}
