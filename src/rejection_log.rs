//! Background writer for rejection records.
//!
//! Records are handed to a bounded queue and written by a single worker
//! task. Delivery is at-most-once: `log` never waits, a full or closed queue
//! drops the record, and a failed insert is logged and not retried.

use crate::models::{DialerType, RejectionRecord};
use crate::store::RejectionStore;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct RejectionLogger {
    tx: mpsc::Sender<RejectionRecord>,
}

impl RejectionLogger {
    /// Logger and the receiving end of its queue, without a worker.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<RejectionRecord>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Starts the worker. It exits once every logger clone is dropped and the
    /// queue is drained.
    pub fn spawn(store: Arc<dyn RejectionStore>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (logger, mut rx) = Self::channel(capacity);

        let handle = tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                match store.insert_rejection(&record).await {
                    Ok(()) => tracing::debug!(
                        "Logged {} rejection for list {}",
                        record.rejection_reason.as_str(),
                        record.incoming_list_id
                    ),
                    Err(e) => tracing::warn!("Failed to log rejection: {}", e),
                }
            }
            tracing::debug!("Rejection logger stopped");
        });

        (logger, handle)
    }

    /// Queues a record. Returns `false` if it was dropped.
    pub fn log(&self, record: RejectionRecord) -> bool {
        match self.tx.try_send(record) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("Rejection queue full, dropping record");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("Rejection logger stopped, dropping record");
                false
            }
        }
    }
}

/// Request metadata safe to persist: flags and counts only, no PII.
pub fn sanitized_metadata(
    list_id: Option<&str>,
    state: Option<&str>,
    dialer_type: DialerType,
    has_email: bool,
    has_trustedform: bool,
    field_count: usize,
) -> Value {
    json!({
        "list_id": list_id,
        "state": state,
        "dialer_type": dialer_type.as_str(),
        "has_email": has_email,
        "has_trustedform": has_trustedform,
        "field_count": field_count,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })
}
