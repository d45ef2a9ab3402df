//! Audit logging of completed diagnoses.

use crate::models::NewRecord;
use crate::services::database::RecordStore;
use crate::services::metrics;
use std::sync::Arc;

/// Appends one record per diagnosis. Store failures never reach the caller.
#[derive(Clone)]
pub struct RecordLogger {
    store: Arc<dyn RecordStore>,
}

impl RecordLogger {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self, record), fields(status = %record.status))]
    pub async fn log(&self, record: NewRecord) {
        match self.store.append(&record).await {
            Ok(id) => {
                metrics::record_persistence(true);
                tracing::info!(record_id = id, "Diagnosis record stored");
            }
            Err(e) => {
                metrics::record_persistence(false);
                tracing::error!(error = %e, "Failed to store diagnosis record");
            }
        }
    }
}
